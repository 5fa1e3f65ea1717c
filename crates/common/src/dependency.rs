use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier under which a fragment publishes its result and by which a
/// consumer fragment references that result. Opaque everywhere except the
/// planner that assigns it; execution scope is carried separately on the
/// fragment, never encoded in the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyId(i32);

impl DependencyId {
    pub const fn new(raw: i32) -> Self {
        DependencyId(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for DependencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

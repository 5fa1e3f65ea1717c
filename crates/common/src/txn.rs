use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Opaque transaction identifiers passed through to the execution engine
/// unchanged. The coordinator never interprets these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxnContext {
    pub txn_id: i64,
    pub last_committed_txn_id: i64,
    pub undo_token: i64,
}

impl TxnContext {
    pub fn new(txn_id: i64, last_committed_txn_id: i64, undo_token: i64) -> Self {
        Self {
            txn_id,
            last_committed_txn_id,
            undo_token,
        }
    }
}

const COUNTER_BITS: u32 = 20;

/// Hands out strictly increasing transaction ids derived from wall-clock
/// time, with the low bits left for same-millisecond statements.
#[derive(Debug, Default)]
pub struct TxnIdGenerator {
    last: AtomicI64,
}

impl TxnIdGenerator {
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    pub fn next_id(&self) -> i64 {
        let candidate = Utc::now().timestamp_millis() << COUNTER_BITS;
        let mut prev = self.last.load(Ordering::SeqCst);
        loop {
            let next = if candidate > prev { candidate } else { prev + 1 };
            match self
                .last
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_strictly_increase() {
        let ids = TxnIdGenerator::new();
        let mut prev = ids.next_id();
        for _ in 0..1000 {
            let next = ids.next_id();
            assert!(next > prev);
            prev = next;
        }
    }
}

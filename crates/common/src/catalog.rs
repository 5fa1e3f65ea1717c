use crate::error::{Error, Result};

/// Cluster topology as the coordinator sees it: how many partitions hold
/// data. Captured once at construction; a statement runs against a fixed
/// partition count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterTopology {
    partition_count: usize,
}

impl ClusterTopology {
    pub fn new(partition_count: usize) -> Result<Self> {
        if partition_count == 0 {
            return Err(Error::Validation(
                "cluster must have at least one partition".to_string(),
            ));
        }
        Ok(Self { partition_count })
    }

    pub fn partition_count(&self) -> usize {
        self.partition_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_cluster() {
        assert!(matches!(ClusterTopology::new(0), Err(Error::Validation(_))));
    }

    #[test]
    fn reports_partition_count() {
        let topology = ClusterTopology::new(4).unwrap();
        assert_eq!(topology.partition_count(), 4);
    }
}

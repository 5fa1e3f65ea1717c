//! Replicated-write correction.
//!
//! A mutation against a table replicated on every partition is reported
//! once per partition, so the aggregated row count is the true count
//! multiplied by the partition count.

use arrow::record_batch::RecordBatch;
use tracing::debug;

use floe_common::table::{as_scalar_long, modified_count_table};
use floe_common::{Error, Result};

/// Divides a replicated-DML row count back down to the true count.
/// Anything that is not a replicated mutation, or not shaped like a
/// single-cell count, passes through unchanged.
pub fn correct_replicated_dml(
    result: RecordBatch,
    is_replicated_dml: bool,
    partition_count: usize,
) -> Result<RecordBatch> {
    if !is_replicated_dml {
        return Ok(result);
    }

    let raw = match as_scalar_long(&result) {
        Ok(raw) => raw,
        Err(_) => return Ok(result),
    };

    let partitions = partition_count as i64;
    if partitions == 0 || raw % partitions != 0 {
        return Err(Error::ReplicationConsistency {
            raw,
            partitions: partition_count,
        });
    }

    let corrected = raw / partitions;
    debug!(raw, corrected, partitions, "corrected replicated DML count");
    modified_count_table(corrected)
}

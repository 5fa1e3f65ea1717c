//! Helpers over Arrow record batches for the single-cell count tables that
//! DML statements report.

use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use crate::error::{Error, Result};

/// Column name under which DML row counts are reported.
pub const MODIFIED_TUPLES: &str = "modified_tuples";

/// Builds the single-column, single-row BIGINT table reporting a DML row
/// count.
pub fn modified_count_table(count: i64) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![Field::new(
        MODIFIED_TUPLES,
        DataType::Int64,
        false,
    )]));
    let array = Int64Array::from(vec![count]);
    Ok(RecordBatch::try_new(schema, vec![Arc::new(array) as ArrayRef])?)
}

/// Reads a table expected to hold exactly one BIGINT cell.
pub fn as_scalar_long(batch: &RecordBatch) -> Result<i64> {
    if batch.num_columns() != 1 || batch.num_rows() != 1 {
        return Err(Error::Execution(format!(
            "expected a 1x1 scalar table, got {} columns x {} rows",
            batch.num_columns(),
            batch.num_rows()
        )));
    }
    let column = batch
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| Error::Execution("scalar column is not BIGINT".to_string()))?;
    Ok(column.value(0))
}

/// Sums the scalar cells of several one-cell tables.
pub fn sum_scalar_longs<'a, I>(batches: I) -> Result<i64>
where
    I: IntoIterator<Item = &'a RecordBatch>,
{
    let mut total = 0i64;
    for batch in batches {
        total += as_scalar_long(batch)?;
    }
    Ok(total)
}

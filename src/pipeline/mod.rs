pub mod aggregator;
pub mod assembler;
pub mod coordinator;
pub mod validator;

use crate::errors::{PipelineError, PipelineResult};
use crate::models::{PricedBatch, PricingEngine};
use crate::types::{InputRow, ResultRecord};
use aggregator::SummaryStats;
use std::panic::{self, AssertUnwindSafe};

/// Error carried by every row of a chunk whose pipeline faulted.
pub const CHUNK_FAILURE_MESSAGE: &str = "Processing error: internal failure while pricing this row's chunk";

/// Everything a worker hands back for one chunk. Workers share nothing else.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutput {
    /// Position of the chunk's first row in the full batch.
    pub offset: usize,
    pub records: Vec<ResultRecord>,
    pub stats: SummaryStats,
}

impl ChunkOutput {
    /// Every row of the chunk as a failed record with the generic message.
    pub fn failed(offset: usize, rows: &[InputRow]) -> Self {
        let records = rows
            .iter()
            .map(|row| ResultRecord::failed(row, CHUNK_FAILURE_MESSAGE))
            .collect();
        let mut stats = SummaryStats::new();
        stats.observe_failures(rows.len());
        Self { offset, records, stats }
    }
}

/// Validate → price → assemble → aggregate for one chunk.
pub fn process_chunk(
    offset: usize,
    rows: &[InputRow],
    engine: &dyn PricingEngine,
) -> PipelineResult<ChunkOutput> {
    let validation = validator::validate_rows(rows);

    let priced = if validation.batch.is_empty() {
        PricedBatch::default()
    } else {
        engine.price_batch(&validation.batch)?
    };

    let records = assembler::assemble(rows, &validation, &priced)?;
    let stats = SummaryStats::from_records(&records);

    tracing::debug!(
        offset,
        rows = rows.len(),
        valid = validation.valid_count(),
        engine = engine.name(),
        "chunk processed"
    );

    Ok(ChunkOutput { offset, records, stats })
}

/// [`process_chunk`] with its faults contained: an error or a panic turns
/// every row of this chunk into a failed record, and nothing escapes.
pub fn process_chunk_isolated(
    offset: usize,
    rows: &[InputRow],
    engine: &dyn PricingEngine,
) -> ChunkOutput {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| process_chunk(offset, rows, engine)));

    let fault = match outcome {
        Ok(Ok(output)) => return output,
        Ok(Err(e)) => e,
        Err(payload) => PipelineError::ChunkFailed {
            offset,
            reason: panic_message(payload.as_ref()),
        },
    };

    tracing::warn!(offset, rows = rows.len(), error = %fault, "chunk failed, rows marked as errors");
    ChunkOutput::failed(offset, rows)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic with non-string payload".to_string()
    }
}

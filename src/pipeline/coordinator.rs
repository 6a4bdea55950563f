//! Chunk coordination: split a batch into contiguous chunks, run the
//! per-chunk pipeline inline or on a bounded worker pool, and merge the chunk
//! outputs back in row order.
//!
//! Workers receive a read-only view of the rows and return an owned
//! [`ChunkOutput`]; the only merge point is the slot vector filled at fan-in,
//! indexed by chunk number, so completion order never affects the result.

use crate::config::PipelineConfig;
use crate::errors::{PipelineError, PipelineResult};
use crate::models::black_scholes::BlackScholesEngine;
use crate::models::{OptionBatch, PricingEngine};
use crate::pipeline::aggregator::SummaryStats;
use crate::pipeline::assembler::NON_FINITE_MESSAGE;
use crate::pipeline::{process_chunk_isolated, validator, ChunkOutput};
use crate::table::InputTable;
use crate::types::{
    round4, BatchResponse, Greeks, InputRow, OptionParams, ProcessingInfo, SingleCalculation,
};
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

/// A contiguous slice of the batch: rows `offset..offset + len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub offset: usize,
    pub len: usize,
}

impl ChunkSpan {
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Partition `n_rows` into spans of `chunk_size` (the last may be shorter).
/// Spans cover every row exactly once, in order.
pub fn plan_chunks(n_rows: usize, chunk_size: usize) -> Vec<ChunkSpan> {
    let chunk_size = chunk_size.max(1);
    (0..n_rows)
        .step_by(chunk_size)
        .map(|offset| ChunkSpan {
            offset,
            len: chunk_size.min(n_rows - offset),
        })
        .collect()
}

/// Batch pricing entry point. Cheap to share: the engine sits behind an `Arc`.
#[derive(Clone)]
pub struct BatchPricer {
    config: PipelineConfig,
    engine: Arc<dyn PricingEngine>,
}

impl BatchPricer {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_engine(config, Arc::new(BlackScholesEngine::new()))
    }

    pub fn with_engine(config: PipelineConfig, engine: Arc<dyn PricingEngine>) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn price_table(&self, table: InputTable) -> PipelineResult<BatchResponse> {
        self.price_rows(table.into_rows()).await
    }

    /// Price a batch. Small batches run inline on the caller; larger ones fan
    /// out to the worker pool and block until every chunk is back (or the
    /// fan-in timeout fires, which fails the whole request).
    pub async fn price_rows(&self, rows: Vec<InputRow>) -> PipelineResult<BatchResponse> {
        let batch_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("batch", %batch_id);

        async move {
            let rows = into_row_order(rows);
            if !self.config.should_parallelize(rows.len()) {
                return Ok(self.run_inline(&rows));
            }

            let started = Instant::now();
            let plan = plan_chunks(rows.len(), self.config.chunk_size);
            let info = ProcessingInfo {
                num_chunks: plan.len(),
                workers: self.config.worker_count,
                chunk_size: self.config.chunk_size,
                parallel: true,
            };

            tracing::info!(
                rows = rows.len(),
                chunks = plan.len(),
                workers = info.workers,
                "dispatching batch to worker pool"
            );

            let rows: Arc<[InputRow]> = rows.into();
            let fan_out = self.fan_out(Arc::clone(&rows), &plan);
            let outputs = match self.config.fan_in_timeout {
                Some(limit) => tokio::time::timeout(limit, fan_out).await.map_err(|_| {
                    tracing::error!(timeout = ?limit, "batch fan-in timed out");
                    PipelineError::Timeout(limit)
                })?,
                None => fan_out.await,
            };

            let response = merge(outputs, info);
            log_completion(&response, started);
            Ok(response)
        }
        .instrument(span)
        .await
    }

    /// Single-threaded pipeline over the whole batch, chunk by chunk on the
    /// calling thread. Never fails: chunk faults become failed rows.
    pub fn price_rows_inline(&self, rows: Vec<InputRow>) -> BatchResponse {
        self.run_inline(&into_row_order(rows))
    }

    fn run_inline(&self, rows: &[InputRow]) -> BatchResponse {
        let started = Instant::now();
        let plan = plan_chunks(rows.len(), self.config.chunk_size);
        let info = ProcessingInfo {
            num_chunks: plan.len(),
            workers: 1,
            chunk_size: self.config.chunk_size,
            parallel: false,
        };

        let outputs = plan
            .iter()
            .map(|span| process_chunk_isolated(span.offset, &rows[span.range()], self.engine.as_ref()))
            .collect();

        let response = merge(outputs, info);
        log_completion(&response, started);
        response
    }

    /// Dispatch every span to a blocking task, at most `worker_count` at a
    /// time, and collect the outputs into per-chunk slots.
    async fn fan_out(&self, rows: Arc<[InputRow]>, plan: &[ChunkSpan]) -> Vec<ChunkOutput> {
        let permits = Arc::new(Semaphore::new(self.config.worker_count.max(1)));
        let mut set = JoinSet::new();

        for (slot, span) in plan.iter().copied().enumerate() {
            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(p) => p,
                Err(e) => {
                    // Semaphore is never closed; the missing slot fails below.
                    tracing::error!(offset = span.offset, error = %e, "worker pool unavailable");
                    continue;
                }
            };
            let rows = Arc::clone(&rows);
            let engine = Arc::clone(&self.engine);
            set.spawn_blocking(move || {
                let _permit = permit;
                (slot, process_chunk_isolated(span.offset, &rows[span.range()], engine.as_ref()))
            });
        }

        let mut slots: Vec<Option<ChunkOutput>> = (0..plan.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((slot, output)) => slots[slot] = Some(output),
                Err(e) => tracing::warn!(error = %e, "chunk task did not complete"),
            }
        }

        slots
            .into_iter()
            .zip(plan)
            .map(|(output, span)| {
                output.unwrap_or_else(|| {
                    tracing::warn!(offset = span.offset, rows = span.len, "chunk lost, rows marked as errors");
                    ChunkOutput::failed(span.offset, &rows[span.range()])
                })
            })
            .collect()
    }

    /// Price one option outside of a batch. Rule failures come back as
    /// [`PipelineError::InvalidInput`] with the validator's message.
    pub fn price_single(&self, params: &OptionParams) -> PipelineResult<SingleCalculation> {
        let row = InputRow::new(
            0,
            params.spot,
            params.strike,
            params.expiry,
            params.r,
            params.sigma,
            Some(params.option_type.as_str()),
        );
        let v = validator::validate_row(&row).map_err(PipelineError::InvalidInput)?;

        let mut batch = OptionBatch::with_capacity(1);
        batch.push(v.spot, v.strike, v.expiry, v.rate, v.sigma, v.kind);
        let priced = self.engine.price_batch(&batch)?;
        if !priced.is_consistent(1) {
            return Err(PipelineError::Engine(format!(
                "engine returned {} results for 1 option",
                priced.len()
            )));
        }

        let values = [
            priced.price[0],
            priced.delta[0],
            priced.gamma[0],
            priced.theta[0],
            priced.vega[0],
            priced.rho[0],
        ]
        .map(round4);
        if values.iter().any(|x| !x.is_finite()) {
            return Err(PipelineError::InvalidInput(NON_FINITE_MESSAGE.to_string()));
        }
        let [price, delta, gamma, theta, vega, rho] = values;

        Ok(SingleCalculation {
            option_price: price,
            greeks: Greeks { delta, gamma, theta, vega, rho },
            input_parameters: params.clone(),
        })
    }
}

/// Rows sorted by `row_index` (stable; already-ordered input is not touched).
fn into_row_order(mut rows: Vec<InputRow>) -> Vec<InputRow> {
    if rows.windows(2).any(|w| w[0].row_index > w[1].row_index) {
        rows.sort_by_key(|r| r.row_index);
    }
    rows
}

/// Concatenate chunk outputs (already in offset order) and fold their stats.
fn merge(outputs: Vec<ChunkOutput>, info: ProcessingInfo) -> BatchResponse {
    let total: usize = outputs.iter().map(|o| o.records.len()).sum();
    let mut results = Vec::with_capacity(total);
    let mut stats = SummaryStats::new();

    for output in outputs {
        stats = stats.combine(output.stats);
        results.extend(output.records);
    }

    BatchResponse {
        total_rows: results.len(),
        successful_calculations: stats.successful,
        failed_calculations: stats.failed,
        results,
        processing_summary: stats.summary(),
        processing_info: info,
    }
}

fn log_completion(response: &BatchResponse, started: Instant) {
    tracing::info!(
        rows = response.total_rows,
        successful = response.successful_calculations,
        failed = response.failed_calculations,
        chunks = response.processing_info.num_chunks,
        parallel = response.processing_info.parallel,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "batch priced"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PricedBatch;
    use crate::pipeline::CHUNK_FAILURE_MESSAGE;
    use crate::types::CellValue;
    use std::time::Duration;

    fn sample_rows(n: usize) -> Vec<InputRow> {
        (0..n)
            .map(|i| {
                let spot = 80.0 + (i % 41) as f64;
                let expiry = (i % 5) as f64 * 0.25;
                let kind = if i % 2 == 0 { Some("call") } else { Some("PUT") };
                if i % 13 == 5 {
                    InputRow::new(i, spot, -1.0, expiry, 0.03, 0.2, kind)
                } else if i % 17 == 3 {
                    InputRow::new(i, None::<f64>, 100.0, expiry, 0.03, 0.2, None)
                } else {
                    InputRow::new(i, spot, 100.0, expiry, 0.03, 0.15 + (i % 7) as f64 * 0.05, kind)
                }
            })
            .collect()
    }

    fn parallel_config(chunk_size: usize, workers: usize) -> PipelineConfig {
        PipelineConfig::default()
            .with_chunk_size(chunk_size)
            .with_worker_count(workers)
            .with_parallel_threshold(1)
    }

    /// Fails every chunk that contains a put with spot 99.5 (sample spots are whole numbers).
    struct FlakyEngine;

    impl PricingEngine for FlakyEngine {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn price_batch(&self, batch: &OptionBatch) -> PipelineResult<PricedBatch> {
            if batch.spot.iter().zip(&batch.is_put).any(|(&s, &p)| p && s == 99.5) {
                panic!("injected fault");
            }
            BlackScholesEngine::new().price_batch(batch)
        }
    }

    struct SlowEngine(Duration);

    impl PricingEngine for SlowEngine {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn price_batch(&self, batch: &OptionBatch) -> PipelineResult<PricedBatch> {
            std::thread::sleep(self.0);
            BlackScholesEngine::new().price_batch(batch)
        }
    }

    #[test]
    fn test_plan_chunks_partitions_exactly() {
        assert!(plan_chunks(0, 10).is_empty());
        assert_eq!(plan_chunks(5, 10), vec![ChunkSpan { offset: 0, len: 5 }]);

        let plan = plan_chunks(25, 10);
        assert_eq!(
            plan,
            vec![
                ChunkSpan { offset: 0, len: 10 },
                ChunkSpan { offset: 10, len: 10 },
                ChunkSpan { offset: 20, len: 5 },
            ]
        );
        assert_eq!(plan.iter().map(|s| s.len).sum::<usize>(), 25);
        assert_eq!(plan_chunks(3, 0).len(), 3);
    }

    #[tokio::test]
    async fn test_three_rows_one_invalid() {
        let rows = vec![
            InputRow::new(0, 100.0, 100.0, 0.25, 0.05, 0.2, Some("call")),
            InputRow::new(1, 100.0, -100.0, 0.25, 0.05, 0.2, Some("call")),
            InputRow::new(2, 110.0, 100.0, 0.0, 0.05, 0.2, Some("call")),
        ];
        let response = BatchPricer::new(PipelineConfig::default()).price_rows(rows).await.unwrap();

        assert_eq!(response.total_rows, 3);
        assert_eq!(response.successful_calculations, 2);
        assert_eq!(response.failed_calculations, 1);
        assert!(!response.processing_info.parallel);

        let summary = response.processing_summary;
        assert_eq!(summary.min_option_price, Some(4.615));
        assert_eq!(summary.max_option_price, Some(10.0));
        assert_eq!(summary.total_option_value, Some(14.615));
        assert_eq!(summary.average_option_price, Some(7.3075));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let response = BatchPricer::new(parallel_config(10, 2)).price_rows(vec![]).await.unwrap();
        assert_eq!(response.total_rows, 0);
        assert!(response.results.is_empty());
        assert_eq!(response.successful_calculations + response.failed_calculations, 0);
        assert_eq!(response.processing_summary.average_option_price, None);
    }

    #[tokio::test]
    async fn test_chunking_does_not_change_results() {
        let rows = sample_rows(1_000);
        let reference = BatchPricer::new(PipelineConfig::default().with_chunk_size(usize::MAX))
            .price_rows_inline(rows.clone());
        assert_eq!(reference.processing_info.num_chunks, 1);
        let reference_json = serde_json::to_string(&reference.results).unwrap();

        for (chunk_size, workers) in [(1, 3), (7, 2), (64, 8), (333, 4), (999, 1)] {
            let response = BatchPricer::new(parallel_config(chunk_size, workers))
                .price_rows(rows.clone())
                .await
                .unwrap();

            assert!(response.processing_info.parallel);
            assert_eq!(response.total_rows, 1_000);
            assert_eq!(
                response.successful_calculations + response.failed_calculations,
                response.total_rows
            );
            assert_eq!(serde_json::to_string(&response.results).unwrap(), reference_json);
            assert_eq!(response.processing_summary, reference.processing_summary);
            assert_eq!(response.successful_calculations, reference.successful_calculations);
        }
    }

    #[tokio::test]
    async fn test_results_are_row_ordered_and_echo_input() {
        let rows = sample_rows(500);
        let response = BatchPricer::new(parallel_config(37, 4))
            .price_rows(rows.clone())
            .await
            .unwrap();

        for (record, row) in response.results.iter().zip(&rows) {
            assert_eq!(record.row_index, row.row_index);
            assert_eq!(record.input_data.spot, row.spot);
            assert_eq!(record.input_data.strike, row.strike);
            assert_eq!(record.input_data.sigma, row.sigma);
            assert_eq!(record.error.is_none(), !record.calculated_values.is_empty());
        }
    }

    #[tokio::test]
    async fn test_unordered_input_is_sorted_by_row_index() {
        let mut rows = sample_rows(30);
        rows.reverse();
        let response = BatchPricer::new(parallel_config(4, 3)).price_rows(rows).await.unwrap();
        let order: Vec<usize> = response.results.iter().map(|r| r.row_index).collect();
        assert_eq!(order, (0..30).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_faulty_chunk_is_isolated() {
        let mut rows = sample_rows(100);
        // row 47 is a put (odd index); make it the poison row
        rows[47] = InputRow::new(47, 99.5, 100.0, 1.0, 0.03, 0.2, Some("put"));

        let pricer = BatchPricer::with_engine(parallel_config(10, 4), Arc::new(FlakyEngine));
        let response = pricer.price_rows(rows.clone()).await.unwrap();
        let healthy = BatchPricer::new(parallel_config(10, 4)).price_rows(rows).await.unwrap();

        assert_eq!(response.total_rows, 100);
        for (i, (got, want)) in response.results.iter().zip(&healthy.results).enumerate() {
            if (40..50).contains(&i) {
                assert_eq!(got.error.as_deref(), Some(CHUNK_FAILURE_MESSAGE));
                assert!(got.calculated_values.is_empty());
                assert_eq!(got.input_data, want.input_data);
            } else {
                assert_eq!(got, want, "row {i} should be unaffected");
            }
        }
        assert_eq!(response.failed_calculations, 100 - response.successful_calculations);
    }

    fn extreme_rows() -> Vec<InputRow> {
        vec![
            InputRow::new(0, 1e305, 1.0, 1.0, 0.0, 0.2, Some("call")),
            InputRow::new(1, 1e16, 1.0, 1.0, 0.0, 0.2, None),
            InputRow::new(2, f64::MAX, 1.0, 1.0, 0.05, 0.2, Some("put")),
            InputRow::new(3, 100.0, 100.0, 1e6, 0.05, 1e-300, Some("call")),
            InputRow::new(4, 100.0, 90.0, 1e300, 0.05, 1e-320, Some("put")),
            InputRow::new(5, 100.0, 100.0, 1.0, 0.05, 50.0, None),
            InputRow::new(6, 1e-300, 1e300, 1e-300, -0.5, 1e-300, Some("put")),
            InputRow::new(7, 100.0, 100.0, 0.25, 0.05, 0.2, Some("call")),
        ]
    }

    #[tokio::test]
    async fn test_extreme_inputs_keep_error_and_values_consistent() {
        for config in [PipelineConfig::default(), parallel_config(3, 2)] {
            let response = BatchPricer::new(config).price_rows(extreme_rows()).await.unwrap();
            let json = serde_json::to_value(&response).unwrap();
            let results = json["results"].as_array().unwrap();

            let mut with_error = 0;
            for record in results {
                let values = &record["calculated_values"];
                let greeks = &values["greeks"];
                let fields = [
                    &values["option_price"],
                    &greeks["delta"],
                    &greeks["gamma"],
                    &greeks["theta"],
                    &greeks["vega"],
                    &greeks["rho"],
                ];
                if record["error"].is_null() {
                    assert!(fields.iter().all(|v| v.is_number()), "row {}", record["row_index"]);
                } else {
                    with_error += 1;
                    assert!(fields.iter().all(|v| v.is_null()), "row {}", record["row_index"]);
                }
            }

            assert_eq!(json["failed_calculations"], with_error);
            assert_eq!(json["successful_calculations"], results.len() - with_error);
            assert_eq!(json["total_rows"], results.len());

            // huge spots price without clamping
            assert_eq!(results[0]["error"], serde_json::Value::Null);
            assert_eq!(results[0]["calculated_values"]["option_price"], 1e305);
            assert_eq!(results[1]["calculated_values"]["option_price"], 1e16);
            assert_eq!(results[7]["calculated_values"]["option_price"], 4.615);
            assert_eq!(response.processing_summary.max_option_price, Some(1e305));
            assert_eq!(response.processing_summary.min_option_price.map(|p| p >= 0.0), Some(true));
        }
    }

    #[tokio::test]
    async fn test_fan_in_timeout_fails_request() {
        let config = parallel_config(2, 1).with_fan_in_timeout(Some(Duration::from_millis(20)));
        let pricer = BatchPricer::with_engine(config, Arc::new(SlowEngine(Duration::from_millis(200))));
        let err = pricer.price_rows(sample_rows(10)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_price_table_from_json() {
        let table = InputTable::from_json(
            r#"[{"S": 100, "K": 100, "T": 0.25, "r": 0.05, "sigma": 0.2},
                {"S": "abc", "K": 100, "T": 0.25, "r": 0.05, "sigma": 0.2, "option_type": "put"}]"#,
        )
        .unwrap();
        let response = BatchPricer::new(PipelineConfig::default()).price_table(table).await.unwrap();

        assert_eq!(response.results[0].input_data.option_type, "call");
        assert_eq!(response.results[1].input_data.spot, CellValue::Text("abc".into()));
        assert_eq!(response.results[1].error.as_deref(), Some("S is missing/invalid"));
    }

    #[test]
    fn test_price_single() {
        let pricer = BatchPricer::new(PipelineConfig::default());
        let params = OptionParams {
            spot: 100.0,
            strike: 100.0,
            expiry: 1.0,
            r: 0.05,
            sigma: 0.2,
            option_type: "put".into(),
        };
        let quote = pricer.price_single(&params).unwrap();
        assert_eq!(quote.option_price, 5.5735);
        assert_eq!(quote.greeks.delta, -0.3632);
        assert_eq!(quote.input_parameters, params);

        let bad = OptionParams { sigma: 0.0, ..params };
        match pricer.price_single(&bad) {
            Err(PipelineError::InvalidInput(msg)) => assert_eq!(msg, "sigma must be > 0"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}

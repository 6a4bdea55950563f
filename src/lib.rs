//! Batch Black-Scholes pricing.
//!
//! Takes an already-parsed table of option rows (`S`, `K`, `T`, `r`, `sigma`,
//! optional `option_type`) and returns one [`BatchResponse`]: a result record
//! per row, in row order, with the submitted values echoed back, the rounded
//! price and Greeks (or the row's validation error), and summary statistics.
//!
//! ```no_run
//! use bs_batch::{BatchPricer, InputTable, PipelineConfig};
//!
//! # async fn run() -> bs_batch::PipelineResult<()> {
//! let table = InputTable::from_json(r#"[{"S": 100, "K": 100, "T": 0.25, "r": 0.05, "sigma": 0.2}]"#)?;
//! let response = BatchPricer::new(PipelineConfig::from_env()?).price_table(table).await?;
//! println!("{}", serde_json::to_string(&response)?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod table;
pub mod types;

pub use config::PipelineConfig;
pub use errors::{PipelineError, PipelineResult};
pub use models::black_scholes::BlackScholesEngine;
pub use models::{OptionBatch, OptionKind, PricedBatch, PricingEngine};
pub use pipeline::coordinator::BatchPricer;
pub use table::InputTable;
pub use types::{BatchResponse, CellValue, InputRow, OptionParams, ResultRecord, SingleCalculation};

use serde::{Deserialize, Serialize};

/// Option type applied when a row carries none.
pub const DEFAULT_OPTION_TYPE: &str = "call";

// ── Input ──

/// One cell of an input column, exactly as the upstream parser produced it.
///
/// Kept verbatim so the response can echo what was submitted; numeric
/// interpretation happens in the validator, never here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Numeric reading of the cell. `None` for missing, non-numeric or NaN.
    /// Infinities are returned as-is; the validator rejects them separately.
    pub fn as_number(&self) -> Option<f64> {
        let x = match self {
            CellValue::Number(x) => *x,
            CellValue::Text(s) => s.trim().parse::<f64>().ok()?,
            CellValue::Null | CellValue::Bool(_) => return None,
        };
        (!x.is_nan()).then_some(x)
    }
}

impl From<f64> for CellValue {
    fn from(x: f64) -> Self {
        CellValue::Number(x)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(CellValue::Null, Into::into)
    }
}

/// A row of the input table. `row_index` is the 0-based position in the
/// original dataset and is the only ordering key.
#[derive(Debug, Clone, PartialEq)]
pub struct InputRow {
    pub row_index: usize,
    pub spot: CellValue,
    pub strike: CellValue,
    pub expiry: CellValue,
    pub rate: CellValue,
    pub sigma: CellValue,
    pub option_type: Option<String>,
}

impl InputRow {
    pub fn new(
        row_index: usize,
        spot: impl Into<CellValue>,
        strike: impl Into<CellValue>,
        expiry: impl Into<CellValue>,
        rate: impl Into<CellValue>,
        sigma: impl Into<CellValue>,
        option_type: Option<&str>,
    ) -> Self {
        Self {
            row_index,
            spot: spot.into(),
            strike: strike.into(),
            expiry: expiry.into(),
            rate: rate.into(),
            sigma: sigma.into(),
            option_type: option_type.map(str::to_string),
        }
    }

    /// The option type as submitted, or `None` if absent/blank.
    pub fn submitted_option_type(&self) -> Option<&str> {
        self.option_type
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }

    /// Echo of the submitted values for the response. Only the option type
    /// is ever filled in, with [`DEFAULT_OPTION_TYPE`].
    pub fn input_data(&self) -> InputData {
        InputData {
            spot: self.spot.clone(),
            strike: self.strike.clone(),
            expiry: self.expiry.clone(),
            r: self.rate.clone(),
            sigma: self.sigma.clone(),
            option_type: self
                .submitted_option_type()
                .unwrap_or(DEFAULT_OPTION_TYPE)
                .to_string(),
        }
    }
}

// ── Output ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputData {
    #[serde(rename = "S")]
    pub spot: CellValue,
    #[serde(rename = "K")]
    pub strike: CellValue,
    #[serde(rename = "T")]
    pub expiry: CellValue,
    pub r: CellValue,
    pub sigma: CellValue,
    pub option_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GreekValues {
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub rho: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CalculatedValues {
    pub option_price: Option<f64>,
    pub greeks: GreekValues,
}

impl CalculatedValues {
    /// Every field null; the shape carried by failed rows.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        let g = &self.greeks;
        self.option_price.is_none()
            && g.delta.is_none()
            && g.gamma.is_none()
            && g.theta.is_none()
            && g.vega.is_none()
            && g.rho.is_none()
    }
}

/// Per-row unit of the response. `calculated_values` is all-null exactly
/// when `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub row_index: usize,
    pub input_data: InputData,
    pub calculated_values: CalculatedValues,
    pub error: Option<String>,
}

impl ResultRecord {
    pub fn failed(row: &InputRow, error: impl Into<String>) -> Self {
        Self {
            row_index: row.row_index,
            input_data: row.input_data(),
            calculated_values: CalculatedValues::empty(),
            error: Some(error.into()),
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessingSummary {
    pub average_option_price: Option<f64>,
    pub min_option_price: Option<f64>,
    pub max_option_price: Option<f64>,
    pub total_option_value: Option<f64>,
}

/// How the batch was executed. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingInfo {
    pub num_chunks: usize,
    pub workers: usize,
    #[serde(rename = "chunksize")]
    pub chunk_size: usize,
    pub parallel: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub total_rows: usize,
    pub successful_calculations: usize,
    pub failed_calculations: usize,
    pub results: Vec<ResultRecord>,
    pub processing_summary: ProcessingSummary,
    pub processing_info: ProcessingInfo,
}

// ── Single calculation ──

/// Parameters for pricing one option outside of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionParams {
    #[serde(rename = "S")]
    pub spot: f64,
    #[serde(rename = "K")]
    pub strike: f64,
    #[serde(rename = "T")]
    pub expiry: f64,
    pub r: f64,
    pub sigma: f64,
    #[serde(default = "default_option_type")]
    pub option_type: String,
}

fn default_option_type() -> String {
    DEFAULT_OPTION_TYPE.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleCalculation {
    pub option_price: f64,
    pub greeks: Greeks,
    pub input_parameters: OptionParams,
}

/// From this magnitude up an `f64` is a multiple of 0.125, already exact at 4 dp.
const ROUND4_EXACT_FROM: f64 = 1e15;

/// Round half away from zero to 4 decimal places. Negative zero comes back as 0.
/// Finite input always gives finite output.
#[inline]
pub fn round4(x: f64) -> f64 {
    if x.abs() >= ROUND4_EXACT_FROM {
        return x;
    }
    let r = (x * 10_000.0).round() / 10_000.0;
    if r == 0.0 {
        0.0
    } else {
        r
    }
}

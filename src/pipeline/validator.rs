//! Row validation.
//!
//! Each numeric field has its own rule; every failing rule contributes one
//! message and the messages are joined with "; ". Validation reads the input
//! rows and never mutates them.

use crate::models::{OptionBatch, OptionKind};
use crate::types::{CellValue, InputRow};
use smallvec::SmallVec;

pub const MESSAGE_SEPARATOR: &str = "; ";

type Messages = SmallVec<[String; 6]>;

/// Parameters of a row that passed every rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidRow {
    pub spot: f64,
    pub strike: f64,
    pub expiry: f64,
    pub rate: f64,
    pub sigma: f64,
    pub kind: OptionKind,
}

/// Validation result for one chunk: a mask and an error slot per row (same
/// order as the input), plus the valid rows gathered into a pricing batch.
///
/// `mask[i] == errors[i].is_none()` for every row, and `batch` holds exactly
/// the rows where `mask` is true, in order.
#[derive(Debug, Clone, Default)]
pub struct ChunkValidation {
    pub mask: Vec<bool>,
    pub errors: Vec<Option<String>>,
    pub batch: OptionBatch,
}

impl ChunkValidation {
    pub fn valid_count(&self) -> usize {
        self.batch.len()
    }
}

pub fn validate_rows(rows: &[InputRow]) -> ChunkValidation {
    let mut out = ChunkValidation {
        mask: Vec::with_capacity(rows.len()),
        errors: Vec::with_capacity(rows.len()),
        batch: OptionBatch::with_capacity(rows.len()),
    };

    for row in rows {
        match validate_row(row) {
            Ok(v) => {
                out.mask.push(true);
                out.errors.push(None);
                out.batch.push(v.spot, v.strike, v.expiry, v.rate, v.sigma, v.kind);
            }
            Err(msg) => {
                out.mask.push(false);
                out.errors.push(Some(msg));
            }
        }
    }

    out
}

/// Apply every rule to one row. `Err` carries all failures joined by "; ".
pub fn validate_row(row: &InputRow) -> Result<ValidRow, String> {
    let mut messages = Messages::new();

    let spot = positive("S", &row.spot, &mut messages);
    let strike = positive("K", &row.strike, &mut messages);
    let expiry = non_negative("T", &row.expiry, &mut messages);
    let rate = finite("r", &row.rate, &mut messages);
    let sigma = positive("sigma", &row.sigma, &mut messages);
    let kind = option_kind(row.submitted_option_type(), &mut messages);

    match (spot, strike, expiry, rate, sigma, kind) {
        (Some(spot), Some(strike), Some(expiry), Some(rate), Some(sigma), Some(kind))
            if messages.is_empty() =>
        {
            Ok(ValidRow { spot, strike, expiry, rate, sigma, kind })
        }
        _ => Err(messages.join(MESSAGE_SEPARATOR)),
    }
}

/// Any finite number.
fn finite(name: &str, cell: &CellValue, messages: &mut Messages) -> Option<f64> {
    let Some(x) = cell.as_number() else {
        messages.push(format!("{name} is missing/invalid"));
        return None;
    };
    if !x.is_finite() {
        messages.push(format!("{name} must be a finite number"));
        return None;
    }
    Some(x)
}

/// Finite and > 0.
fn positive(name: &str, cell: &CellValue, messages: &mut Messages) -> Option<f64> {
    let x = finite(name, cell, messages)?;
    if x <= 0.0 {
        messages.push(format!("{name} must be > 0"));
        return None;
    }
    Some(x)
}

/// Finite and >= 0.
fn non_negative(name: &str, cell: &CellValue, messages: &mut Messages) -> Option<f64> {
    let x = finite(name, cell, messages)?;
    if x < 0.0 {
        messages.push(format!("{name} must be >= 0"));
        return None;
    }
    Some(x)
}

/// Absent defaults to a call; present must be call/put in any case.
fn option_kind(raw: Option<&str>, messages: &mut Messages) -> Option<OptionKind> {
    let Some(raw) = raw else {
        return Some(OptionKind::Call);
    };
    let kind = OptionKind::parse(raw);
    if kind.is_none() {
        messages.push("option_type must be 'call' or 'put'".to_string());
    }
    kind
}

use crate::errors::{PipelineError, PipelineResult};
use crate::models::PricedBatch;
use crate::pipeline::validator::ChunkValidation;
use crate::types::{round4, CalculatedValues, GreekValues, InputRow, ResultRecord};

/// Error for a row that validated but whose outputs overflowed or went NaN.
pub const NON_FINITE_MESSAGE: &str = "calculation produced non-finite values";

/// Merge input rows, validation outcome and engine output into result
/// records, one per row, in input order.
///
/// `priced` is parallel to `validation.batch`, so a cursor advances through
/// it only on valid rows. A shape mismatch between the three is an engine
/// fault for the whole chunk.
pub fn assemble(
    rows: &[InputRow],
    validation: &ChunkValidation,
    priced: &PricedBatch,
) -> PipelineResult<Vec<ResultRecord>> {
    if validation.mask.len() != rows.len() || validation.errors.len() != rows.len() {
        return Err(PipelineError::Engine(format!(
            "validation covers {} rows, chunk has {}",
            validation.mask.len(),
            rows.len()
        )));
    }
    if !priced.is_consistent(validation.valid_count()) {
        return Err(PipelineError::Engine(format!(
            "engine returned {} results for {} valid rows",
            priced.len(),
            validation.valid_count()
        )));
    }

    let mut cursor = 0usize;
    let records = rows
        .iter()
        .zip(validation.mask.iter().zip(&validation.errors))
        .map(|(row, (&is_valid, error))| {
            if !is_valid {
                let msg = error.as_deref().unwrap_or("row failed validation");
                return ResultRecord::failed(row, msg);
            }
            let j = cursor;
            cursor += 1;
            match calculated_values(priced, j) {
                Some(values) => ResultRecord {
                    row_index: row.row_index,
                    input_data: row.input_data(),
                    calculated_values: values,
                    error: None,
                },
                None => ResultRecord::failed(row, NON_FINITE_MESSAGE),
            }
        })
        .collect();

    Ok(records)
}

/// Rounded outputs for engine row `j`, or `None` if any rounded value is not
/// finite. The check runs on what will be reported.
fn calculated_values(priced: &PricedBatch, j: usize) -> Option<CalculatedValues> {
    let rounded = [
        priced.price[j],
        priced.delta[j],
        priced.gamma[j],
        priced.theta[j],
        priced.vega[j],
        priced.rho[j],
    ]
    .map(round4);
    if rounded.iter().any(|x| !x.is_finite()) {
        return None;
    }
    let [price, delta, gamma, theta, vega, rho] = rounded;
    Some(CalculatedValues {
        option_price: Some(price),
        greeks: GreekValues {
            delta: Some(delta),
            gamma: Some(gamma),
            theta: Some(theta),
            vega: Some(vega),
            rho: Some(rho),
        },
    })
}

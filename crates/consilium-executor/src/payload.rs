//! Raw worker payload → WorkerResult
//!
//! Workers answer in free form. Accepted shapes: a JSON object, a string holding
//! JSON, or text with a fenced json block (optionally surrounded by prose).

use consilium_core::WorkerResult;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("payload has no JSON object")]
    NoJson,

    #[error("payload does not match the result shape: {0}")]
    Shape(#[from] serde_json::Error),

    #[error("confidence {0} outside [0, 1]")]
    Confidence(f64),
}

pub fn parse_worker_output(raw: &Value) -> Result<WorkerResult, PayloadError> {
    let result: WorkerResult = match raw {
        Value::Object(_) => serde_json::from_value(raw.clone())?,
        Value::String(text) => {
            let json = extract_json(text).ok_or(PayloadError::NoJson)?;
            serde_json::from_str(json)?
        }
        _ => return Err(PayloadError::NoJson),
    };
    check_confidence(&result)?;
    Ok(result)
}

/// Locate the JSON text inside a worker's free-form answer.
fn extract_json(text: &str) -> Option<&str> {
    let candidate = if let Some(rest) = text.split("```json").nth(1) {
        rest.split("```").next().unwrap_or(rest)
    } else if text.contains("```") {
        text.split("```").nth(1).unwrap_or(text)
    } else {
        text
    }
    .trim();

    if candidate.starts_with('{') {
        return Some(candidate);
    }
    // Prose around a bare object.
    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    (end > start).then(|| &candidate[start..=end])
}

fn check_confidence(result: &WorkerResult) -> Result<(), PayloadError> {
    for c in [result.confidence, result.primary_diagnosis.confidence] {
        if !c.is_finite() || !(0.0..=1.0).contains(&c) {
            return Err(PayloadError::Confidence(c));
        }
    }
    Ok(())
}

//! Push frame decoding.

use leadcast_api_types::LeadEventMessage;
use serde_json::Value;
use thiserror::Error;

use crate::domain::MutationEvent;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("push frame is not valid json: {0}")]
    Json(#[source] serde_json::Error),
    #[error("push frame is not a lead event: {0}")]
    Shape(#[source] serde_json::Error),
}

/// Decode one text or binary frame into a `MutationEvent`.
///
/// Some servers send the event object encoded again as a JSON string; both forms are
/// accepted.
pub fn decode_event(payload: &[u8]) -> Result<MutationEvent, DecodeError> {
    let value: Value = serde_json::from_slice(payload).map_err(DecodeError::Json)?;
    let value = match value {
        Value::String(inner) => serde_json::from_str(&inner).map_err(DecodeError::Json)?,
        other => other,
    };
    let message: LeadEventMessage = serde_json::from_value(value).map_err(DecodeError::Shape)?;
    Ok(message.into())
}

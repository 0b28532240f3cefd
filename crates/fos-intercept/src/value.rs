//! Response values
//!
//! The `response` attribute as a tagged union, with one conversion per
//! variant. Values are computed from the complete response buffer.

use crate::document::{Document, DocumentParser, is_document_mime};
use crate::error::{Result, XhrError};
use crate::transport::{ReadyState, ResponseType};
use bytes::Bytes;

/// `response` value
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseValue {
    Text(String),
    Json(serde_json::Value),
    Bytes(Bytes),
    Document(Document),
}

impl ResponseValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseValue::Json(json) => Some(json),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            ResponseValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            ResponseValue::Document(doc) => Some(doc),
            _ => None,
        }
    }
}

/// Decode a buffer as text, replacing invalid sequences
pub fn decode_text(buffer: &[u8]) -> String {
    String::from_utf8_lossy(buffer).into_owned()
}

/// `responseText` for the current state
pub fn response_text(response_type: ResponseType, state: ReadyState, buffer: &[u8]) -> Result<String> {
    if !response_type.allows_text() {
        return Err(XhrError::InvalidState(
            "responseText is only available when responseType is \"\" or \"text\"",
        ));
    }
    if state < ReadyState::Loading {
        return Ok(String::new());
    }
    Ok(decode_text(buffer))
}

/// Parse the buffer into a document, when the type and host allow it
pub fn parse_document(
    mime: Option<&str>,
    buffer: &[u8],
    parser: Option<&dyn DocumentParser>,
) -> Option<Document> {
    let mime = mime.unwrap_or("text/xml");
    if !is_document_mime(mime) {
        tracing::debug!("Not parsing response document: {} is not a document type", mime);
        return None;
    }

    let Some(parser) = parser.filter(|p| p.supports(mime)) else {
        tracing::warn!("No document parser available for {}; responseXML is null", mime);
        return None;
    };

    let parsed = parser.parse(mime, &decode_text(buffer));
    if parsed.is_none() {
        tracing::warn!("Failed to parse {} response document", mime);
    }
    parsed
}

/// Compute the final `response` value for a completed exchange.
///
/// Returns `None` where XMLHttpRequest yields `null` (unparseable JSON,
/// non-document types, missing parser).
pub fn compute(
    response_type: ResponseType,
    mime: Option<&str>,
    buffer: &[u8],
    parser: Option<&dyn DocumentParser>,
) -> Option<ResponseValue> {
    match response_type {
        ResponseType::Default | ResponseType::Text => {
            Some(ResponseValue::Text(decode_text(buffer)))
        }
        ResponseType::ArrayBuffer | ResponseType::Blob => {
            Some(ResponseValue::Bytes(Bytes::copy_from_slice(buffer)))
        }
        ResponseType::Json => match serde_json::from_slice(buffer) {
            Ok(json) => Some(ResponseValue::Json(json)),
            Err(e) => {
                tracing::debug!("Response is not valid JSON: {}", e);
                None
            }
        },
        ResponseType::Document => {
            parse_document(mime, buffer, parser).map(ResponseValue::Document)
        }
    }
}

//! Request body
//!
//! Representation-agnostic access to the bytes handed to `send()`. Each
//! representation is materialized on first access and cached; once the
//! underlying source has been taken every accessor fails.

use crate::error::BodyError;
use bytes::Bytes;
use std::cell::{Cell, OnceCell, RefCell};

/// Lazily materialized request body
#[derive(Debug, Default)]
pub struct Body {
    source: RefCell<Option<Bytes>>,
    used: Cell<bool>,
    bytes: OnceCell<Bytes>,
    text: OnceCell<String>,
    json: OnceCell<serde_json::Value>,
}

impl Body {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            source: RefCell::new(Some(bytes.into())),
            ..Default::default()
        }
    }

    /// Has the source been taken?
    pub fn is_used(&self) -> bool {
        self.used.get()
    }

    /// Raw bytes
    pub fn bytes(&self) -> Result<Bytes, BodyError> {
        self.ensure_unused()?;
        if let Some(bytes) = self.bytes.get() {
            return Ok(bytes.clone());
        }
        let bytes = self
            .source
            .borrow()
            .clone()
            .ok_or(BodyError::AlreadyUsed)?;
        Ok(self.bytes.get_or_init(|| bytes).clone())
    }

    /// Body decoded as UTF-8 text
    pub fn text(&self) -> Result<String, BodyError> {
        self.ensure_unused()?;
        if let Some(text) = self.text.get() {
            return Ok(text.clone());
        }
        let bytes = self.bytes()?;
        let text = std::str::from_utf8(&bytes)?.to_string();
        Ok(self.text.get_or_init(|| text).clone())
    }

    /// Body parsed as JSON
    pub fn json(&self) -> Result<serde_json::Value, BodyError> {
        self.ensure_unused()?;
        if let Some(json) = self.json.get() {
            return Ok(json.clone());
        }
        let bytes = self.bytes()?;
        let json = serde_json::from_slice(&bytes)?;
        Ok(self.json.get_or_init(|| json).clone())
    }

    /// Take the underlying bytes, consuming the body for every holder
    pub fn take(&self) -> Result<Bytes, BodyError> {
        self.ensure_unused()?;
        let bytes = self.source.borrow_mut().take().ok_or(BodyError::AlreadyUsed)?;
        self.used.set(true);
        Ok(bytes)
    }

    pub fn len(&self) -> usize {
        if self.is_used() {
            return 0;
        }
        self.source.borrow().as_ref().map_or(0, |b| b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_unused(&self) -> Result<(), BodyError> {
        if self.used.get() {
            Err(BodyError::AlreadyUsed)
        } else {
            Ok(())
        }
    }
}

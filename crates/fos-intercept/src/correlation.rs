//! Request correlation
//!
//! Every logical request gets an id when it is opened. Requests allowed
//! through unmocked carry that id in a reserved header so a lower
//! interception layer recognizes them and does not consult its own
//! handler a second time.

use crate::headers::Headers;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Default name of the header carrying the correlation id
pub const REQUEST_ID_HEADER: &str = "x-fos-intercept-request-id";

/// Opaque per-request identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How request ids are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// `req-1`, `req-2`, ... (deterministic)
    #[default]
    Sequential,
    /// Random UUID v4
    Random,
}

/// Request id allocator
#[derive(Debug)]
pub struct IdGenerator {
    strategy: IdStrategy,
    next: Cell<u64>,
}

impl IdGenerator {
    pub fn new(strategy: IdStrategy) -> Self {
        Self {
            strategy,
            next: Cell::new(1),
        }
    }

    pub fn sequential() -> Self {
        Self::new(IdStrategy::Sequential)
    }

    pub fn random() -> Self {
        Self::new(IdStrategy::Random)
    }

    /// Allocate the next id
    pub fn next_id(&self) -> RequestId {
        match self.strategy {
            IdStrategy::Sequential => {
                let n = self.next.get();
                self.next.set(n + 1);
                RequestId(format!("req-{}", n))
            }
            IdStrategy::Random => RequestId(uuid::Uuid::new_v4().to_string()),
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::sequential()
    }
}

/// Allocates ids and recognizes requests already seen by another layer
#[derive(Debug, Clone)]
pub struct CorrelationGuard {
    ids: Rc<IdGenerator>,
    header: String,
}

impl CorrelationGuard {
    pub fn new(ids: Rc<IdGenerator>, header: impl Into<String>) -> Self {
        Self {
            ids,
            header: header.into(),
        }
    }

    /// Allocate an id for a newly opened request
    pub fn allocate(&self) -> RequestId {
        self.ids.next_id()
    }

    /// Name of the reserved header
    pub fn header_name(&self) -> &str {
        &self.header
    }

    /// The id another layer attached to these headers, if any.
    ///
    /// The header name matches case-insensitively. Only the first value
    /// counts when the tag was set more than once.
    pub fn recognize(&self, headers: &Headers) -> Option<RequestId> {
        headers
            .get_all(&self.header)
            .first()
            .filter(|v| !v.is_empty())
            .map(|v| RequestId::new(*v))
    }
}

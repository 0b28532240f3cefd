//! Interception configuration

use crate::correlation::{IdStrategy, REQUEST_ID_HEADER};
use serde::{Deserialize, Serialize};
use url::Url;

/// Interceptor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptConfig {
    /// Base URL relative request URLs resolve against
    pub base_url: Url,
    /// Header carrying the correlation id on passthrough requests
    pub tag_header: String,
    /// How request ids are generated
    pub id_strategy: IdStrategy,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://localhost/").expect("static URL is valid"),
            tag_header: REQUEST_ID_HEADER.to_string(),
            id_strategy: IdStrategy::Sequential,
        }
    }
}

impl InterceptConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn tag_header(mut self, name: impl Into<String>) -> Self {
        self.tag_header = name.into();
        self
    }

    pub fn id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }
}

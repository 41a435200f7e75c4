//! Project API key format validation.
//!
//! Keys look like `lsk_(live|test)_<32 alphanumerics>`. Format validation is
//! separate from resolution: the gateway's keyring decides whether a
//! well-formed key actually maps to a project.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::limits::API_KEY_PATTERN;

/// Compiled API key regex (lazy initialization).
static API_KEY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(API_KEY_PATTERN).expect("invalid API key pattern"));

/// API key environment: live or test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyEnv {
    Live,
    Test,
}

impl ApiKeyEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Test => "test",
        }
    }
}

/// A syntactically valid project API key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectKey {
    raw: String,
    env: ApiKeyEnv,
}

impl ProjectKey {
    /// Parse and validate an API key.
    ///
    /// Format: `lsk_(live|test)_[a-zA-Z0-9]{32}`
    pub fn parse(key: &str) -> Result<Self> {
        if key.is_empty() {
            return Err(Error::auth("API key is required"));
        }

        if !API_KEY_REGEX.is_match(key) {
            return Err(Error::auth("Invalid API key format"));
        }

        let env = if key.starts_with("lsk_live_") {
            ApiKeyEnv::Live
        } else {
            ApiKeyEnv::Test
        };

        Ok(Self {
            raw: key.to_string(),
            env,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn env(&self) -> ApiKeyEnv {
        self.env
    }

    pub fn is_live(&self) -> bool {
        self.env == ApiKeyEnv::Live
    }
}

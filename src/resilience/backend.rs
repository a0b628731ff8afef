//! Upstream language-model backends.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::Error;

/// One upstream language-model provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Claude,
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

impl Backend {
    /// Every known backend, cloud first.
    pub const ALL: [Backend; 3] = [Backend::Claude, Backend::OpenAi, Backend::Ollama];

    /// Cloud backends in fallback order.
    pub const CLOUD: [Backend; 2] = [Backend::Claude, Backend::OpenAi];

    /// The single local backend.
    pub const LOCAL: Backend = Backend::Ollama;

    pub fn is_cloud(self) -> bool {
        !self.is_local()
    }

    pub fn is_local(self) -> bool {
        matches!(self, Backend::Ollama)
    }

    /// The other cloud backend, if this one is cloud.
    pub fn cloud_peer(self) -> Option<Backend> {
        match self {
            Backend::Claude => Some(Backend::OpenAi),
            Backend::OpenAi => Some(Backend::Claude),
            Backend::Ollama => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Claude => "claude",
            Backend::OpenAi => "openai",
            Backend::Ollama => "ollama",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" => Ok(Backend::Claude),
            "openai" => Ok(Backend::OpenAi),
            "ollama" => Ok(Backend::Ollama),
            other => Err(Error::validation(format!("Unknown backend: {}", other))),
        }
    }
}

/// Target of a manual health reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetTarget {
    One(Backend),
    All,
}

impl FromStr for ResetTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(ResetTarget::All);
        }
        s.parse().map(ResetTarget::One)
    }
}

//! Local backend verification.
//!
//! The local model server is never assumed present: it starts unavailable and
//! only becomes routable after a probe confirms it answers.

use async_trait::async_trait;
use std::time::Duration;

use crate::types::{Error, LocalBackendConfig, Result};

/// Checks that the local backend is up.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LocalBackendProbe: Send + Sync {
    async fn probe(&self) -> Result<()>;
}

/// Probes an Ollama server by listing its installed models.
#[derive(Debug, Clone)]
pub struct OllamaProbe {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaProbe {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &LocalBackendConfig) -> Result<Self> {
        Self::new(config.base_url.clone(), config.probe_timeout)
    }
}

#[async_trait]
impl LocalBackendProbe for OllamaProbe {
    async fn probe(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::internal(format!(
                "local backend answered {} at {}",
                response.status(),
                url
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_against_closed_port_fails() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = OllamaProbe::new(format!("http://{}", addr), Duration::from_secs(2)).unwrap();
        assert!(probe.probe().await.is_err());
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let probe = OllamaProbe::new("http://localhost:11434/", Duration::from_secs(1)).unwrap();
        assert_eq!(probe.base_url, "http://localhost:11434");
    }
}

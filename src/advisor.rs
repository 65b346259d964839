// ===============================
// src/advisor.rs (trading advisor seam)
// ===============================
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

use crate::domain::TradingProfile;
use crate::market::MarketSnapshot;

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("advisor io error ({path}): {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("advisor returned malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reasoning service. Returns the raw document; parsing and trust decisions
/// belong to `recommendation::parse_value`.
#[async_trait]
pub trait TradingAdvisor: Send + Sync {
    async fn advise(&self, profile: &TradingProfile, snapshot: &MarketSnapshot) -> Result<Value, AdvisorError>;
}

/// Replays a saved advisor answer from disk.
pub struct FileAdvisor {
    path: PathBuf,
}

impl FileAdvisor {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }
}

#[async_trait]
impl TradingAdvisor for FileAdvisor {
    async fn advise(&self, profile: &TradingProfile, snapshot: &MarketSnapshot) -> Result<Value, AdvisorError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| AdvisorError::Io { path: self.path.display().to_string(), source })?;
        let doc: Value = serde_json::from_str(&text)?;
        info!(
            path = %self.path.display(),
            risk = ?profile.risk_tolerance,
            markets = snapshot.len(),
            "advisor: loaded recommendation document"
        );
        Ok(doc)
    }
}

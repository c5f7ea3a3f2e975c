//! HTTP helpers shared by the remote calls.

use anyhow::Result;

/// Extension trait for reqwest::Response to handle common error patterns.
#[async_trait::async_trait]
pub trait ResponseExt {
    /// Turns a non-2xx response into an error carrying the status and the body.
    async fn ensure_success(self, service: &str) -> Result<Self>
    where
        Self: Sized;
}

#[async_trait::async_trait]
impl ResponseExt for reqwest::Response {
    async fn ensure_success(self, service: &str) -> Result<Self> {
        if !self.status().is_success() {
            let status = self.status();
            let error_text = self.text().await.unwrap_or_default();
            anyhow::bail!("{service} service error ({status}): {error_text}");
        }
        Ok(self)
    }
}

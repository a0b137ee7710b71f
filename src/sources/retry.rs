use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use super::TableSource;

/// A [`TableSource`] wrapper that retries failed reads with exponential backoff.
///
/// `attempts` counts the first try; `backoff` is the delay before the first
/// retry and doubles after each one. The last error is returned once the
/// attempts are used up.
pub struct Retrying<S> {
    pub inner: S,
    pub attempts: u32,
    pub backoff: Duration,
}

impl<S> Retrying<S> {
    pub fn new(inner: S, attempts: u32, backoff: Duration) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            backoff,
        }
    }
}

#[async_trait]
impl<S: TableSource> TableSource for Retrying<S> {
    async fn read(&self, location: &str) -> std::io::Result<Vec<u8>> {
        let mut delay = self.backoff;
        let mut attempt = 1;
        loop {
            match self.inner.read(location).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if attempt < self.attempts => {
                    warn!(
                        location,
                        attempt,
                        max_attempts = self.attempts,
                        error = %e,
                        "Source read failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(std::io::Error::new(
                        e.kind(),
                        format!("{e} (gave up after {attempt} attempts)"),
                    ));
                }
            }
        }
    }
}

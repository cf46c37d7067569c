use crate::error::{ExporterError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A single deadline shared by every step of one collection.
///
/// Expires either when its instant passes or when its token is cancelled
/// (process shutdown). Both surface as `DeadlineExceeded`.
#[derive(Debug, Clone)]
pub struct Deadline {
    expires_at: Instant,
    token: CancellationToken,
}

impl Deadline {
    pub fn after(timeout: Duration, token: CancellationToken) -> Self {
        Self {
            expires_at: Instant::now() + timeout,
            token,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.expires_at
    }

    /// Drive `fut` until it completes or the deadline fires, whichever is first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_expired() {
            return Err(ExporterError::DeadlineExceeded);
        }

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ExporterError::DeadlineExceeded),
            res = tokio::time::timeout_at(self.expires_at, fut) => {
                res.map_err(|_| ExporterError::DeadlineExceeded)?
            }
        }
    }
}

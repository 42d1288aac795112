//! Service-specific tests
//!
//! Tests that exercise the real service implementations against the local
//! filesystem and real child processes.

#[cfg(test)]
mod process_reaper;

#[cfg(test)]
pub mod common {
    use std::time::Duration;
    use tokio::time::timeout;

    /// Generous ceiling for operations that involve a real child process
    pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    pub async fn with_timeout<T, F>(future: F) -> Result<T, tokio::time::error::Elapsed>
    where
        F: std::future::Future<Output = T>,
    {
        timeout(TEST_TIMEOUT, future).await
    }
}

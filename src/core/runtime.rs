//! Async bridge
//!
//! Every async entry point runs the synchronous operation on tokio's blocking
//! pool, so both forms share one implementation.

use crate::error::{ProviderError, Result};

pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(err) => Err(ProviderError::AsyncRuntime(err.to_string())),
    }
}

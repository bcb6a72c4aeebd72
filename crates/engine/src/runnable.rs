//! Background task capability

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use trellis_core::Result;

/// An instance with a background task bound to its namespace.
///
/// `run` is started when the node is first resolved and must return once
/// `cancel` fires. Returning an error cancels the whole namespace.
#[async_trait]
pub trait Runnable: Send + Sync {
    /// Run until cancelled
    async fn run(&self, cancel: CancellationToken) -> Result<()>;
}

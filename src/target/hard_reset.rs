//! Out-of-band restart of an unresponsive target.
use async_trait::async_trait;

use super::Target;
use crate::error::TargetResult;

/// Restarts a target without going through its command channel.
///
/// The harness consults this when a target stops responding. Implementations that
/// cannot act because the caller lacks permission must fail with
/// [`TargetError::Stable`](crate::error::TargetError::Stable) rather than leave the
/// target in an unknown state.
#[async_trait]
pub trait HardReset: Send + Sync {
    /// Name of the reset mechanism.
    fn name(&self) -> &str;

    /// Returns `true` if this mechanism can reset `target`, judged by its platform.
    fn probe(&self, target: &Target) -> bool;

    /// Restart `target`.
    async fn hard_reset(&self, target: &Target) -> TargetResult<()>;
}

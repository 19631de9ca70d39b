//! Authentication strategy abstraction.

use crate::error::Result;
use crate::traits::transport::ClientConfig;

/// Attaches credentials to a transport before any job runs.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, client: &mut ClientConfig) -> Result<()>;

    /// Get the strategy name (for logging/debugging).
    fn name(&self) -> &str {
        "unknown"
    }
}

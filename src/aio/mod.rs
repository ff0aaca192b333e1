pub mod client;

use std::time::Duration;

/// Retry discipline for the network operations. The defaults reproduce the
/// node's shipped behavior: five transport attempts per POST, association
/// retried until it succeeds.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Transport attempts per `post` call.
    pub post_attempts: u32,
    /// Pause between association attempts.
    pub connect_retry_delay: Duration,
    /// Cap on association attempts. `None` retries forever; the node has
    /// no fallback mode when the network is away.
    pub max_connect_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            post_attempts: 5,
            connect_retry_delay: Duration::from_secs(1),
            max_connect_attempts: None,
        }
    }
}

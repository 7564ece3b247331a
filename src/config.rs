use deployments::DeploymentRecord;
use std::time::Duration;

pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_FEED_BUFFER: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on a remote call before it is reverted as timed out.
    pub action_timeout: Duration,
    pub feed_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            action_timeout: DEFAULT_ACTION_TIMEOUT,
            feed_buffer: DEFAULT_FEED_BUFFER,
        }
    }
}

impl From<&DeploymentRecord> for EngineConfig {
    fn from(record: &DeploymentRecord) -> Self {
        let action_timeout = record
            .action_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_ACTION_TIMEOUT);
        Self {
            action_timeout,
            ..Self::default()
        }
    }
}

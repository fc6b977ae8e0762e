//! Timing configuration for the supervisor.

use std::time::Duration;

/// Intervals and bounds used by the monitor and the stop protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// How often the lifecycle monitor polls the worker's exit status.
    pub poll_interval: Duration,
    /// Pause after exit is observed so readers can flush trailing lines.
    pub exit_grace: Duration,
    /// Upper bound on waiting for each reader task after exit.
    pub reader_join_timeout: Duration,
    /// Upper bound on waiting for queued events to be delivered.
    pub dispatch_drain_timeout: Duration,
    /// How long a stop request waits for a cooperative exit.
    pub stop_grace: Duration,
    /// Poll interval inside the stop grace period.
    pub stop_poll_interval: Duration,
    /// Wait after SIGTERM before escalating to SIGKILL.
    pub terminate_wait: Duration,
    /// Wait after SIGKILL for the exit to become observable.
    pub kill_wait: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            exit_grace: Duration::from_millis(200),
            reader_join_timeout: Duration::from_secs(1),
            dispatch_drain_timeout: Duration::from_secs(1),
            stop_grace: Duration::from_secs(8),
            stop_poll_interval: Duration::from_millis(100),
            terminate_wait: Duration::from_millis(500),
            kill_wait: Duration::from_millis(500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol() {
        let cfg = SupervisorConfig::default();
        assert_eq!(cfg.poll_interval, Duration::from_millis(500));
        assert_eq!(cfg.stop_grace, Duration::from_secs(8));
        assert_eq!(cfg.stop_poll_interval, Duration::from_millis(100));
        assert_eq!(cfg.terminate_wait, Duration::from_millis(500));
    }
}

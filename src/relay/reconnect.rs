//! # Reconnect Policy
//!
//! Decides what to do when the upstream speech socket drops. The policy is
//! deliberately simple: a fixed delay and a capped attempt count. A clean
//! close (code 1000) means the far end finished on purpose and is never
//! retried; anything else gets exactly one scheduled attempt per decision,
//! up to the cap.

use std::time::Duration;

/// WebSocket close code for a normal, intentional closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// What the relay should do after a connection loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Schedule one reconnect attempt after the fixed delay
    Retry { after: Duration },
    /// Stop trying; surface the disconnect to the client
    GiveUp,
}

/// Fixed-delay, capped-attempt reconnect policy.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(delay_ms: u64, max_attempts: u32) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            max_attempts,
        }
    }

    /// Decide whether to reconnect.
    ///
    /// ## Parameters:
    /// - **close_code**: the WebSocket close code, if the far end sent one.
    ///   `None` means the transport errored without a close frame.
    /// - **attempts_made**: reconnect attempts already made for this session
    pub fn decide(&self, close_code: Option<u16>, attempts_made: u32) -> ReconnectDecision {
        // A clean close is an intentional stop, never a failure
        if close_code == Some(CLOSE_NORMAL) {
            return ReconnectDecision::GiveUp;
        }

        if attempts_made >= self.max_attempts {
            return ReconnectDecision::GiveUp;
        }

        ReconnectDecision::Retry { after: self.delay }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy::new(3000, 5)
    }

    #[test]
    fn test_clean_close_never_reconnects() {
        assert_eq!(
            policy().decide(Some(CLOSE_NORMAL), 0),
            ReconnectDecision::GiveUp
        );
    }

    #[test]
    fn test_non_clean_close_schedules_one_attempt_with_fixed_delay() {
        // Abnormal closure (1006) and going-away (1001) both retry
        for code in [Some(1006), Some(1001), None] {
            match policy().decide(code, 0) {
                ReconnectDecision::Retry { after } => {
                    assert_eq!(after, Duration::from_millis(3000));
                }
                ReconnectDecision::GiveUp => panic!("expected retry for close code {:?}", code),
            }
        }
    }

    #[test]
    fn test_attempts_are_capped() {
        let p = policy();
        assert!(matches!(p.decide(None, 4), ReconnectDecision::Retry { .. }));
        assert_eq!(p.decide(None, 5), ReconnectDecision::GiveUp);
        assert_eq!(p.decide(None, 100), ReconnectDecision::GiveUp);
    }

    #[test]
    fn test_zero_attempt_policy_gives_up_immediately() {
        let p = ReconnectPolicy::new(3000, 0);
        assert_eq!(p.decide(None, 0), ReconnectDecision::GiveUp);
    }
}

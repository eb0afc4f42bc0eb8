//! Reconnect state machine.
//!
//! Pure bookkeeping with no I/O: the connection task feeds it link events and
//! acts on the decisions it returns. Keeping it free of sockets and timers
//! makes every transition testable synchronously.
//!
//! ```text
//! Offline --open--> Connected --close--> Reconnecting --open--> Connected
//!                                          |     ^
//!                                          |     | close (attempts < max)
//!                                          +-----+
//!                                          | close (attempts >= max)
//!                                          v
//!                                        Offline (terminal until connect)
//! ```

use std::time::Duration;

use courier_shared::ConnectionState;

use crate::config::ClientConfig;

/// What the connection task should do after the link dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Dial again after the delay.
    RetryAfter(Duration),
    /// Retry budget exhausted; stay offline.
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    attempts: u32,
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl ConnectionMachine {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            state: ConnectionState::Offline,
            attempts: 0,
            max_retries: config.max_retries,
            base_delay: config.reconnect_base_delay,
            max_delay: config.reconnect_max_delay,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnect attempts made since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// `min(base * 2^attempt, max)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// A manual connect request. Clears any exhausted retry budget.
    pub fn on_connect_requested(&mut self) {
        self.attempts = 0;
    }

    /// The socket opened.
    pub fn on_open(&mut self) -> ConnectionState {
        self.attempts = 0;
        self.state = ConnectionState::Connected;
        self.state
    }

    /// The socket closed, failed to open, or missed its heartbeat deadline.
    pub fn on_link_lost(&mut self) -> ReconnectDecision {
        if self.attempts >= self.max_retries {
            self.state = ConnectionState::Offline;
            return ReconnectDecision::GiveUp;
        }
        self.state = ConnectionState::Reconnecting;
        ReconnectDecision::RetryAfter(self.backoff_delay(self.attempts))
    }

    /// The backoff timer fired; a new dial is about to start.
    pub fn on_retry_due(&mut self) {
        self.attempts += 1;
    }

    /// Explicit disconnect: offline, counter reset, no retry.
    pub fn on_disconnect(&mut self) -> ConnectionState {
        self.attempts = 0;
        self.state = ConnectionState::Offline;
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(max_retries: u32) -> ConnectionMachine {
        ConnectionMachine::new(&ClientConfig {
            max_retries,
            reconnect_base_delay: Duration::from_millis(1_000),
            reconnect_max_delay: Duration::from_millis(30_000),
            ..ClientConfig::default()
        })
    }

    /// Initial dial fails, then `n` retries each fail.
    fn fail_retries(m: &mut ConnectionMachine, n: u32) -> Vec<ReconnectDecision> {
        let mut decisions = vec![m.on_link_lost()];
        for _ in 0..n {
            m.on_retry_due();
            decisions.push(m.on_link_lost());
        }
        decisions
    }

    #[test]
    fn test_starts_offline_and_opens_to_connected() {
        let mut m = machine(10);
        assert_eq!(m.state(), ConnectionState::Offline);

        assert_eq!(m.on_open(), ConnectionState::Connected);
        assert_eq!(m.attempts(), 0);
    }

    #[test]
    fn test_three_failures_reconnecting_with_three_attempts() {
        let mut m = machine(10);
        fail_retries(&mut m, 2);
        m.on_retry_due();

        assert_eq!(m.state(), ConnectionState::Reconnecting);
        assert_eq!(m.attempts(), 3);
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let mut m = machine(10);
        let delays: Vec<Duration> = fail_retries(&mut m, 6)
            .into_iter()
            .map(|d| match d {
                ReconnectDecision::RetryAfter(delay) => delay,
                ReconnectDecision::GiveUp => panic!("gave up early"),
            })
            .collect();

        let ms: Vec<u128> = delays.iter().map(Duration::as_millis).collect();
        assert_eq!(ms, vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000]);
    }

    #[test]
    fn test_backoff_never_overflows() {
        let m = machine(10);
        assert_eq!(m.backoff_delay(64), Duration::from_millis(30_000));
    }

    #[test]
    fn test_exhausted_budget_goes_offline() {
        let mut m = machine(3);
        let decisions = fail_retries(&mut m, 3);

        assert_eq!(decisions.last(), Some(&ReconnectDecision::GiveUp));
        assert_eq!(m.state(), ConnectionState::Offline);

        // Offline is terminal: another loss still gives up.
        assert_eq!(m.on_link_lost(), ReconnectDecision::GiveUp);
    }

    #[test]
    fn test_open_resets_attempts() {
        let mut m = machine(10);
        fail_retries(&mut m, 4);
        assert_eq!(m.attempts(), 4);

        m.on_open();
        assert_eq!(m.attempts(), 0);
        assert_eq!(
            m.on_link_lost(),
            ReconnectDecision::RetryAfter(Duration::from_millis(1_000))
        );
    }

    #[test]
    fn test_manual_connect_after_giving_up() {
        let mut m = machine(2);
        fail_retries(&mut m, 2);
        assert_eq!(m.state(), ConnectionState::Offline);

        m.on_connect_requested();
        assert!(matches!(m.on_link_lost(), ReconnectDecision::RetryAfter(_)));
    }

    #[test]
    fn test_disconnect_resets() {
        let mut m = machine(10);
        fail_retries(&mut m, 2);

        assert_eq!(m.on_disconnect(), ConnectionState::Offline);
        assert_eq!(m.attempts(), 0);
    }
}

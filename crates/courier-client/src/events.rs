use courier_shared::protocol::NewMessageEvent;
use courier_shared::ConnectionState;

/// Notifications delivered to the consumer of a
/// [`ConnectionClient`](crate::ConnectionClient).
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Emitted on every transition, including repeated `Reconnecting`
    /// entries. Run through [`StateDeduplicator`] to collapse repeats.
    StateChanged(ConnectionState),
    /// A message pushed by the server.
    NewMessage(NewMessageEvent),
}

/// Drops consecutive duplicate states so observers only see real changes.
#[derive(Debug, Default)]
pub struct StateDeduplicator {
    last: Option<ConnectionState>,
}

impl StateDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Some(state)` when it differs from the previously observed one.
    pub fn observe(&mut self, state: ConnectionState) -> Option<ConnectionState> {
        if self.last == Some(state) {
            return None;
        }
        self.last = Some(state);
        Some(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deduplicator_collapses_repeats() {
        let mut dedup = StateDeduplicator::new();
        let seen: Vec<ConnectionState> = [
            ConnectionState::Reconnecting,
            ConnectionState::Reconnecting,
            ConnectionState::Reconnecting,
            ConnectionState::Connected,
            ConnectionState::Connected,
            ConnectionState::Offline,
        ]
        .into_iter()
        .filter_map(|s| dedup.observe(s))
        .collect();

        assert_eq!(
            seen,
            vec![
                ConnectionState::Reconnecting,
                ConnectionState::Connected,
                ConnectionState::Offline,
            ]
        );
    }
}

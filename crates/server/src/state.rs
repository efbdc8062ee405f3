use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use awxchat_agent::AgentRuntime;
use awxchat_slack::{SignatureVerifier, SlackBot};

/// Shared by every route. Cloning is cheap; all members are reference counted.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<AgentRuntime>,
    pub connections: ConnectionCounter,
    pub slack: Option<Arc<SlackState>>,
}

impl AppState {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime, connections: ConnectionCounter::default(), slack: None }
    }

    pub fn with_slack(mut self, slack: SlackState) -> Self {
        self.slack = Some(Arc::new(slack));
        self
    }
}

pub struct SlackState {
    pub bot: Arc<SlackBot>,
    /// `None` accepts unsigned requests.
    pub verifier: Option<SignatureVerifier>,
}

/// Live WebSocket connections, reported by `/health`.
#[derive(Clone, Debug, Default)]
pub struct ConnectionCounter(Arc<AtomicUsize>);

impl ConnectionCounter {
    pub fn open(&self) -> ConnectionGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard(self.0.clone())
    }

    pub fn current(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Decrements the counter when the connection's receive loop ends.
pub struct ConnectionGuard(Arc<AtomicUsize>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionCounter;

    #[test]
    fn guard_tracks_open_connections() {
        let counter = ConnectionCounter::default();
        let first = counter.open();
        let second = counter.open();
        assert_eq!(counter.current(), 2);

        drop(first);
        assert_eq!(counter.current(), 1);
        drop(second);
        assert_eq!(counter.current(), 0);
    }
}

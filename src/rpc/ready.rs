//! Ready/handshake state machine
//!
//! `Uninitialized → Initializing → Ready`, with `Closed` terminal and
//! reachable from anywhere. Waiters suspend on a watch channel until the
//! endpoint becomes ready or closes.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Handshake phase of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyPhase {
    /// Nothing heard from the frontend yet
    Uninitialized,
    /// Frontend announced it is initializing
    Initializing,
    /// Frontend acknowledged initialization
    Ready,
    /// Endpoint closed; terminal
    Closed,
}

/// Per-endpoint readiness tracker
#[derive(Debug)]
pub struct ReadyState {
    phase: watch::Sender<ReadyPhase>,
}

impl Default for ReadyState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadyState {
    /// Start in [`ReadyPhase::Uninitialized`].
    pub fn new() -> Self {
        let (phase, _) = watch::channel(ReadyPhase::Uninitialized);
        Self { phase }
    }

    /// Current phase
    pub fn phase(&self) -> ReadyPhase {
        *self.phase.borrow()
    }

    /// Whether operations may proceed
    pub fn is_ready(&self) -> bool {
        self.phase() == ReadyPhase::Ready
    }

    /// Whether the terminal phase was reached
    pub fn is_closed(&self) -> bool {
        self.phase() == ReadyPhase::Closed
    }

    /// Enter `Initializing`, clearing readiness. Returns whether the phase changed.
    pub fn begin_init(&self) -> bool {
        self.transition(ReadyPhase::Initializing)
    }

    /// Enter `Ready`, releasing all waiters. Returns whether the phase changed.
    pub fn mark_ready(&self) -> bool {
        self.transition(ReadyPhase::Ready)
    }

    /// Enter `Closed`. Returns `false` if already closed.
    pub fn close(&self) -> bool {
        self.transition(ReadyPhase::Closed)
    }

    fn transition(&self, next: ReadyPhase) -> bool {
        self.phase.send_if_modified(|phase| {
            if *phase == ReadyPhase::Closed || *phase == next {
                return false;
            }
            tracing::trace!(from = ?*phase, to = ?next, "ready phase transition");
            *phase = next;
            true
        })
    }

    /// Suspend until `Ready` or `Closed`, returning whichever was reached.
    pub async fn wait_ready(&self) -> ReadyPhase {
        let mut rx = self.phase.subscribe();
        match rx
            .wait_for(|phase| matches!(phase, ReadyPhase::Ready | ReadyPhase::Closed))
            .await
        {
            Ok(phase) => *phase,
            // The sender lives in `self`, so it cannot be dropped while we wait.
            Err(_) => ReadyPhase::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_transitions() {
        let state = ReadyState::new();
        assert_eq!(state.phase(), ReadyPhase::Uninitialized);
        assert!(state.begin_init());
        assert!(!state.begin_init());
        assert!(state.mark_ready());
        assert!(state.is_ready());
        assert!(state.begin_init());
        assert!(!state.is_ready());
        assert!(state.close());
        assert!(!state.close());
        assert!(!state.mark_ready());
        assert!(state.is_closed());
    }

    #[tokio::test]
    async fn test_wait_ready_released_by_mark_ready() {
        let state = Arc::new(ReadyState::new());
        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.wait_ready().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        state.begin_init();
        state.mark_ready();
        assert_eq!(waiter.await.unwrap(), ReadyPhase::Ready);
    }

    #[tokio::test]
    async fn test_wait_ready_released_by_close() {
        let state = ReadyState::new();
        state.close();
        assert_eq!(state.wait_ready().await, ReadyPhase::Closed);
    }
}

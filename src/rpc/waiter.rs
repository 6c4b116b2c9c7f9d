//! Single-fire waiters pairing one pending request with its outcome
//!
//! A [`Waiter`] is the producing half stored in an endpoint's pending table;
//! the [`WaitHandle`] is the consuming half held by the caller. The outcome is
//! delivered at most once. Dropping the waiter unset cancels the wait.

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use super::error::{BridgeError, RemoteError, Result, WaiterError};

/// Outcome delivered to a pending request
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Successful payload from the frontend
    Payload(Value),
    /// Frontend-reported failure
    Error(RemoteError),
}

/// Producing half: set exactly once
#[derive(Debug)]
pub struct Waiter {
    request_id: String,
    sender: Mutex<Option<oneshot::Sender<Outcome>>>,
}

/// Consuming half: awaited by the caller that issued the request
#[derive(Debug)]
pub struct WaitHandle {
    request_id: String,
    receiver: oneshot::Receiver<Outcome>,
}

impl Waiter {
    /// Create a linked waiter/handle pair for `request_id`.
    pub fn new(request_id: impl Into<String>) -> (Waiter, WaitHandle) {
        let request_id = request_id.into();
        let (sender, receiver) = oneshot::channel();
        (
            Waiter {
                request_id: request_id.clone(),
                sender: Mutex::new(Some(sender)),
            },
            WaitHandle {
                request_id,
                receiver,
            },
        )
    }

    /// Request id this waiter resolves.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Whether an outcome has already been delivered.
    pub fn is_set(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Deliver the outcome. A second call is an invariant violation.
    ///
    /// A caller that has already gone away is not an error; the outcome is
    /// simply discarded.
    pub fn set(&self, outcome: Outcome) -> std::result::Result<(), WaiterError> {
        let sender = self
            .sender
            .lock()
            .take()
            .ok_or_else(|| WaiterError::AlreadySet(self.request_id.clone()))?;

        if sender.send(outcome).is_err() {
            tracing::debug!(request_id = %self.request_id, "waiter outcome dropped, caller gone");
        }
        Ok(())
    }
}

impl WaitHandle {
    /// Request id this handle is waiting on.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Wait for the outcome.
    ///
    /// Returns [`BridgeError::Cancelled`] when the waiter was dropped unset.
    pub async fn wait(self) -> Result<Outcome> {
        self.receiver.await.map_err(|_| BridgeError::Cancelled)
    }
}

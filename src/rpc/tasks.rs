//! Tracked asynchronous work owned by an endpoint
//!
//! Every task spawned through a [`TaskTracker`] is recorded until it finishes
//! or is aborted. Closing the owner aborts everything still outstanding.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::task::{AbortHandle, JoinHandle};

use super::error::{BridgeError, Result};

type TaskTable = Mutex<HashMap<u64, TaskEntry>>;

struct TaskEntry {
    name: String,
    abort: AbortHandle,
}

/// Set of outstanding tasks
#[derive(Default)]
pub struct TaskTracker {
    tasks: Arc<TaskTable>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

/// Removes the task's entry when its future completes or is dropped.
struct TaskGuard {
    id: u64,
    tasks: Weak<TaskTable>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if let Some(tasks) = self.tasks.upgrade() {
            tasks.lock().remove(&self.id);
        }
    }
}

/// Handle to a tracked task; awaiting it yields the task's result.
///
/// An aborted task resolves to [`BridgeError::Cancelled`].
pub struct TrackedTask<T> {
    id: u64,
    name: String,
    handle: JoinHandle<Result<T>>,
}

impl<T> TrackedTask<T> {
    /// Tracker-local task id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Task name given at spawn time
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the task has finished
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Abort this task only.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl<T> Future for TrackedTask<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(err)) if err.is_cancelled() => Poll::Ready(Err(BridgeError::Cancelled)),
            Poll::Ready(Err(err)) => Poll::Ready(Err(BridgeError::handler(format!(
                "task '{}' panicked: {err}",
                self.name
            )))),
        }
    }
}

impl TaskTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `future` on the current tokio runtime and track it.
    ///
    /// `on_error` runs inside the task when the future returns an error; the
    /// error is still delivered to whoever awaits the [`TrackedTask`].
    /// Spawning on a closed tracker yields an already-aborted task.
    pub fn spawn<T, F, E>(&self, name: impl Into<String>, future: F, on_error: E) -> TrackedTask<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
        E: FnOnce(&BridgeError) + Send + 'static,
    {
        let name = name.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let guard = TaskGuard {
            id,
            tasks: Arc::downgrade(&self.tasks),
        };

        // The task body waits for its entry to exist so the guard never runs first.
        let (start, started) = oneshot::channel::<()>();
        let wrapped = async move {
            let _guard = guard;
            if started.await.is_err() {
                return Err(BridgeError::Cancelled);
            }
            let result = future.await;
            if let Err(err) = &result {
                on_error(err);
            }
            result
        };

        if self.closed.load(Ordering::Acquire) {
            drop(wrapped);
            tracing::debug!(task = %name, "tracker closed, task not started");
            let handle = tokio::spawn(async { Err(BridgeError::Cancelled) });
            return TrackedTask { id, name, handle };
        }

        // No lock is held here: a runtime that is shutting down drops
        // `wrapped` inside `spawn`, and its guard takes the table lock.
        let handle = tokio::spawn(wrapped);
        {
            let mut tasks = self.tasks.lock();
            if self.closed.load(Ordering::Acquire) || handle.is_finished() {
                drop(tasks);
                handle.abort();
                return TrackedTask { id, name, handle };
            }
            tasks.insert(
                id,
                TaskEntry {
                    name: name.clone(),
                    abort: handle.abort_handle(),
                },
            );
        }
        if start.send(()).is_err() {
            // The body was dropped before starting; its guard may have run
            // before the insert above.
            self.tasks.lock().remove(&id);
        }

        tracing::trace!(task = %name, id, "tracked task spawned");
        TrackedTask { id, name, handle }
    }

    /// Number of outstanding tasks.
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Whether no tasks are outstanding.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of outstanding tasks, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.lock().values().map(|e| e.name.clone()).collect();
        names.sort();
        names
    }

    /// Abort every outstanding task and refuse new ones. Returns how many were aborted.
    pub fn abort_all(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let entries: Vec<TaskEntry> = self.tasks.lock().drain().map(|(_, entry)| entry).collect();
        for entry in &entries {
            tracing::trace!(task = %entry.name, "aborting tracked task");
            entry.abort.abort();
        }
        entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_task_removes_itself() {
        let tracker = TaskTracker::new();
        let task = tracker.spawn("quick", async { Ok(7) }, |_| {});
        assert_eq!(task.await.unwrap(), 7);
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn test_error_hook_runs_and_error_propagates() {
        let tracker = TaskTracker::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let task = tracker.spawn(
            "failing",
            async { Err::<(), _>(BridgeError::handler("nope")) },
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        let err = task.await.unwrap_err();
        assert_eq!(err.to_string(), "nope");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abort_all_cancels() {
        let tracker = TaskTracker::new();
        let tasks: Vec<_> = (0..3)
            .map(|i| {
                tracker.spawn(
                    format!("sleeper-{i}"),
                    async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(())
                    },
                    |_| {},
                )
            })
            .collect();
        assert_eq!(tracker.len(), 3);
        assert_eq!(tracker.abort_all(), 3);
        for task in tasks {
            assert!(matches!(task.await, Err(BridgeError::Cancelled)));
        }
        assert!(tracker.is_empty());

        let late = tracker.spawn("late", async { Ok(()) }, |_| {});
        assert!(matches!(late.await, Err(BridgeError::Cancelled)));
    }

    #[test]
    fn test_spawn_during_runtime_shutdown_returns() {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let handle = runtime.handle().clone();
        drop(runtime);

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _enter = handle.enter();
            let tracker = TaskTracker::new();
            let _task = tracker.spawn("late", async { Ok(()) }, |_| {});
            let _ = done_tx.send(tracker.len());
        });

        let outstanding = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("spawn on a shut-down runtime must not block");
        assert_eq!(outstanding, 0);
    }
}

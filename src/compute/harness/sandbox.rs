//! Deadline-bounded execution of one unit of work on its own thread.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Deadline of {0:?} exceeded")]
    Timeout(Duration),
    #[error("Worker panicked")]
    WorkerPanicked,
    #[error("Failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Run `work` on a worker thread and wait at most `deadline` for its result.
///
/// On expiry the worker is detached and whatever it sends later is dropped
/// with the channel.
pub fn run_with_deadline<T, F>(deadline: Duration, work: F) -> Result<T, SandboxError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name("evaluation-worker".to_string())
        .spawn(move || {
            let _ = tx.send(work());
        })?;

    match rx.recv_timeout(deadline) {
        Ok(value) => Ok(value),
        Err(RecvTimeoutError::Timeout) => Err(SandboxError::Timeout(deadline)),
        Err(RecvTimeoutError::Disconnected) => Err(SandboxError::WorkerPanicked),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_completes_within_deadline() {
        let result = run_with_deadline(Duration::from_secs(5), || 21 * 2);
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_deadline_expiry() {
        let result = run_with_deadline(Duration::from_millis(10), || {
            thread::sleep(Duration::from_millis(300));
            1
        });
        assert!(matches!(result, Err(SandboxError::Timeout(_))));
    }

    #[test]
    fn test_panic_is_reported() {
        let result: Result<(), _> = run_with_deadline(Duration::from_secs(5), || panic!("boom"));
        assert!(matches!(result, Err(SandboxError::WorkerPanicked)));
    }

    #[test]
    fn test_late_result_is_discarded() {
        let writes = Arc::new(AtomicUsize::new(0));
        let worker_writes = Arc::clone(&writes);
        let result = run_with_deadline(Duration::from_millis(10), move || {
            thread::sleep(Duration::from_millis(100));
            worker_writes.fetch_add(1, Ordering::SeqCst);
            vec![1, 2, 3]
        });
        assert!(result.is_err());
        thread::sleep(Duration::from_millis(200));
        // The worker finished, but its output never reached the caller.
        assert_eq!(writes.load(Ordering::SeqCst), 1);
    }
}

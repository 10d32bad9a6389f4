use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::PipelineError;
use crate::transport::{GenerateRequest, GenerateResponse, GenerativeTransport};

/// Runs `call` on a worker thread and races it against `timeout`.
///
/// The receiver is dropped as soon as this returns, so a result that arrives
/// after the deadline is discarded by the worker's failed send and is never
/// observed by the caller.
pub fn dispatch<T, F>(label: &str, timeout: Duration, call: F) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name(format!("kotoba-dispatch-{label}"))
        .spawn(move || {
            if tx.send(call()).is_err() {
                debug!("late model result dropped after timeout");
            }
        })
        .map_err(|err| PipelineError::Transport(format!("dispatch thread spawn failed: {err}")))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(PipelineError::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(PipelineError::Transport(
            "dispatch worker exited without a result".to_string(),
        )),
    }
}

/// One model call under `request.timeout`.
pub fn dispatch_generate(
    transport: Arc<dyn GenerativeTransport>,
    request: GenerateRequest,
) -> Result<GenerateResponse, PipelineError> {
    let timeout = request.timeout;
    let label = transport.name().to_string();
    dispatch(&label, timeout, move || transport.generate(&request))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::dispatch;
    use crate::error::PipelineError;

    #[test]
    fn fast_result_wins() {
        let result = dispatch("fast", Duration::from_secs(1), || Ok(7));
        assert_eq!(result.ok(), Some(7));
    }

    #[test]
    fn errors_pass_through_unchanged() {
        let result: Result<(), _> = dispatch("err", Duration::from_secs(1), || {
            Err(PipelineError::SafetyBlock("SAFETY".to_string()))
        });
        assert!(matches!(result, Err(PipelineError::SafetyBlock(_))));
    }

    #[test]
    fn late_success_is_reported_as_timeout() {
        let finished = Arc::new(AtomicBool::new(false));
        let worker_flag = Arc::clone(&finished);
        let started = Instant::now();
        let result = dispatch("slow", Duration::from_millis(50), move || {
            thread::sleep(Duration::from_millis(300));
            worker_flag.store(true, Ordering::SeqCst);
            Ok("late")
        });
        assert!(matches!(result, Err(PipelineError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_millis(250));

        // the worker still completes; its result goes nowhere
        thread::sleep(Duration::from_millis(400));
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn panicking_call_is_a_transport_error() {
        let result: Result<(), _> =
            dispatch("panic", Duration::from_secs(1), || panic!("boom"));
        assert!(matches!(result, Err(PipelineError::Transport(_))));
    }
}

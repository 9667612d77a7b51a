//! Async runtime utilities for Requel.
//!
//! The host optimizer calls into Requel synchronously; `block_on` bridges that
//! callback onto the async pipeline. `with_deadline` is the single timeout
//! primitive used for both per-candidate validation and the overall
//! optimization deadline.

use std::future::Future;
use std::time::Duration;

use common_error::{RequelError, RequelResult};
use tokio::runtime::Runtime;

/// Get or create a Tokio runtime for blocking entry points.
pub fn get_runtime() -> RequelResult<Runtime> {
    Runtime::new().map_err(|e| RequelError::Internal(format!("failed to create runtime: {e}")))
}

/// Block on a future from synchronous host code.
pub fn block_on<F: Future>(future: F) -> RequelResult<F::Output> {
    let runtime = get_runtime()?;
    Ok(runtime.block_on(future))
}

/// Spawn a task on the current runtime.
pub fn spawn<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(future)
}

/// Run a future with a deadline, mapping expiry to `RequelError::Timeout`.
///
/// The label names the guarded operation in the error message so discard
/// reasons stay attributable.
pub async fn with_deadline<F, T>(label: &str, deadline: Duration, future: F) -> RequelResult<T>
where
    F: Future<Output = RequelResult<T>>,
{
    match tokio::time::timeout(deadline, future).await {
        Ok(result) => result,
        Err(_) => Err(RequelError::timeout(format!(
            "{label} exceeded {:.3}s",
            deadline.as_secs_f64()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_deadline_passes_fast_future() {
        let result = with_deadline("fast", Duration::from_secs(1), async { Ok(42u64) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_deadline_expires() {
        let result: RequelResult<()> =
            with_deadline("slow", Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        match result {
            Err(RequelError::Timeout(msg)) => assert!(msg.contains("slow")),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_block_on() {
        let value = block_on(async { 7 }).unwrap();
        assert_eq!(value, 7);
    }
}

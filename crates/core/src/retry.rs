use std::future::Future;
use std::time::Duration;
use tracing::warn;
use vitalcore_shared::errors::CoreResult;

const BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_DELAY: Duration = Duration::from_secs(8);
const MAX_ATTEMPTS: u32 = 3;

/// Retries an idempotent vendor call with exponential backoff
/// (`spec.md` §7: base 500ms, cap 8s, max 3 attempts). Never wrap the lab
/// extractor's whole-document call in this — extraction is not idempotent
/// against job state the way an object-store read or an LLM chat call is.
pub async fn with_backoff<T, F, Fut>(operation: &str, mut f: F) -> CoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CoreResult<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= MAX_ATTEMPTS => return Err(e),
            Err(e) => {
                let delay = (BASE_DELAY * 2u32.pow(attempt - 1)).min(MAX_DELAY);
                warn!(operation, attempt, error = %e, delay_ms = delay.as_millis(), "retrying after transient failure");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use vitalcore_shared::errors::CoreError;

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_backoff("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CoreError::ExternalStoreError("transient".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: CoreResult<()> = with_backoff("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CoreError::ExternalStoreError("permanent".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}

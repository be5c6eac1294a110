use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Race an operation against a deadline.
///
/// On expiry the in-flight future is dropped and the fallback value is
/// returned; the deadline never surfaces as an error. Every bounded call in
/// the crate goes through here rather than racing timers ad hoc.
pub async fn bounded<T, F, B>(deadline: Duration, operation: F, fallback: B) -> T
where
    F: Future<Output = T>,
    B: FnOnce() -> T,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(value) => value,
        Err(_) => {
            warn!(?deadline, "operation exceeded its deadline");
            fallback()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fast_operations_pass_through() {
        let value = bounded(Duration::from_secs(1), async { 42 }, || 0).await;
        assert_eq!(value, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_operations_yield_the_fallback() {
        let value = bounded(
            Duration::from_secs(5),
            std::future::pending::<u32>(),
            || 7,
        )
        .await;
        assert_eq!(value, 7);
    }
}

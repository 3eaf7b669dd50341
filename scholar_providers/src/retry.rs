use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Retry an async operation, sleeping for each of `delays` in turn.
///
/// The operation runs at most `delays.len() + 1` times; the error of the
/// last attempt is returned once the delays are used up.
pub async fn retry_with_backoff<F, Fut, T, E>(
    label: &str,
    mut operation: F,
    delays: &[Duration],
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = delays.len() + 1;

    for (i, delay) in delays.iter().enumerate() {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                warn!(
                    "{label} failed (attempt {}/{attempts}): {e}. Retrying after {:.1}s...",
                    i + 1,
                    delay.as_secs_f64()
                );
                sleep(*delay).await;
            }
        }
    }

    operation().await
}

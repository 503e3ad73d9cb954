use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::SourceError;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_DELAY: Duration = Duration::from_millis(100);

/// Retry a source call on transient failures, doubling the delay between
/// attempts. Permission and not-found errors propagate immediately.
pub async fn with_retries<T, F, Fut>(operation: &str, mut call: F) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let mut delay = INITIAL_DELAY;
    for attempt in 1..=MAX_ATTEMPTS {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying",
                    operation, attempt, MAX_ATTEMPTS, err
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(err) => return Err(err),
        }
    }
    unreachable!("retry loop returns on the final attempt")
}

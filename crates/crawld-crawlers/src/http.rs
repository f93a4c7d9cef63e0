use anyhow::{Context, bail};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, Response};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

const MAX_ATTEMPTS: u32 = 3;
const FALLBACK_DELAY: Duration = Duration::from_secs(1);
/// Upper bound on a server-requested wait.
const MAX_DELAY: Duration = Duration::from_secs(300);

/// Sends the request built by `build`, retrying rate-limited and unavailable
/// responses. Statuses in `allowed` are returned to the caller unchanged.
pub(crate) async fn send_with_retry<F>(
    mut build: F,
    allowed: &[StatusCode],
) -> anyhow::Result<Response>
where
    F: FnMut() -> anyhow::Result<RequestBuilder>,
{
    for attempt in 1..=MAX_ATTEMPTS {
        let response = build()?.send().await.context("send request")?;
        let status = response.status();
        if status.is_success() || allowed.contains(&status) {
            return Ok(response);
        }
        if is_retryable(status) && attempt < MAX_ATTEMPTS {
            let delay = retry_delay_from_headers(response.headers()).unwrap_or(FALLBACK_DELAY);
            let _ = response.bytes().await;
            debug!(%status, attempt, delay_secs = delay.as_secs(), "retrying request");
            tokio::time::sleep(delay).await;
            continue;
        }
        let url = response.url().to_string();
        bail!("request to {url} failed with status {status}");
    }
    bail!("request failed after retries");
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
    )
}

fn retry_delay_from_headers(headers: &HeaderMap) -> Option<Duration> {
    retry_after_seconds(headers)
        .or_else(|| ratelimit_reset_seconds(headers))
        .map(|secs| Duration::from_secs(secs).min(MAX_DELAY))
}

fn retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn ratelimit_reset_seconds(headers: &HeaderMap) -> Option<u64> {
    let reset = headers
        .get("x-ratelimit-reset")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    reset.checked_sub(now).filter(|secs| *secs > 0)
}

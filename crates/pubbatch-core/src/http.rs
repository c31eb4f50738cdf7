//! Blocking HTTP GET over a shared async client.
//!
//! Uses async reqwest internally on a small shared tokio runtime, but
//! presents a sync interface: the retrieval pipeline issues one call at a
//! time and blocks on it.

use std::sync::LazyLock;
use std::time::Duration;

use crate::error::RemoteError;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(concat!("pubbatch/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

/// Shared tokio runtime for HTTP operations.
static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// HTTP GET `url?params` and return the body as text.
///
/// The whole request (including body download) is bounded by `timeout`.
/// Errors are classified into transient / fatal by [`RemoteError::from_reqwest`].
pub fn get_text(
    url: &str,
    params: &[(&str, String)],
    timeout: Duration,
) -> Result<String, RemoteError> {
    SHARED_RUNTIME.handle().block_on(async {
        let response = SHARED_CLIENT
            .get(url)
            .query(params)
            .timeout(timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(RemoteError::from_reqwest)?;

        response.text().await.map_err(RemoteError::from_reqwest)
    })
}

//! Blocking HTTP GET over a shared async client.
//!
//! Uses async reqwest internally with tokio::time::timeout for bounded
//! exchanges, but presents a sync interface for rayon workers. Every exchange
//! is raced against a [`CancelToken`] so a cancelled run does not wait for
//! slow servers.

use std::sync::{LazyLock, OnceLock};
use std::time::Duration;

use crate::error::Fault;
use crate::shutdown::CancelToken;

/// How often an in-flight exchange re-checks its cancel token
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Process-wide HTTP settings, fixed once at startup
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    /// Upper bound for one complete request/response exchange
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
            user_agent: concat!("oaiharvest/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

static HTTP_CONFIG: OnceLock<HttpConfig> = OnceLock::new();

/// Install HTTP settings. Only the first call wins; must run before the first request.
pub fn set_http_config(config: HttpConfig) {
    if HTTP_CONFIG.set(config).is_err() {
        log::warn!("HTTP config already initialized, ignoring override");
    }
}

/// Current HTTP settings (defaults if never set)
pub fn http_config() -> &'static HttpConfig {
    HTTP_CONFIG.get_or_init(HttpConfig::default)
}

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    let config = http_config();
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .user_agent(config.user_agent.clone())
        .pool_max_idle_per_host(4)
        .build()
        .expect("failed to build HTTP client")
});

/// Get shared HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Status and decoded body of a completed exchange, whatever the status code
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP GET `url` with `query`, blocking the calling thread.
///
/// Any response that arrives in time is returned, including 4xx/5xx: callers
/// decide whether a non-2xx body still means something to them. Connection
/// failures and timeouts become [`Fault::Transport`]; cancellation becomes
/// [`Fault::Cancelled`].
pub fn get_text(
    url: &str,
    query: &[(&str, &str)],
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<HttpResponse, Fault> {
    if cancel.is_cancelled() {
        return Err(Fault::Cancelled);
    }

    SHARED_RUNTIME.handle().block_on(async {
        let exchange = async {
            let response = http_client()
                .get(url)
                .query(query)
                .send()
                .await
                .map_err(|e| Fault::from_reqwest(&e))?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| Fault::from_reqwest(&e))?;
            Ok::<_, Fault>(HttpResponse { status, body })
        };

        tokio::select! {
            result = tokio::time::timeout(timeout, exchange) => match result {
                Ok(outcome) => outcome,
                Err(_) => Err(Fault::transport(format!(
                    "request timed out after {:.0}s",
                    timeout.as_secs_f64()
                ))),
            },
            () = wait_cancelled(cancel) => Err(Fault::Cancelled),
        }
    })
}

async fn wait_cancelled(cancel: &CancelToken) {
    while !cancel.is_cancelled() {
        tokio::time::sleep(CANCEL_POLL).await;
    }
}

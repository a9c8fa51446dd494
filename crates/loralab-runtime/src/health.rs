//! HTTP health probing for the compute service.
//!
//! One probe is one `GET /health`. Scheduling lives in the supervisor.

use std::time::Duration;

use async_trait::async_trait;
use loralab_core::{HealthProber, HealthReport};
use reqwest::Client;
use tracing::debug;

/// Path of the compute service status endpoint.
pub const HEALTH_PATH: &str = "/health";

/// URL probed for a service listening on `port`.
pub fn health_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}{HEALTH_PATH}")
}

/// [`HealthProber`] issuing plain HTTP requests on localhost.
#[derive(Debug, Clone)]
pub struct HttpHealthProber {
    client: Client,
}

impl HttpHealthProber {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .no_proxy()
            .pool_max_idle_per_host(1)
            .build()?;
        Ok(Self { client })
    }

    /// Probe once, enforcing `timeout` on the whole request.
    pub async fn check(&self, port: u16, timeout: Duration) -> HealthReport {
        let url = health_url(port);
        let request = self.client.get(&url).timeout(timeout).send();

        // Hard cancellation on top of the client timeout: a stuck connect
        // must not hold up the supervisor's probe schedule.
        match tokio::time::timeout(timeout, request).await {
            Err(_) => HealthReport::unhealthy(format!(
                "Health check timed out after {}ms",
                timeout.as_millis()
            )),
            Ok(Ok(response)) if response.status().is_success() => HealthReport::Healthy,
            Ok(Ok(response)) => {
                debug!(port = %port, status = %response.status(), "Health check returned non-success status");
                HealthReport::unhealthy(format!(
                    "Health endpoint returned {}",
                    response.status()
                ))
            }
            Ok(Err(e)) => HealthReport::unhealthy(classify_request_error(&e)),
        }
    }
}

#[async_trait]
impl HealthProber for HttpHealthProber {
    async fn probe(&self, port: u16, timeout: Duration) -> HealthReport {
        self.check(port, timeout).await
    }
}

fn classify_request_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "Health check timed out".to_string()
    } else if err.is_connect() {
        "Connection refused".to_string()
    } else {
        format!("Health check failed: {err}")
    }
}

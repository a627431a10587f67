use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

use super::models::{ApiResponse, DeviceRegistration, DeviceStatusReport, Schedule};

/// Operations the monitor loop needs from the control plane.
///
/// Every call is request/response with a bounded timeout; failures are
/// generic transport errors that the loop isolates to the current cycle.
#[allow(async_fn_in_trait)]
pub trait ControlPlaneClient {
    /// Fetch the device's current schedule set
    async fn fetch_schedules(&self, device_id: &str) -> Result<Vec<Schedule>>;

    /// Push a status report after an enforcement transition
    async fn report_status(&self, device_id: &str, report: &DeviceStatusReport) -> Result<()>;

    /// Liveness signal, sent every cycle regardless of enforcement outcome
    async fn heartbeat(&self, device_id: &str, timestamp_ms: i64) -> Result<()>;

    /// Enroll this device with the control plane
    async fn register_device(&self, registration: &DeviceRegistration) -> Result<()>;
}

/// HTTP implementation of the control plane client
pub struct HttpControlPlane {
    client: Client,
    base_url: Url,
}

impl HttpControlPlane {
    /// Create a new client against the given base URL
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).context("Invalid server URL")?;

        if base_url.scheme() != "https" {
            anyhow::bail!(
                "Server URL must use HTTPS for security (got: {})",
                base_url.scheme()
            );
        }

        let client = Client::builder()
            .user_agent(format!("knets-agent/{}", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .https_only(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Invalid endpoint path: {}", path))
    }

    /// Check a mutating endpoint's response envelope
    async fn check_ack(response: reqwest::Response, what: &str) -> Result<()> {
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                let ack: ApiResponse<serde_json::Value> = response
                    .json()
                    .await
                    .with_context(|| format!("Failed to parse {} response", what))?;

                if !ack.success {
                    anyhow::bail!(
                        "Control plane rejected {}: {}",
                        what,
                        ack.message.unwrap_or_else(|| "no message".to_string())
                    );
                }
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                anyhow::bail!("Device not known to control plane (404) during {}", what)
            }
            status => {
                anyhow::bail!("Control plane returned {} for {}", status, what)
            }
        }
    }
}

impl ControlPlaneClient for HttpControlPlane {
    async fn fetch_schedules(&self, device_id: &str) -> Result<Vec<Schedule>> {
        let url = self.endpoint(&format!("api/companion/schedules/{}", device_id))?;
        tracing::debug!("Fetching schedules from: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to connect to control plane")?;

        match response.status() {
            StatusCode::OK => {
                let schedules: Vec<Schedule> = response
                    .json()
                    .await
                    .context("Failed to parse schedule list")?;

                tracing::debug!("Fetched {} schedule(s)", schedules.len());
                Ok(schedules)
            }
            StatusCode::NOT_FOUND => {
                anyhow::bail!(
                    "Device not known to control plane (404). Run 'knets-agent register' first."
                )
            }
            status => {
                anyhow::bail!("Control plane returned {} for schedule fetch", status)
            }
        }
    }

    async fn report_status(&self, device_id: &str, report: &DeviceStatusReport) -> Result<()> {
        let url = self.endpoint(&format!("api/companion/status/{}", device_id))?;
        tracing::debug!("Reporting status (locked={}) to: {}", report.is_locked, url);

        let response = self
            .client
            .put(url)
            .json(report)
            .send()
            .await
            .context("Failed to connect to control plane")?;

        Self::check_ack(response, "status report").await
    }

    async fn heartbeat(&self, device_id: &str, timestamp_ms: i64) -> Result<()> {
        let url = self.endpoint(&format!("api/companion/heartbeat/{}", device_id))?;

        let response = self
            .client
            .post(url)
            .json(&timestamp_ms)
            .send()
            .await
            .context("Failed to connect to control plane")?;

        Self::check_ack(response, "heartbeat").await
    }

    async fn register_device(&self, registration: &DeviceRegistration) -> Result<()> {
        let url = self.endpoint("api/companion/register")?;
        tracing::info!("Registering device '{}'", registration.device_name);

        let response = self
            .client
            .post(url)
            .json(registration)
            .send()
            .await
            .context("Failed to connect to control plane")?;

        Self::check_ack(response, "registration").await
    }
}

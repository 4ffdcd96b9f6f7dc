//! HTTP implementation of the ACS client

use std::collections::HashMap;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use tracing::{instrument, trace, warn};

use crate::config::MonitoringConfig;

use super::error::{AcsError, AcsResult};
use super::types::{AcsParameter, AcsTask, RemoteDevice, ONLINE_WINDOW_MINUTES};

/// Typed request/response wrapper around one ACS endpoint.
///
/// Holds a reused HTTP client with the configured timeout. Cloning is cheap;
/// the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct AcsClient {
    http: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl AcsClient {
    /// Build a client for the given config.
    ///
    /// Fails fast on an invalid endpoint; transient conditions are reported
    /// per call instead.
    pub fn new(config: &MonitoringConfig) -> AcsResult<Self> {
        config
            .validate()
            .map_err(|e| AcsError::InvalidConfig(e.to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AcsError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method, url);

        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        request
    }

    /// Send a request and map non-success statuses to [`AcsError::Status`].
    async fn send(&self, request: RequestBuilder) -> AcsResult<reqwest::Response> {
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AcsError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    /// List devices known to the ACS, optionally filtered by an ACS query
    /// expression.
    #[instrument(skip(self))]
    pub async fn list_devices(&self, filter: Option<&str>) -> AcsResult<Vec<RemoteDevice>> {
        let mut request = self.request(Method::GET, "/devices");
        if let Some(filter) = filter {
            request = request.query(&[("query", filter)]);
        }

        let response = self.send(request).await?;
        let devices = response.json::<Vec<RemoteDevice>>().await?;

        trace!("ACS reported {} devices", devices.len());
        Ok(devices)
    }

    /// Fetch a single device record.
    #[instrument(skip(self))]
    pub async fn get_device(&self, device_id: &str) -> AcsResult<RemoteDevice> {
        let request = self.request(Method::GET, &format!("/devices/{device_id}"));
        let response = self.send(request).await?;
        Ok(response.json::<RemoteDevice>().await?)
    }

    /// Read named parameters from a device.
    ///
    /// Parameters the device has no value for come back as entries with an
    /// absent value, or are missing from the response entirely; neither is an
    /// error.
    #[instrument(skip(self, paths), fields(count = paths.len()))]
    pub async fn get_parameters(
        &self,
        device_id: &str,
        paths: &[&str],
    ) -> AcsResult<Vec<AcsParameter>> {
        let mut request = self.request(Method::GET, &format!("/devices/{device_id}/parameters"));
        if !paths.is_empty() {
            request = request.query(&[("parameter", paths.join(","))]);
        }

        let response = self.send(request).await?;
        Ok(response.json::<Vec<AcsParameter>>().await?)
    }

    /// Write a single parameter on a device.
    pub async fn set_parameter(&self, device_id: &str, path: &str, value: Value) -> AcsResult<()> {
        self.set_parameters(device_id, HashMap::from([(path.to_string(), value)]))
            .await
    }

    /// Write a batch of parameters on a device.
    #[instrument(skip(self, parameters), fields(count = parameters.len()))]
    pub async fn set_parameters(
        &self,
        device_id: &str,
        parameters: HashMap<String, Value>,
    ) -> AcsResult<()> {
        let request = self
            .request(Method::PUT, &format!("/devices/{device_id}/parameters"))
            .json(&parameters);

        self.send(request).await?;
        Ok(())
    }

    /// Create a remote task (provisioning script) for a device.
    #[instrument(skip(self, script))]
    pub async fn create_task(
        &self,
        device_id: &str,
        script: &str,
        name: Option<&str>,
    ) -> AcsResult<AcsTask> {
        let body = serde_json::json!({
            "name": name.map(str::to_string).unwrap_or_else(|| format!("Task for {device_id}")),
            "device": device_id,
            "script": script,
        });

        let request = self.request(Method::POST, "/tasks").json(&body);
        let response = self.send(request).await?;
        Ok(response.json::<AcsTask>().await?)
    }

    /// Ask the ACS to issue a connection request to a device.
    #[instrument(skip(self))]
    pub async fn connection_request(&self, device_id: &str) -> AcsResult<()> {
        let request = self
            .request(Method::POST, &format!("/devices/{device_id}/tasks"))
            .json(&serde_json::json!({ "command": "connection_request" }));

        self.send(request).await?;
        Ok(())
    }

    /// Whether the ACS itself is reachable and healthy.
    pub async fn health_check(&self) -> bool {
        let request = self.request(Method::GET, "/health");

        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("ACS health check failed: {e}");
                false
            }
        }
    }

    /// Look up a device by serial number. `Ok(None)` when unknown.
    pub async fn find_device_by_serial(&self, serial: &str) -> AcsResult<Option<RemoteDevice>> {
        let filter = format!("_serialNumber:\"{serial}\"");
        let mut devices = self.list_devices(Some(&filter)).await?;

        if devices.is_empty() {
            Ok(None)
        } else {
            Ok(Some(devices.swap_remove(0)))
        }
    }

    /// Devices that informed within the online window.
    pub async fn list_online_devices(&self) -> AcsResult<Vec<RemoteDevice>> {
        let cutoff = (Utc::now() - ChronoDuration::minutes(ONLINE_WINDOW_MINUTES)).to_rfc3339();
        self.list_devices(Some(&format!("_lastInform:[{cutoff} TO *]")))
            .await
    }

    /// Devices that have not informed within the online window.
    pub async fn list_offline_devices(&self) -> AcsResult<Vec<RemoteDevice>> {
        let cutoff = (Utc::now() - ChronoDuration::minutes(ONLINE_WINDOW_MINUTES)).to_rfc3339();
        self.list_devices(Some(&format!("_lastInform:[* TO {cutoff}]")))
            .await
    }
}

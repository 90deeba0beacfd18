use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{GatewayError, GatewayResult, RemoteGateway};
use crate::alert::ReactionReport;
use crate::config::AppConfig;
use crate::geo::BoundingBox;
use crate::models::sensor_sample::SampleUpload;
use crate::models::warning::{RegionDescriptor, WarningRecord};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Serialize)]
struct UploadRequest<'a> {
    records: &'a [SampleUpload],
}

#[derive(Deserialize)]
struct UploadResponse {
    ids: Vec<i64>,
}

/// `RemoteGateway` over the hazard service's JSON HTTP API.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Self::new(
            config.api_base_url.clone(),
            config.api_token.clone(),
            config.http_timeout(),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> GatewayResult<T> {
        let response = self.with_auth(req).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| GatewayError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn is_online(&self) -> bool {
        let req = self.client.get(self.url("/health")).timeout(HEALTH_TIMEOUT);
        match req.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Connectivity check failed: {}", e);
                false
            }
        }
    }

    async fn upload_batch(&self, batch: &[SampleUpload]) -> GatewayResult<Vec<i64>> {
        let req = self
            .client
            .post(self.url("/api/sensor-data/batch"))
            .json(&UploadRequest { records: batch });
        let response: UploadResponse = self.send_json(req).await?;
        if response.ids.len() != batch.len() {
            return Err(GatewayError::Malformed(format!(
                "expected {} ids, got {}",
                batch.len(),
                response.ids.len()
            )));
        }
        Ok(response.ids)
    }

    async fn fetch_region_updates(
        &self,
        region: &str,
        since: DateTime<Utc>,
    ) -> GatewayResult<Vec<WarningRecord>> {
        let req = self
            .client
            .get(self.url(&format!("/api/warnings/region/{region}")))
            .query(&[("since", since.to_rfc3339_opts(SecondsFormat::Millis, true))]);
        self.send_json(req).await
    }

    async fn fetch_region_full(
        &self,
        region: &str,
        bounds: &BoundingBox,
    ) -> GatewayResult<Vec<WarningRecord>> {
        let req = self
            .client
            .get(self.url(&format!("/api/warnings/region/{region}/full")))
            .query(&[
                ("minLat", bounds.min_lat),
                ("minLon", bounds.min_lon),
                ("maxLat", bounds.max_lat),
                ("maxLon", bounds.max_lon),
            ]);
        self.send_json(req).await
    }

    async fn fetch_regions(&self) -> GatewayResult<Vec<RegionDescriptor>> {
        self.send_json(self.client.get(self.url("/api/regions"))).await
    }

    async fn report_reaction(&self, report: &ReactionReport) -> GatewayResult<()> {
        let req = self.client.post(self.url("/api/reactions")).json(report);
        let response = self.with_auth(req).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let gateway =
            HttpGateway::new("https://hazards.example.org/", None, Duration::from_secs(5)).unwrap();
        assert_eq!(
            gateway.url("/api/regions"),
            "https://hazards.example.org/api/regions"
        );
    }

    #[test]
    fn upload_body_is_camel_case() {
        let record = SampleUpload {
            latitude: 55.0,
            longitude: 37.0,
            timestamp: DateTime::from_timestamp_millis(0).unwrap(),
            speed: 10.0,
            accuracy: 3.0,
            accel_x: 0.0,
            accel_y: 0.0,
            accel_z: 9.8,
            road_quality: 0.1,
        };
        let body = serde_json::to_value(UploadRequest { records: &[record] }).unwrap();
        assert_eq!(body["records"][0]["roadQuality"], 0.1);
        assert_eq!(body["records"][0]["accelZ"], 9.8);
    }
}

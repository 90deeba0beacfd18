use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::alert::ReactionReport;
use crate::geo::BoundingBox;
use crate::models::sensor_sample::SampleUpload;
use crate::models::warning::{RegionDescriptor, WarningRecord};

pub mod http;

#[cfg(test)]
pub mod fake;

pub use http::HttpGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no network connectivity")]
    Offline,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("remote returned status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Network side of the engine. One call is one bounded request; callers retry by
/// waiting for their next tick.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn is_online(&self) -> bool;

    /// Uploads one batch and returns the server ids in batch order.
    async fn upload_batch(&self, batch: &[SampleUpload]) -> GatewayResult<Vec<i64>>;

    /// Warnings of `region` updated after `since`.
    async fn fetch_region_updates(
        &self,
        region: &str,
        since: DateTime<Utc>,
    ) -> GatewayResult<Vec<WarningRecord>>;

    /// Complete warning set for `region` inside `bounds`.
    async fn fetch_region_full(
        &self,
        region: &str,
        bounds: &BoundingBox,
    ) -> GatewayResult<Vec<WarningRecord>>;

    async fn fetch_regions(&self) -> GatewayResult<Vec<RegionDescriptor>>;

    async fn report_reaction(&self, report: &ReactionReport) -> GatewayResult<()>;
}

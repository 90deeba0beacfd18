use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use super::{GatewayError, GatewayResult, RemoteGateway};
use crate::alert::ReactionReport;
use crate::geo::BoundingBox;
use crate::models::sensor_sample::SampleUpload;
use crate::models::warning::{RegionDescriptor, WarningRecord};

/// Scriptable in-memory gateway.
#[derive(Debug, Default)]
pub struct FakeGateway {
    offline: AtomicBool,
    next_id: AtomicI64,
    /// 1-based upload call numbers that fail.
    failing_uploads: Mutex<HashSet<usize>>,
    pub uploads: Mutex<Vec<Vec<SampleUpload>>>,
    updates: Mutex<HashMap<String, GatewayResult<Vec<WarningRecord>>>>,
    pub update_calls: Mutex<Vec<(String, DateTime<Utc>)>>,
    full: Mutex<HashMap<String, GatewayResult<Vec<WarningRecord>>>>,
    regions: Mutex<Vec<RegionDescriptor>>,
    pub reactions: Mutex<Vec<ReactionReport>>,
}

fn replay(result: &GatewayResult<Vec<WarningRecord>>) -> GatewayResult<Vec<WarningRecord>> {
    match result {
        Ok(warnings) => Ok(warnings.clone()),
        Err(GatewayError::Status(code)) => Err(GatewayError::Status(*code)),
        Err(e) => Err(GatewayError::Malformed(e.to_string())),
    }
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1000),
            ..Self::default()
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fail_upload_call(&self, call: usize) {
        self.failing_uploads.lock().unwrap().insert(call);
    }

    pub fn set_updates(&self, region: &str, result: GatewayResult<Vec<WarningRecord>>) {
        self.updates.lock().unwrap().insert(region.to_string(), result);
    }

    pub fn set_full(&self, region: &str, result: GatewayResult<Vec<WarningRecord>>) {
        self.full.lock().unwrap().insert(region.to_string(), result);
    }

    pub fn set_regions(&self, regions: Vec<RegionDescriptor>) {
        *self.regions.lock().unwrap() = regions;
    }

    fn check_online(&self) -> GatewayResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(GatewayError::Offline)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteGateway for FakeGateway {
    async fn is_online(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }

    async fn upload_batch(&self, batch: &[SampleUpload]) -> GatewayResult<Vec<i64>> {
        self.check_online()?;
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(batch.to_vec());
        if self.failing_uploads.lock().unwrap().contains(&uploads.len()) {
            return Err(GatewayError::Status(503));
        }
        Ok(batch
            .iter()
            .map(|_| self.next_id.fetch_add(1, Ordering::SeqCst))
            .collect())
    }

    async fn fetch_region_updates(
        &self,
        region: &str,
        since: DateTime<Utc>,
    ) -> GatewayResult<Vec<WarningRecord>> {
        self.check_online()?;
        self.update_calls
            .lock()
            .unwrap()
            .push((region.to_string(), since));
        match self.updates.lock().unwrap().get(region) {
            Some(result) => replay(result),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_region_full(
        &self,
        region: &str,
        _bounds: &BoundingBox,
    ) -> GatewayResult<Vec<WarningRecord>> {
        self.check_online()?;
        match self.full.lock().unwrap().get(region) {
            Some(result) => replay(result),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_regions(&self) -> GatewayResult<Vec<RegionDescriptor>> {
        self.check_online()?;
        Ok(self.regions.lock().unwrap().clone())
    }

    async fn report_reaction(&self, report: &ReactionReport) -> GatewayResult<()> {
        self.check_online()?;
        self.reactions.lock().unwrap().push(report.clone());
        Ok(())
    }
}

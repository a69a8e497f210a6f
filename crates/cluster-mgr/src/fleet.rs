//! Enumeration of the caller's current pods.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::debug;

use crate::pod::{PodHandle, PodSnapshot};
use crate::providers::runpod::execute;
use crate::providers::runpod::models::{MyselfData, PodsField};
use crate::providers::runpod::operations::PODS;
use crate::providers::traits::{PodError, Transport};

/// Pods the provider reported at one instant, keyed by handle.
///
/// Rebuilt from scratch on every enumeration.
#[derive(Debug, Clone, Default)]
pub struct Fleet {
    pods: BTreeMap<PodHandle, PodSnapshot>,
    observed_at: Option<DateTime<Utc>>,
}

impl Fleet {
    fn from_snapshots(snapshots: Vec<PodSnapshot>, observed_at: DateTime<Utc>) -> Self {
        Self {
            pods: snapshots
                .into_iter()
                .map(|s| (s.handle.clone(), s))
                .collect(),
            observed_at: Some(observed_at),
        }
    }

    #[must_use]
    pub fn contains(&self, handle: &PodHandle) -> bool {
        self.pods.contains_key(handle)
    }

    #[must_use]
    pub fn get(&self, handle: &PodHandle) -> Option<&PodSnapshot> {
        self.pods.get(handle)
    }

    pub fn handles(&self) -> impl Iterator<Item = &PodHandle> {
        self.pods.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PodSnapshot> {
        self.pods.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }

    /// When the enumeration was read, if it came from the provider.
    #[must_use]
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        self.observed_at
    }
}

impl IntoIterator for Fleet {
    type Item = PodSnapshot;
    type IntoIter = std::collections::btree_map::IntoValues<PodHandle, PodSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.pods.into_values()
    }
}

/// Reads the fleet from the provider.
#[derive(Clone)]
pub struct FleetView {
    transport: Arc<dyn Transport>,
}

impl FleetView {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// List every pod the provider reports for the caller, with its runtime.
    ///
    /// # Errors
    /// [`PodError::ProviderRejected`] on a malformed response,
    /// [`PodError::TransportFailure`] when the call fails.
    pub async fn list_running(&self) -> Result<Vec<PodSnapshot>, PodError> {
        let data: MyselfData<PodsField> =
            execute(self.transport.as_ref(), &PODS, json!({})).await?;
        let observed_at = Utc::now();
        debug!(count = data.myself.pods.len(), "Listed pods");
        Ok(data
            .myself
            .pods
            .into_iter()
            .map(|record| record.into_snapshot(observed_at))
            .collect())
    }

    /// Same call as [`FleetView::list_running`], keyed by handle.
    ///
    /// # Errors
    /// Same as [`FleetView::list_running`].
    pub async fn fleet(&self) -> Result<Fleet, PodError> {
        let snapshots = self.list_running().await?;
        let observed_at = snapshots
            .first()
            .map_or_else(Utc::now, |s| s.observed_at);
        Ok(Fleet::from_snapshots(snapshots, observed_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::traits::MockTransport;
    use mockall::predicate::{always, eq};

    fn pods_body() -> serde_json::Value {
        json!({
            "data": { "myself": { "pods": [
                {
                    "id": "abc123",
                    "name": "vital-llm-reasoner-server",
                    "desiredStatus": "RUNNING",
                    "runtime": {
                        "uptimeInSeconds": 120,
                        "ports": [{
                            "ip": "100.65.0.2",
                            "isIpPublic": false,
                            "privatePort": 8888,
                            "publicPort": 60001,
                            "type": "http"
                        }],
                        "gpus": [{ "id": "GPU-1", "gpuUtilPercent": 12.5, "memoryUtilPercent": 40.0 }],
                        "container": { "cpuPercent": 3.0, "memoryPercent": 9.0 }
                    }
                },
                { "id": "def456", "name": "booting", "desiredStatus": "RUNNING", "runtime": null }
            ] } }
        })
    }

    #[tokio::test]
    async fn test_list_running_maps_runtime() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .with(eq("Pods"), always(), always())
            .times(1)
            .returning(|_, _, _| Ok(pods_body()));
        let view = FleetView::new(Arc::new(transport));

        let pods = view.list_running().await.unwrap();
        assert_eq!(pods.len(), 2);
        assert_eq!(pods[0].uptime_secs, Some(120));
        assert_eq!(pods[0].gpus[0].gpu_util_percent, Some(12.5));
        assert_eq!(pods[0].ports[0].protocol.as_deref(), Some("http"));
        assert!(!pods[1].is_running());
    }

    #[tokio::test]
    async fn test_fleet_keyed_by_handle() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_, _, _| Ok(pods_body()));
        let view = FleetView::new(Arc::new(transport));

        let fleet = view.fleet().await.unwrap();
        assert_eq!(fleet.len(), 2);
        assert!(fleet.contains(&PodHandle::new("abc123")));
        assert!(!fleet.contains(&PodHandle::new("gone")));
        assert!(fleet.observed_at().is_some());
        assert_eq!(
            fleet.get(&PodHandle::new("def456")).map(|s| s.name.as_str()),
            Some("booting")
        );
    }

    #[tokio::test]
    async fn test_missing_pods_key_rejected() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_, _, _| Ok(json!({ "data": { "myself": {} } })));
        let view = FleetView::new(Arc::new(transport));

        assert!(matches!(
            view.list_running().await,
            Err(PodError::ProviderRejected { .. })
        ));
    }
}

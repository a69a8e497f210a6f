//! Pod lifecycle controller.
//!
//! Drives pods through `Starting → Running → Stopping → Stopped →
//! Terminating → Terminated` on top of single GraphQL calls. State is
//! inferred from polling:
//!
//! - a defined runtime uptime is the only evidence of `Running`
//! - absence from the fleet is the only evidence of `Terminated`; a successful
//!   terminate call only yields `Terminating`
//!
//! Blocking waits poll at a fixed interval, absorb a bounded number of
//! consecutive transport failures, and check the controller's
//! [`CancellationToken`] before every poll and while sleeping.
//!
//! ## Example
//!
//! ```ignore
//! let controller = LifecycleController::new(transport);
//! let spec = PodSpec::builder("w0vokfjnj6", "NVIDIA A40").build()?;
//!
//! let handle = controller.create(&spec).await?;
//! let snapshot = controller
//!     .await_running(&handle, Duration::from_secs(600), Duration::from_secs(5))
//!     .await?;
//!
//! controller.stop(&handle).await?;
//! controller.terminate(&handle).await?;
//! let gone = controller
//!     .await_terminated(&handle, Duration::from_secs(60), Duration::from_secs(5), 10)
//!     .await?;
//! ```

mod state;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use state::{Observation, PodState};

use crate::fleet::FleetView;
use crate::pod::{Deployment, PodHandle, PodSnapshot, PodSpec};
use crate::providers::runpod::models::{
    DeployOnDemandData, DeployedPod, InterruptableInput, OnDemandInput, PodData, PodIdInput,
    PodStopData, PodTerminateData, RentInterruptableData,
};
use crate::providers::runpod::operations::{
    DEPLOY_ON_DEMAND, POD, RENT_INTERRUPTABLE, STOP_POD, TERMINATE_POD,
};
use crate::providers::runpod::{execute, input_variables};
use crate::providers::traits::{PodError, Transport};

/// Consecutive transport failures a wait absorbs before giving up.
pub const DEFAULT_MAX_TRANSIENT_FAILURES: u32 = 3;

/// Divergence between the tracked set and a fresh fleet read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    /// Pods we were terminating that are now gone.
    pub terminated: Vec<PodHandle>,
    /// Tracked pods that disappeared without us terminating them.
    pub vanished: Vec<PodHandle>,
    /// Pods we saw terminate that are listed again.
    pub reappeared: Vec<PodHandle>,
    /// Listed pods this controller never created.
    pub untracked: Vec<PodHandle>,
}

impl DriftReport {
    /// Whether anything happened outside the controller's own actions.
    #[must_use]
    pub fn has_drift(&self) -> bool {
        !(self.vanished.is_empty() && self.reappeared.is_empty())
    }
}

#[derive(Debug, Default)]
struct Registry {
    /// Pods created by this controller and not yet confirmed gone.
    tracked: HashMap<PodHandle, PodState>,
    /// Pods confirmed gone. Handles are never reused, so this only grows.
    retired: HashSet<PodHandle>,
}

/// Drives pods through their lifecycle.
pub struct LifecycleController {
    transport: Arc<dyn Transport>,
    fleet: FleetView,
    registry: RwLock<Registry>,
    cancel: CancellationToken,
    max_transient_failures: u32,
}

impl LifecycleController {
    /// Create a controller over `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            fleet: FleetView::new(Arc::clone(&transport)),
            transport,
            registry: RwLock::new(Registry::default()),
            cancel: CancellationToken::new(),
            max_transient_failures: DEFAULT_MAX_TRANSIENT_FAILURES,
        }
    }

    /// Use `token` to cancel blocking waits.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Set how many consecutive transport failures a wait absorbs.
    #[must_use]
    pub fn with_max_transient_failures(mut self, max: u32) -> Self {
        self.max_transient_failures = max;
        self
    }

    /// Token checked at every poll boundary.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Last known state of `handle`, or `None` if this controller never created it.
    #[must_use]
    pub fn state(&self, handle: &PodHandle) -> Option<PodState> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.tracked.get(handle).copied().or_else(|| {
            registry
                .retired
                .contains(handle)
                .then_some(PodState::Terminated)
        })
    }

    /// Every tracked pod with its state, ordered by handle.
    #[must_use]
    pub fn tracked(&self) -> Vec<(PodHandle, PodState)> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        let mut pods: Vec<_> = registry
            .tracked
            .iter()
            .map(|(h, s)| (h.clone(), *s))
            .collect();
        pods.sort_by(|a, b| a.0.cmp(&b.0));
        pods
    }

    #[must_use]
    pub fn is_tracked(&self, handle: &PodHandle) -> bool {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tracked
            .contains_key(handle)
    }

    /// Create a pod from `spec`.
    ///
    /// On success the returned handle is tracked in [`PodState::Starting`].
    /// On failure the tracked set is unchanged.
    ///
    /// # Errors
    /// [`PodError::ProviderRejected`] if the response lacks the pod id,
    /// [`PodError::TransportFailure`] if the call fails.
    pub async fn create(&self, spec: &PodSpec) -> Result<PodHandle, PodError> {
        info!(
            template_id = %spec.template_id(),
            gpu_type_id = %spec.gpu_type_id(),
            on_demand = spec.deployment().is_on_demand(),
            state = %PodState::Requested,
            "Creating pod"
        );

        let pod: DeployedPod = match spec.deployment() {
            Deployment::OnDemand => {
                let variables = input_variables(&DEPLOY_ON_DEMAND, OnDemandInput::from(spec))?;
                let data: DeployOnDemandData =
                    execute(self.transport.as_ref(), &DEPLOY_ON_DEMAND, variables).await?;
                data.pod
            }
            Deployment::Spot { .. } => {
                let variables =
                    input_variables(&RENT_INTERRUPTABLE, InterruptableInput::from(spec))?;
                let data: RentInterruptableData =
                    execute(self.transport.as_ref(), &RENT_INTERRUPTABLE, variables).await?;
                data.pod
            }
        };

        if pod.id.trim().is_empty() {
            return Err(PodError::ProviderRejected {
                operation: if spec.deployment().is_on_demand() {
                    DEPLOY_ON_DEMAND.name.to_string()
                } else {
                    RENT_INTERRUPTABLE.name.to_string()
                },
                detail: "pod id is empty".to_string(),
                payload: format!("{pod:?}"),
            });
        }

        let handle = PodHandle::new(pod.id);
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .tracked
            .insert(handle.clone(), PodState::Starting);

        info!(
            pod_id = %handle,
            image = pod.image_name.as_deref().unwrap_or("unknown"),
            machine_id = pod.machine_id.as_deref().unwrap_or("unknown"),
            pod_host_id = pod
                .machine
                .as_ref()
                .and_then(|m| m.pod_host_id.as_deref())
                .unwrap_or("unknown"),
            "Pod created"
        );
        Ok(handle)
    }

    /// Read `handle` once, without polling.
    ///
    /// # Errors
    /// [`PodError::NotFound`] if the provider has no record of the pod.
    pub async fn status(&self, handle: &PodHandle) -> Result<PodSnapshot, PodError> {
        let variables = input_variables(
            &POD,
            PodIdInput {
                pod_id: handle.to_string(),
            },
        )?;
        let data: PodData = execute(self.transport.as_ref(), &POD, variables).await?;

        let Some(record) = data.pod else {
            self.retire(handle);
            return Err(PodError::NotFound {
                handle: handle.clone(),
                operation: POD.name.to_string(),
            });
        };

        let snapshot = record.into_snapshot(Utc::now());
        self.observe(handle, &snapshot);
        Ok(snapshot)
    }

    /// Poll until `handle` reports a runtime uptime.
    ///
    /// Returns the first snapshot with a defined uptime.
    ///
    /// # Errors
    /// [`PodError::Timeout`] when `timeout` elapses first,
    /// [`PodError::NotFound`] if the pod disappears,
    /// [`PodError::Failed`] if the provider reports it dead,
    /// [`PodError::Cancelled`] if the token fires, or the last
    /// [`PodError::TransportFailure`] once too many calls failed in a row.
    pub async fn await_running(
        &self,
        handle: &PodHandle,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<PodSnapshot, PodError> {
        const OPERATION: &str = "await_running";

        info!(pod_id = %handle, timeout_secs = timeout.as_secs(), "Waiting for pod to run");

        let start = Instant::now();
        let mut failures = 0u32;
        let mut attempt = 0u32;

        loop {
            self.check_cancelled(handle, OPERATION)?;
            attempt += 1;

            match self.status(handle).await {
                Ok(snapshot) => {
                    failures = 0;
                    if Observation::from_snapshot(&snapshot).state == PodState::Failed {
                        return Err(PodError::Failed {
                            handle: handle.clone(),
                            reason: format!(
                                "provider reports desired status {}",
                                snapshot
                                    .desired_status
                                    .map_or_else(|| "unknown".to_string(), |s| s.to_string())
                            ),
                        });
                    }
                    if snapshot.is_running() {
                        info!(
                            pod_id = %handle,
                            uptime_secs = snapshot.uptime_secs.unwrap_or_default(),
                            attempt,
                            "Pod is running"
                        );
                        return Ok(snapshot);
                    }
                    debug!(
                        pod_id = %handle,
                        attempt,
                        elapsed_secs = start.elapsed().as_secs(),
                        "Pod still starting"
                    );
                }
                Err(e) if e.is_transient() => {
                    failures += 1;
                    if failures > self.max_transient_failures {
                        return Err(e);
                    }
                    warn!(pod_id = %handle, attempt, failures, error = %e, "Poll failed, retrying");
                }
                Err(e) => return Err(e),
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(PodError::Timeout {
                    handle: handle.clone(),
                    operation: OPERATION.to_string(),
                    waited_secs: elapsed.as_secs(),
                });
            }
            self.pause(handle, OPERATION, poll_interval.min(timeout - elapsed))
                .await?;
        }
    }

    /// Request a stop. Idempotent.
    ///
    /// A pod already known to be stopped or past it is left alone. Otherwise
    /// the handle is marked [`PodState::Stopping`] and the next observation
    /// reconciles it.
    ///
    /// # Errors
    /// [`PodError::ProviderRejected`] or [`PodError::TransportFailure`] from the call.
    pub async fn stop(&self, handle: &PodHandle) -> Result<(), PodError> {
        if let Some(state) = self.state(handle) {
            if state.is_stopped_or_later() {
                debug!(pod_id = %handle, state = %state, "Pod already stopped, nothing to do");
                return Ok(());
            }
        }

        info!(pod_id = %handle, "Stopping pod");
        let variables = input_variables(
            &STOP_POD,
            PodIdInput {
                pod_id: handle.to_string(),
            },
        )?;
        let data: PodStopData = execute(self.transport.as_ref(), &STOP_POD, variables).await?;

        self.transition(handle, PodState::Stopping);
        info!(
            pod_id = %handle,
            desired_status = %data
                .pod_stop
                .desired_status
                .map_or_else(|| "unknown".to_string(), |s| s.to_string()),
            "Pod stop requested"
        );
        Ok(())
    }

    /// Request termination. Idempotent.
    ///
    /// Marks the handle [`PodState::Terminating`]; only
    /// [`LifecycleController::await_terminated`] or a fleet read confirms
    /// the pod is gone.
    ///
    /// # Errors
    /// [`PodError::ProviderRejected`] if the response lacks the
    /// `podTerminate` key or carries a non-null payload,
    /// [`PodError::TransportFailure`] if the call fails.
    pub async fn terminate(&self, handle: &PodHandle) -> Result<(), PodError> {
        if self.state(handle) == Some(PodState::Terminated) {
            debug!(pod_id = %handle, "Pod already terminated, nothing to do");
            return Ok(());
        }

        info!(pod_id = %handle, "Terminating pod");
        let variables = input_variables(
            &TERMINATE_POD,
            PodIdInput {
                pod_id: handle.to_string(),
            },
        )?;
        let data: PodTerminateData =
            execute(self.transport.as_ref(), &TERMINATE_POD, variables).await?;

        if let Some(payload) = data.pod_terminate {
            return Err(PodError::rejected(
                TERMINATE_POD.name,
                "expected null podTerminate payload",
                &payload,
            ));
        }

        self.transition(handle, PodState::Terminating);
        info!(pod_id = %handle, "Pod termination requested");
        Ok(())
    }

    /// Poll the fleet until `handle` is absent.
    ///
    /// Returns `true` (and stops tracking the pod) on the first poll where it
    /// is absent, `false` if it is still listed after `max_attempts` polls or
    /// once `timeout` elapses.
    ///
    /// # Errors
    /// [`PodError::Cancelled`] if the token fires, the last
    /// [`PodError::TransportFailure`] once too many calls failed in a row, or
    /// [`PodError::ProviderRejected`] from the fleet read.
    pub async fn await_terminated(
        &self,
        handle: &PodHandle,
        timeout: Duration,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> Result<bool, PodError> {
        const OPERATION: &str = "await_terminated";

        info!(pod_id = %handle, max_attempts, "Waiting for pod to leave the fleet");

        let start = Instant::now();
        let mut failures = 0u32;

        for attempt in 1..=max_attempts {
            self.check_cancelled(handle, OPERATION)?;

            match self.fleet.fleet().await {
                Ok(fleet) => {
                    failures = 0;
                    if !fleet.contains(handle) {
                        self.retire(handle);
                        info!(pod_id = %handle, attempt, "Pod terminated");
                        return Ok(true);
                    }
                    debug!(pod_id = %handle, attempt, "Pod still present");
                }
                Err(e) if e.is_transient() => {
                    failures += 1;
                    if failures > self.max_transient_failures {
                        return Err(e);
                    }
                    warn!(pod_id = %handle, attempt, failures, error = %e, "Fleet poll failed, retrying");
                }
                Err(e) => return Err(e),
            }

            if attempt == max_attempts {
                break;
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                break;
            }
            self.pause(handle, OPERATION, poll_interval.min(timeout - elapsed))
                .await?;
        }

        warn!(
            pod_id = %handle,
            elapsed_secs = start.elapsed().as_secs(),
            "Pod may not have terminated properly"
        );
        Ok(false)
    }

    /// Terminate `handle` and wait for it to leave the fleet.
    ///
    /// Returns the [`LifecycleController::await_terminated`] verdict.
    ///
    /// # Errors
    /// Any error from [`LifecycleController::terminate`] or
    /// [`LifecycleController::await_terminated`].
    pub async fn teardown(
        &self,
        handle: &PodHandle,
        timeout: Duration,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> Result<bool, PodError> {
        self.terminate(handle).await?;
        self.await_terminated(handle, timeout, poll_interval, max_attempts)
            .await
    }

    /// Compare the tracked set against one fresh fleet read.
    ///
    /// Tracked pods missing from the fleet are marked terminated and dropped
    /// from tracking. Listed pods this controller did not create are reported
    /// but never adopted.
    ///
    /// # Errors
    /// Any error from the fleet read.
    pub async fn reconcile(&self) -> Result<DriftReport, PodError> {
        let fleet = self.fleet.fleet().await?;
        let mut report = DriftReport::default();

        for (handle, state) in self.tracked() {
            match fleet.get(&handle) {
                Some(snapshot) => self.observe(&handle, snapshot),
                None => {
                    self.retire(&handle);
                    if state == PodState::Terminating {
                        report.terminated.push(handle);
                    } else {
                        warn!(pod_id = %handle, state = %state, "Tracked pod vanished from fleet");
                        report.vanished.push(handle);
                    }
                }
            }
        }

        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        for handle in fleet.handles() {
            if registry.retired.contains(handle) {
                warn!(pod_id = %handle, "Terminated pod reappeared in fleet");
                report.reappeared.push(handle.clone());
            } else if !registry.tracked.contains_key(handle) {
                report.untracked.push(handle.clone());
            }
        }
        drop(registry);

        debug!(
            fleet_size = fleet.len(),
            terminated = report.terminated.len(),
            vanished = report.vanished.len(),
            reappeared = report.reappeared.len(),
            untracked = report.untracked.len(),
            "Reconciled tracked pods against fleet"
        );
        Ok(report)
    }

    /// Fold a fresh snapshot into a tracked pod's state.
    fn observe(&self, handle: &PodHandle, snapshot: &PodSnapshot) {
        let observation = Observation::from_snapshot(snapshot);
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = registry.tracked.get_mut(handle) {
            let next = state.reconcile(observation);
            if next != *state {
                info!(pod_id = %handle, from = %state, to = %next, "Pod state changed");
                *state = next;
            }
        }
    }

    /// Apply a transition caused by a request this controller issued.
    fn transition(&self, handle: &PodHandle, next: PodState) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = registry.tracked.get_mut(handle) {
            let advanced = state.advance(next);
            if advanced != *state {
                info!(pod_id = %handle, from = %state, to = %advanced, "Pod state changed");
                *state = advanced;
            }
        }
    }

    /// Record that a tracked `handle` no longer exists. Untracked handles
    /// are left unknown.
    fn retire(&self, handle: &PodHandle) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = registry.tracked.remove(handle) {
            info!(pod_id = %handle, from = %state, to = %PodState::Terminated, "Pod state changed");
            registry.retired.insert(handle.clone());
        }
    }

    fn check_cancelled(&self, handle: &PodHandle, operation: &str) -> Result<(), PodError> {
        if self.cancel.is_cancelled() {
            return Err(PodError::Cancelled {
                handle: handle.clone(),
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Sleep between polls, waking early if cancelled.
    async fn pause(
        &self,
        handle: &PodHandle,
        operation: &str,
        duration: Duration,
    ) -> Result<(), PodError> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(PodError::Cancelled {
                handle: handle.clone(),
                operation: operation.to_string(),
            }),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

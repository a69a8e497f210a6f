//! Pod lifecycle states and the transition rules between them.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::pod::{DesiredStatus, PodSnapshot};

/// Lifecycle state the controller tracks per pod.
///
/// Inferred from polling; the provider never pushes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PodState {
    /// Creation call issued, no handle yet.
    Requested,
    /// Handle assigned, runtime not up.
    Starting,
    /// Runtime reports an uptime.
    Running,
    /// Stop requested.
    Stopping,
    /// Provider reports the pod exited.
    Stopped,
    /// Terminate requested.
    Terminating,
    /// Pod is gone from the fleet.
    Terminated,
    /// Provider reported the pod dead.
    Failed,
}

impl PodState {
    /// Position along the lifecycle chain. `Failed` sits outside it.
    const fn rank(self) -> u8 {
        match self {
            Self::Requested => 0,
            Self::Starting => 1,
            Self::Running => 2,
            Self::Stopping => 3,
            Self::Stopped => 4,
            Self::Terminating => 5,
            Self::Terminated => 6,
            Self::Failed => u8::MAX,
        }
    }

    /// No transition leaves a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated | Self::Failed)
    }

    /// Whether a stop request for a pod in this state has nothing left to do.
    ///
    /// `Failed` is not included: a dead pod may still hold its GPU.
    #[must_use]
    pub const fn is_stopped_or_later(self) -> bool {
        matches!(self, Self::Stopped | Self::Terminating | Self::Terminated)
    }

    /// Apply a transition the controller caused itself (a request it issued).
    ///
    /// Only forward moves along the chain are taken; anything else keeps
    /// the current state.
    #[must_use]
    pub fn advance(self, next: Self) -> Self {
        if self.is_terminal() {
            return self;
        }
        if next == Self::Failed || next.rank() >= self.rank() {
            next
        } else {
            self
        }
    }

    /// Fold a fresh observation into the current state.
    ///
    /// Forward moves and `Failed` are always taken. A backward move is taken
    /// only when the observation is `confirmed` (the provider explicitly
    /// reports the pod running), and is logged.
    #[must_use]
    pub fn reconcile(self, observation: Observation) -> Self {
        if self.is_terminal() {
            return self;
        }
        let Observation { state, confirmed } = observation;
        if state == Self::Failed || state.rank() >= self.rank() {
            return state;
        }
        if confirmed {
            warn!(from = %self, to = %state, "Pod state regressed on fresh observation");
            state
        } else {
            self
        }
    }
}

impl std::fmt::Display for PodState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested => write!(f, "requested"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
            Self::Terminating => write!(f, "terminating"),
            Self::Terminated => write!(f, "terminated"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// State inferred from one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub state: PodState,
    /// The provider explicitly reported this state, rather than it being
    /// inferred from missing fields.
    pub confirmed: bool,
}

impl Observation {
    /// Infer a state from a snapshot.
    ///
    /// A defined uptime means `Running`. A snapshot never yields
    /// `Terminated`: only absence from the fleet proves that.
    #[must_use]
    pub fn from_snapshot(snapshot: &PodSnapshot) -> Self {
        let desired = snapshot.desired_status;
        let state = match desired {
            Some(DesiredStatus::Dead) => PodState::Failed,
            Some(DesiredStatus::Terminated) => PodState::Terminating,
            _ if snapshot.is_running() => PodState::Running,
            Some(DesiredStatus::Exited | DesiredStatus::Paused) => PodState::Stopped,
            _ => PodState::Starting,
        };
        let confirmed = state == PodState::Running && desired == Some(DesiredStatus::Running);
        Self { state, confirmed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pod::PodHandle;
    use chrono::Utc;

    fn snapshot(desired: Option<DesiredStatus>, uptime: Option<u64>) -> PodSnapshot {
        PodSnapshot {
            handle: PodHandle::new("pod-1"),
            name: "pod".to_string(),
            desired_status: desired,
            uptime_secs: uptime,
            ports: Vec::new(),
            gpus: Vec::new(),
            container: None,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_advance_is_monotonic() {
        assert_eq!(PodState::Starting.advance(PodState::Running), PodState::Running);
        assert_eq!(PodState::Stopping.advance(PodState::Running), PodState::Stopping);
        assert_eq!(PodState::Running.advance(PodState::Failed), PodState::Failed);
        assert_eq!(
            PodState::Terminated.advance(PodState::Starting),
            PodState::Terminated
        );
        assert_eq!(PodState::Failed.advance(PodState::Terminating), PodState::Failed);
    }

    #[test]
    fn test_reconcile_regression_needs_confirmation() {
        let lagging = Observation {
            state: PodState::Running,
            confirmed: false,
        };
        assert_eq!(PodState::Stopping.reconcile(lagging), PodState::Stopping);

        let confirmed = Observation {
            state: PodState::Running,
            confirmed: true,
        };
        assert_eq!(PodState::Stopping.reconcile(confirmed), PodState::Running);
        assert_eq!(
            PodState::Terminated.reconcile(confirmed),
            PodState::Terminated
        );
    }

    #[test]
    fn test_observation_from_snapshot() {
        let starting = Observation::from_snapshot(&snapshot(Some(DesiredStatus::Running), None));
        assert_eq!(starting.state, PodState::Starting);
        assert!(!starting.confirmed);

        let running =
            Observation::from_snapshot(&snapshot(Some(DesiredStatus::Running), Some(30)));
        assert_eq!(running.state, PodState::Running);
        assert!(running.confirmed);

        let unconfirmed = Observation::from_snapshot(&snapshot(None, Some(30)));
        assert_eq!(unconfirmed.state, PodState::Running);
        assert!(!unconfirmed.confirmed);

        let stopped = Observation::from_snapshot(&snapshot(Some(DesiredStatus::Exited), None));
        assert_eq!(stopped.state, PodState::Stopped);

        let dead = Observation::from_snapshot(&snapshot(Some(DesiredStatus::Dead), Some(5)));
        assert_eq!(dead.state, PodState::Failed);

        let terminating =
            Observation::from_snapshot(&snapshot(Some(DesiredStatus::Terminated), None));
        assert_eq!(terminating.state, PodState::Terminating);
    }

    #[test]
    fn test_stopped_or_later_excludes_failed() {
        assert!(PodState::Stopped.is_stopped_or_later());
        assert!(PodState::Terminated.is_stopped_or_later());
        assert!(!PodState::Stopping.is_stopped_or_later());
        assert!(!PodState::Failed.is_stopped_or_later());
    }

    #[test]
    fn test_pod_state_display() {
        assert_eq!(PodState::Running.to_string(), "running");
        assert_eq!(PodState::Terminating.to_string(), "terminating");
    }
}

//! GPU pod lifecycle management for Vital LLM clusters.
//!
//! Provisions, observes and tears down RunPod GPU pods through the RunPod
//! GraphQL API. Every provider interaction is one named GraphQL operation
//! carried by a [`providers::Transport`]; everything above it works on typed
//! values.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    cluster-mgr CLI                       │
//! └───────────┬──────────────────┬──────────────────┬────────┘
//!             ▼                  ▼                  ▼
//!      ┌─────────────┐   ┌──────────────┐   ┌─────────────────────┐
//!      │   Catalog   │   │  FleetView   │◄──│ LifecycleController │
//!      │ GPU types,  │   │ current pods │   │ create / wait /     │
//!      │ templates   │   │              │   │ stop / terminate    │
//!      └──────┬──────┘   └──────┬───────┘   └──────────┬──────────┘
//!             └─────────────────┼──────────────────────┘
//!                               ▼
//!                 ┌───────────────────────────┐
//!                 │ Transport (RunPod GraphQL)│
//!                 └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cluster_mgr::{ClusterMgrConfig, LifecycleController, PodSpec};
//!
//! let config = ClusterMgrConfig::load(cluster_mgr::config::DEFAULT_CONFIG_PATH);
//! let controller = LifecycleController::new(Arc::new(config.transport()?));
//!
//! let spec = PodSpec::builder("w0vokfjnj6", "NVIDIA A40").build()?;
//! let handle = controller.create(&spec).await?;
//! controller
//!     .await_running(&handle, config.running_timeout(), config.poll_interval())
//!     .await?;
//! controller.terminate(&handle).await?;
//! ```

pub mod catalog;
pub mod config;
pub mod fleet;
pub mod lifecycle;
pub mod pod;
pub mod providers;

pub use catalog::{Catalog, GpuType, Template};
pub use config::ClusterMgrConfig;
pub use fleet::{Fleet, FleetView};
pub use lifecycle::{DriftReport, LifecycleController, PodState};
pub use pod::{CloudType, DesiredStatus, PodHandle, PodSnapshot, PodSpec};
pub use providers::runpod;
pub use providers::traits::{PodError, Transport, TransportError};

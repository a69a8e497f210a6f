//! RunPod GPU cloud provider.
//!
//! Every call is a single GraphQL POST carried by a [`Transport`]. [`RunPod`]
//! is the HTTP implementation; responses are decoded into the per-operation
//! structs in [`models`].
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cluster_mgr::providers::runpod::RunPod;
//! use cluster_mgr::catalog::Catalog;
//!
//! let transport = Arc::new(RunPod::new(api_key)?);
//! let catalog = Catalog::new(transport);
//!
//! for gpu in catalog.list_gpu_types().await? {
//!     println!("{} ({} GB)", gpu.display_name, gpu.memory_gb);
//! }
//! ```
//!
//! [`Transport`]: crate::providers::traits::Transport

mod client;
pub mod models;
pub mod operations;

pub use client::{RunPod, API_BASE_URL, DEFAULT_TIMEOUT_SECS};
pub(crate) use client::{execute, input_variables};

//! GPU cloud provider plumbing.
//!
//! This module contains the [`Transport`] trait, the error taxonomy, and the
//! RunPod implementation.

pub mod runpod;
pub mod traits;

pub use traits::{PodError, Transport, TransportError};

//! Docker — per-host runtime client and model normalization.
//!
//! One [`client::RuntimeClient`] per host; the collector's poll workers
//! each own their own instance and never share it across hosts.

pub mod client;
pub mod map;

pub use client::{ControlAction, DockerError, RuntimeClient, DEFAULT_STOP_GRACE_SECS};
pub use map::{ContainerBrief, ContainerStatus};

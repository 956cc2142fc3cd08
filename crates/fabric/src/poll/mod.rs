//! Poll — per-host collection workers and their supervisor.
//!
//! One worker per enabled host, each owning its own runtime client. The
//! supervisor subscribes to registry change events and keeps the worker set
//! in step; a separate trim task enforces the retention window.

pub mod supervisor;
pub mod worker;

pub use supervisor::{run_trim, PollSupervisor};
pub use worker::HostWorker;

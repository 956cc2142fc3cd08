//! Containers domain — listing and real-time status.

pub mod route;

//! Containers domain — cross-host listing and status.

pub mod route;

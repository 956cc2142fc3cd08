//! Runtime — boot sequence, HTTP serving, shutdown handling.

pub mod boot;
pub mod serve;
pub mod stop;

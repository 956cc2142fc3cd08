//! Metrics domain — cross-host sample queries and introspection.

pub mod route;

//! Hosts domain — registry CRUD over HTTP.

pub mod route;

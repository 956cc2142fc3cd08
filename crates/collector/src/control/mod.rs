//! Control domain — gated lifecycle verbs against a chosen host.

pub mod route;

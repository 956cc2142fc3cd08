//! Stats — sample model and pure derivation from runtime stats documents.

pub mod derive;
pub mod model;

pub use derive::{counter_rates, derive, paused_sample, SampleMeta};
pub use model::{
    ContainerRecord, ContainerState, HealthState, Pressure, PsiSet, Sample,
};

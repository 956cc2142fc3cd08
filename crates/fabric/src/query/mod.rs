//! Query — typed panel queries over the store, shaped into frames.

pub mod engine;
pub mod model;

pub use engine::{QueryEngine, QueryError};
pub use model::{
    ContainersFrame, FabricQuery, Frame, FrameLabels, HostSelection, QueryType, SelectionMode,
    TimeRange,
};

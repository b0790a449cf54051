//! Shared data model, capability traits, and binary codecs for the
//! transit-accessibility worker core.
//!
//! This crate has no network or filesystem dependencies of its own; it is
//! consumed by `worker-engine` (the dispatch/compute core) and `assembler`
//! (the broker-side grid writer).

pub mod capability;
pub mod decay;
pub mod error;
pub mod grid_codec;
pub mod result;
pub mod status;
pub mod task;

pub use capability::{
    GeotiffEncoder, GridObjectStore, NetworkPreloader, PointSetCache, PreloadState, RoutingEngine,
};
pub use decay::DecayFunction;
pub use error::{CoreError, LoaderProgress, LoaderStatus, TaskErrorDescriptor};
pub use grid_codec::GridHeader;
pub use result::{AccessibilityValues, OneOriginResult, RegionalWorkResult, TravelTimeGrid};
pub use status::WorkerStatus;
pub use task::{GridDescriptor, OutputFormat, RegionalTask, SinglePointTask, Task, TaskHeader};

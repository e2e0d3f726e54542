//! Static tutorial definitions: catalog, sequence graph, and route helpers.

pub mod catalog;
pub mod model;
pub mod paths;
pub mod sequence;

pub use catalog::{Catalog, RouteGuard};
pub use model::{AccessMode, ProfileTab, Step, StepHints, Track, Tutorial, TutorialId, WorkspaceType};
pub use sequence::{SequenceEntry, SequenceGraph, TrackSequence};

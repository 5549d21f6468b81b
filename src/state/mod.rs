//! State module for tracking a harvest run
//!
//! # Components
//!
//! - `Resource` / `Frontier`: URLs discovered by each stage
//! - `DownloadTicket`: an image claimed for download with its destination
//! - `ProgressCounters`: per-stage progress exposed to observers

mod progress;
mod resource;

// Re-export main types
pub use progress::{ProgressCounters, ProgressSnapshot, Stage, StageProgress};
pub use resource::{DownloadTicket, Frontier, Resource, ResourceKind};

//! Pure domain logic for swim-technique analysis.
//!
//! Nothing in this crate performs I/O. Pose frames come in, metrics, issues,
//! ratings and report text come out, which keeps every engine testable with
//! synthetic pose sequences.

pub mod analysis;
pub mod error;
pub mod geometry;
pub mod metrics;
pub mod pose;
pub mod report;
pub mod rules;
pub mod types;
pub mod upload;

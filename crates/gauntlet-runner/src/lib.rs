//! # gauntlet-runner
//!
//! Execution layer of the Gauntlet harness: per-unit retry decisions,
//! failure screenshot capture, and the suite coordinator that drives
//! partitioned workers over a shared unit queue.
//!
//! The split mirrors the session layer's seams: [`retry`] is pure state
//! with no I/O, [`observer`] only ever reads from a live page and writes
//! to an [`observer::ArtifactSink`], and [`suite`] owns the scheduling and
//! session lifecycle glue between them.

pub mod observer;
pub mod retry;
pub mod suite;

pub use observer::{ArtifactSink, Attachment, CapturePolicy, FailureObserver, FsArtifactSink, MemorySink};
pub use retry::{RetryController, Verdict};
pub use suite::{SuiteRunner, TestUnit};

//! Persisted pipeline state.
//!
//! One JSON record per build directory, read at the start of every run and
//! rewritten whole once the render phase completes.

mod pipeline;

pub use pipeline::PipelineCache;

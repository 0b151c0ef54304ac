//! Decoder registry and execution-tree orchestration
//!
//! The orchestrator only ever sees the [`Decoder`] capability trait, never a
//! concrete protocol type. It resolves channel mappings, constructs and
//! validates decoder instances, runs them directly or through the streaming
//! engine, and merges per-branch annotation sets, handing one decoder's
//! named secondary outputs to its children as input channel data
//! ("stacking").

pub mod executor;
pub mod registry;

pub use executor::{
    AnnotationSet, ChunkedDecoderRunner, ExecutionNode, ExecutionReport, Orchestrator,
    StreamingReport,
};
pub use registry::{Decoder, DecoderRegistry};

//! Protocol decoding engine for captured logic-analyzer traces
//!
//! This library turns multi-channel binary sample buffers into timestamped
//! protocol annotations. The protocol-specific bit semantics live in small
//! decoder types; the heavy lifting is generic:
//!
//! - **Matcher**: a condition-matching interpreter exposing `wait`/`put`
//!   primitives over prepared channel buffers
//! - **Mapping**: validation, auto-assignment and persistence of
//!   decoder-channel to physical-channel bindings
//! - **Streaming**: chunked execution with a bounded worker pool, progress
//!   reporting and cooperative cancellation for captures larger than memory
//! - **Orchestrator**: a decoder registry plus an execution-tree runner that
//!   chains decoders via named secondary outputs ("stacking")
//!
//! # Example
//!
//! ```no_run
//! use tracedec::{ChannelData, DecoderRegistry, Orchestrator};
//! use tracedec::decoders::I2cDecoder;
//!
//! let registry = DecoderRegistry::new();
//! registry.register("i2c", || Box::new(I2cDecoder::new()));
//! let orchestrator = Orchestrator::new(registry);
//! let channels = vec![ChannelData::new(0, "SCL", vec![1, 1, 0, 0])];
//! let report = orchestrator.execute_decoder("i2c", 1_000_000, &channels, &[]);
//! # let _ = report;
//! ```

use thiserror::Error;

pub mod capture;
pub mod decoders;
pub mod descriptor;
pub mod engine;
pub mod mapping;
pub mod orchestrator;
pub mod streaming;

pub use capture::ChannelData;
pub use descriptor::{
    AnnotationCatalog, AnnotationRow, ChannelSpec, DecoderDescriptor, OptionBinding, OptionKind,
    OptionSpec, OptionValue,
};
pub use engine::{
    ConditionSet, ConditionType, DecodeSpan, Matcher, OutputKind, SpanOutput, SpanShape, WaitMatch,
};
pub use mapping::{
    ChannelMappingRecord, ImportOutcome, MappingStore, MappingValidation, auto_assign,
    detect_conflicts, from_list_form, to_list_form, validate,
};
pub use orchestrator::{
    Decoder, DecoderRegistry, ExecutionNode, ExecutionReport, Orchestrator, StreamingReport,
};
pub use streaming::{
    ChunkProcessor, ProgressSnapshot, SampleChunk, StreamingConfig, StreamingEngine,
    StreamingOutcome, StreamingStats,
};

/// Errors raised for caller contract violations and data exhaustion.
///
/// Run-level failures (a decoder blowing up mid-run, option validation
/// failing for one branch) are never surfaced through this enum; they are
/// folded into `success: false` report structs so that one decoder's failure
/// cannot abort a caller iterating over many.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// A `wait` exhausted every configured channel buffer without a match.
    /// Decoders routinely catch this to mean "no more frames".
    #[error("no more samples: cursor reached the end of all channel buffers")]
    EndOfSamples,

    /// `wait` was called with no channel buffers prepared
    #[error("no channel data prepared: call prepare() before wait()")]
    NoChannelData,

    /// A decoder id was requested that no factory is registered for
    #[error("unknown decoder: '{0}'")]
    UnknownDecoder(String),

    /// The streaming entry point was called while a previous run on the
    /// same engine instance had not finished
    #[error("already processing: streaming run still in flight")]
    AlreadyProcessing,
}

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, DecodeError>;

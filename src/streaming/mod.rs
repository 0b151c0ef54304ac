//! Chunked/streaming execution for large captures
//!
//! Partitions a capture into fixed-size chunks with a small overlap region,
//! runs a caller-supplied per-chunk hook on a bounded worker pool, and
//! reports progress and partial results as chunks complete. Cancellation is
//! cooperative: `stop()` is observed between chunk dispatches and in-flight
//! chunks run to completion.

pub mod chunk;
pub mod engine;
pub mod progress;

pub use chunk::{
    ChunkPlan, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CONCURRENT_CHUNKS, MAX_OVERLAP_SAMPLES,
    SampleChunk, plan_chunks,
};
pub use engine::{ChunkProcessor, StreamingConfig, StreamingEngine};
pub use progress::{ProgressSnapshot, StreamingOutcome, StreamingStats};

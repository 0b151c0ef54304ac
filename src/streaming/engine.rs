//! Bounded worker-pool execution of chunked decodes
//!
//! The engine owns no decoding logic: callers supply `initialize` /
//! `process_chunk` / `finalize` hooks and the engine does the partitioning,
//! dispatch, progress accounting and cancellation. One engine instance holds
//! at most one live run; a second call while the first is in flight is a
//! caller contract violation and is rejected, not queued.
//!
//! Threading: crossbeam channels for job hand-off, an `AtomicBool` stop
//! signal observed between dispatches, and a completion channel the
//! collector blocks on instead of busy-waiting. Completion order is whatever
//! the pool produces; final results are concatenated by chunk index so a
//! re-run over the same input yields the same merged list.

use crate::capture::ChannelData;
use crate::engine::DecodeSpan;
use crate::streaming::chunk::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CONCURRENT_CHUNKS, SampleChunk, materialize, plan_chunks,
};
use crate::streaming::progress::{ProgressSnapshot, StreamingOutcome, StreamingStats};
use crate::{DecodeError, Result};
use crossbeam_channel::{bounded, unbounded};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-chunk hooks supplied by the caller
///
/// `process_chunk` sees one chunk at a time and nothing about its
/// neighbors beyond the duplicated overlap samples; results produced purely
/// from the overlap region are the caller's to de-duplicate
/// (`SampleChunk::in_overlap` helps). It takes `&self` because up to
/// `max_concurrent_chunks` invocations run at once.
pub trait ChunkProcessor: Send + Sync {
    fn initialize(&mut self) -> std::result::Result<(), String> {
        Ok(())
    }

    fn process_chunk(&self, chunk: &SampleChunk) -> std::result::Result<Vec<DecodeSpan>, String>;

    fn finalize(&mut self) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Tuning knobs for a streaming run
#[derive(Clone, Debug)]
pub struct StreamingConfig {
    pub chunk_size: usize,
    pub max_concurrent_chunks: usize,
    /// Optional delay between chunk dispatches, to avoid starving other work
    pub processing_interval: Option<Duration>,
    pub report_progress: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrent_chunks: DEFAULT_MAX_CONCURRENT_CHUNKS,
            processing_interval: None,
            report_progress: true,
        }
    }
}

/// Streaming execution engine
pub struct StreamingEngine {
    config: StreamingConfig,
    busy: AtomicBool,
    stop_requested: AtomicBool,
}

/// Clears the busy flag when a run leaves scope, whatever the exit path
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl StreamingEngine {
    pub fn new(config: StreamingConfig) -> Self {
        Self {
            config,
            busy: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// True while a run is in flight
    pub fn is_processing(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Request cooperative cancellation of the current run
    ///
    /// Observed between chunk dispatches; the in-flight chunks finish and
    /// their results are kept.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Run the chunked decode to completion
    ///
    /// Fails fast with [`DecodeError::AlreadyProcessing`] on re-entry; every
    /// other failure mode (hook errors, `stop()`) resolves into a
    /// `success: false` outcome carrying partial results and statistics.
    pub fn run(
        &self,
        processor: &mut dyn ChunkProcessor,
        channels: &[ChannelData],
        on_progress: Option<&dyn Fn(ProgressSnapshot)>,
        on_partial: Option<&dyn Fn(usize, &[DecodeSpan])>,
    ) -> Result<StreamingOutcome> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DecodeError::AlreadyProcessing);
        }
        let _busy = BusyGuard(&self.busy);
        self.stop_requested.store(false, Ordering::SeqCst);

        let started = Instant::now();
        let total_samples = channels.iter().map(ChannelData::len).max().unwrap_or(0);
        let plans = plan_chunks(total_samples, self.config.chunk_size);
        let total_chunks = plans.len();
        debug!(
            "streaming run: {} sample(s) over {} chunk(s) of {}, {} worker(s)",
            total_samples, total_chunks, self.config.chunk_size, self.config.max_concurrent_chunks
        );

        if let Err(e) = processor.initialize() {
            warn!("initialize hook failed: {}", e);
            return Ok(failed_outcome(e, Vec::new(), StreamingStats::default()));
        }

        let abort = AtomicBool::new(false);
        let in_flight_bytes = AtomicUsize::new(0);
        let peak_bytes = AtomicUsize::new(0);

        let mut per_chunk: Vec<Option<Vec<DecodeSpan>>> = vec![None; total_chunks];
        let mut first_error: Option<String> = None;
        let mut chunks_done = 0usize;
        let mut processed_samples = 0usize;

        let num_workers = self.config.max_concurrent_chunks.min(total_chunks).max(1);
        let (job_tx, job_rx) = bounded::<SampleChunk>(self.config.max_concurrent_chunks);
        type Completion = (usize, usize, usize, std::result::Result<Vec<DecodeSpan>, String>);
        let (done_tx, done_rx) = unbounded::<Completion>();

        let shared: &dyn ChunkProcessor = processor;
        let plans_ref = &plans;
        let abort_ref = &abort;
        let in_flight_ref = &in_flight_bytes;
        let peak_ref = &peak_bytes;
        let config = &self.config;
        let stop_flag = &self.stop_requested;

        thread::scope(|s| {
            for _ in 0..num_workers {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                s.spawn(move || {
                    while let Ok(chunk) = job_rx.recv() {
                        let core_len = chunk.len() - chunk.overlap;
                        let bytes = chunk.byte_size();
                        let result = shared.process_chunk(&chunk);
                        if done_tx.send((chunk.index, core_len, bytes, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(done_tx);
            drop(job_rx);

            s.spawn(move || {
                for plan in plans_ref {
                    // Cooperative cancellation point: no new chunk starts
                    // after a stop or abort, in-flight ones finish
                    if stop_flag.load(Ordering::SeqCst) || abort_ref.load(Ordering::SeqCst) {
                        debug!("dispatch halted before chunk {}", plan.index);
                        break;
                    }
                    if plan.index > 0 {
                        if let Some(interval) = config.processing_interval {
                            thread::sleep(interval);
                        }
                    }
                    let chunk = materialize(*plan, channels);
                    let bytes = chunk.byte_size();
                    let now = in_flight_ref.fetch_add(bytes, Ordering::SeqCst) + bytes;
                    peak_ref.fetch_max(now, Ordering::SeqCst);
                    if job_tx.send(chunk).is_err() {
                        break;
                    }
                }
                drop(job_tx);
            });

            // Collector: runs on the calling thread so the callbacks need
            // not be thread-safe
            while let Ok((index, core_len, bytes, result)) = done_rx.recv() {
                in_flight_bytes.fetch_sub(bytes, Ordering::SeqCst);
                match result {
                    Ok(spans) => {
                        chunks_done += 1;
                        processed_samples += core_len;
                        if let Some(callback) = on_partial {
                            callback(index, &spans);
                        }
                        per_chunk[index] = Some(spans);
                        if self.config.report_progress {
                            if let Some(callback) = on_progress {
                                callback(ProgressSnapshot::compute(
                                    processed_samples,
                                    total_samples,
                                    chunks_done,
                                    total_chunks,
                                    started.elapsed(),
                                ));
                            }
                        }
                    }
                    Err(message) => {
                        warn!("chunk {} failed: {}", index, message);
                        if first_error.is_none() {
                            first_error = Some(message);
                        }
                        abort.store(true, Ordering::SeqCst);
                    }
                }
            }
        });

        // Concatenate by chunk index, never by completion order
        let results: Vec<DecodeSpan> = per_chunk.into_iter().flatten().flatten().collect();
        let elapsed = started.elapsed();
        let stats = StreamingStats {
            total_samples,
            chunks_processed: chunks_done,
            processing_time_ms: elapsed.as_millis() as u64,
            average_speed: if elapsed.as_secs_f64() > 0.0 {
                processed_samples as f64 / elapsed.as_secs_f64()
            } else {
                0.0
            },
            total_results: results.len(),
            peak_memory_usage: peak_bytes.load(Ordering::SeqCst),
        };

        if self.stop_requested.load(Ordering::SeqCst) {
            info!("streaming run stopped by user after {} chunk(s)", chunks_done);
            return Ok(failed_outcome(
                "user stopped processing".to_string(),
                results,
                stats,
            ));
        }
        if let Some(error) = first_error {
            return Ok(failed_outcome(error, results, stats));
        }
        if let Err(e) = processor.finalize() {
            warn!("finalize hook failed: {}", e);
            return Ok(failed_outcome(e, results, stats));
        }

        debug!(
            "streaming run complete: {} span(s) in {}ms",
            stats.total_results, stats.processing_time_ms
        );
        Ok(StreamingOutcome {
            success: true,
            error: None,
            results,
            stats,
        })
    }
}

impl Default for StreamingEngine {
    fn default() -> Self {
        Self::new(StreamingConfig::default())
    }
}

fn failed_outcome(error: String, results: Vec<DecodeSpan>, stats: StreamingStats) -> StreamingOutcome {
    StreamingOutcome {
        success: false,
        error: Some(error),
        results,
        stats,
    }
}

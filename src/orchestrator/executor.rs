//! Decoder execution: single runs, streaming runs, and pipeline trees
//!
//! Failure policy throughout: one decoder failing must never abort a caller
//! iterating over many. Run-level problems (validation, decode errors) are
//! folded into `success: false` reports or empty per-branch annotation sets;
//! only caller contract violations (unknown id, re-entrant streaming call)
//! surface as `Err`.

use crate::capture::ChannelData;
use crate::descriptor::OptionBinding;
use crate::engine::{DecodeSpan, Matcher};
use crate::orchestrator::registry::{Decoder, DecoderRegistry};
use crate::streaming::{
    ChunkProcessor, ProgressSnapshot, SampleChunk, StreamingConfig, StreamingEngine,
    StreamingOutcome, StreamingStats,
};
use crate::{DecodeError, Result};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of one direct (non-streaming) decoder run
#[derive(Clone, Debug)]
pub struct ExecutionReport {
    pub decoder_name: String,
    pub results: Vec<DecodeSpan>,
    pub execution_time_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

/// Result of a streaming run, marking which code path actually ran
#[derive(Debug)]
pub struct StreamingReport {
    pub decoder_name: String,
    /// False when no streaming factory existed and the plain decoder ran
    pub is_streaming: bool,
    pub outcome: StreamingOutcome,
}

/// One node of a decoder pipeline tree
///
/// Children consume the node's named secondary outputs positionally as
/// their own channel data; a node without secondary outputs passes the
/// original capture through.
#[derive(Clone, Debug)]
pub struct ExecutionNode {
    pub name: String,
    pub decoder_id: String,
    pub options: Vec<OptionBinding>,
    /// Decoder channel id -> physical channel number, in list form
    pub channel_selection: Vec<(String, usize)>,
    pub children: Vec<ExecutionNode>,
}

impl ExecutionNode {
    pub fn new(name: &str, decoder_id: &str, channel_selection: &[(&str, usize)]) -> Self {
        Self {
            name: name.to_string(),
            decoder_id: decoder_id.to_string(),
            options: Vec::new(),
            channel_selection: channel_selection
                .iter()
                .map(|(id, n)| (id.to_string(), *n))
                .collect(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: ExecutionNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_options(mut self, options: Vec<OptionBinding>) -> Self {
        self.options = options;
        self
    }
}

/// Ordered spans produced by one branch of the tree
#[derive(Clone, Debug, Default)]
pub struct AnnotationSet {
    pub name: String,
    pub spans: Vec<DecodeSpan>,
}

/// Runs registered decoders over captures
pub struct Orchestrator {
    registry: DecoderRegistry,
    /// Engines with runs possibly in flight, so `dispose` can stop them
    active_engines: Mutex<Vec<Arc<StreamingEngine>>>,
}

impl Orchestrator {
    pub fn new(registry: DecoderRegistry) -> Self {
        Self {
            registry,
            active_engines: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &DecoderRegistry {
        &self.registry
    }

    /// Create, validate and run one decoder synchronously
    ///
    /// Channels are bound positionally: the capture's first channel feeds
    /// the decoder's first slot, and so on. Fails only for an unknown id;
    /// everything else lands in the report.
    pub fn execute_decoder(
        &self,
        id: &str,
        sample_rate: u64,
        channels: &[ChannelData],
        options: &[OptionBinding],
    ) -> Result<ExecutionReport> {
        let mut decoder = self.registry.create(id)?;
        let started = Instant::now();
        let descriptor = Arc::new(decoder.descriptor().clone());
        let decoder_name = descriptor.name.clone();

        let mapping = positional_mapping(&descriptor, channels);
        let mut matcher = Matcher::new(descriptor);
        matcher.set_sample_rate(sample_rate);

        if !matcher.validate_options(options, &mapping, channels) {
            return Ok(ExecutionReport {
                decoder_name,
                results: Vec::new(),
                execution_time_ms: elapsed_ms(started),
                success: false,
                error: Some("option validation failed".to_string()),
            });
        }

        matcher.prepare(channels, &mapping);
        let (success, error) = match run_decode(decoder.as_mut(), &mut matcher) {
            Ok(()) => (true, None),
            Err(message) => {
                warn!("decoder '{}' failed: {}", id, message);
                (false, Some(message))
            }
        };

        Ok(ExecutionReport {
            decoder_name,
            // Spans emitted before a failure are still useful to callers
            results: matcher.take_results(),
            execution_time_ms: elapsed_ms(started),
            success,
            error,
        })
    }

    /// Run a decoder through the streaming engine
    ///
    /// Prefers a registered streaming factory for the id; with none present
    /// but a plain decoder registered, runs that instead and reports
    /// `is_streaming: false` so callers can tell which path was taken.
    pub fn execute_streaming_decoder(
        &self,
        id: &str,
        sample_rate: u64,
        channels: &[ChannelData],
        options: &[OptionBinding],
        config: StreamingConfig,
        on_progress: Option<&dyn Fn(ProgressSnapshot)>,
        on_partial: Option<&dyn Fn(usize, &[DecodeSpan])>,
    ) -> Result<StreamingReport> {
        if let Some(mut processor) = self.registry.create_streaming(id) {
            let engine = Arc::new(StreamingEngine::new(config));
            self.active_engines
                .lock()
                .expect("engine list lock poisoned")
                .push(Arc::clone(&engine));

            let outcome = engine.run(processor.as_mut(), channels, on_progress, on_partial);

            self.active_engines
                .lock()
                .expect("engine list lock poisoned")
                .retain(|e| !Arc::ptr_eq(e, &engine));

            return Ok(StreamingReport {
                decoder_name: self
                    .registry
                    .descriptor(id)
                    .map(|d| d.name)
                    .unwrap_or_else(|| id.to_string()),
                is_streaming: true,
                outcome: outcome?,
            });
        }

        if !self.registry.contains(id) {
            return Err(DecodeError::UnknownDecoder(id.to_string()));
        }

        debug!("no streaming factory for '{}', falling back to direct decode", id);
        let report = self.execute_decoder(id, sample_rate, channels, options)?;
        let total_samples = channels.iter().map(ChannelData::len).max().unwrap_or(0);
        Ok(StreamingReport {
            decoder_name: report.decoder_name.clone(),
            is_streaming: false,
            outcome: StreamingOutcome {
                success: report.success,
                error: report.error,
                stats: StreamingStats {
                    total_samples,
                    chunks_processed: usize::from(total_samples > 0),
                    processing_time_ms: report.execution_time_ms,
                    average_speed: 0.0,
                    total_results: report.results.len(),
                    peak_memory_usage: 0,
                },
                results: report.results,
            },
        })
    }

    /// Execute a pipeline tree depth-first, one branch at a time
    ///
    /// Returns `None` when there is nothing to do (empty tree or empty
    /// capture). Otherwise every node contributes an entry (an empty
    /// annotation set when its validation or decode failed) and siblings
    /// always keep running. Sequential on purpose: secondary-output
    /// hand-off from parent to child stays deterministic.
    pub fn execute(
        &self,
        sample_rate: u64,
        channels: &[ChannelData],
        tree: &[ExecutionNode],
    ) -> Option<BTreeMap<String, AnnotationSet>> {
        if tree.is_empty() || channels.is_empty() {
            debug!("nothing to execute: empty tree or capture");
            return None;
        }

        let mut branches = BTreeMap::new();
        for node in tree {
            self.run_node(node, sample_rate, channels, &mut branches);
        }
        info!("pipeline executed: {} branch(es)", branches.len());
        Some(branches)
    }

    fn run_node(
        &self,
        node: &ExecutionNode,
        sample_rate: u64,
        channels: &[ChannelData],
        branches: &mut BTreeMap<String, AnnotationSet>,
    ) {
        let empty = |branches: &mut BTreeMap<String, AnnotationSet>| {
            branches.insert(
                node.name.clone(),
                AnnotationSet {
                    name: node.name.clone(),
                    spans: Vec::new(),
                },
            );
        };

        let mut decoder = match self.registry.create(&node.decoder_id) {
            Ok(d) => d,
            Err(e) => {
                warn!("branch '{}' skipped: {}", node.name, e);
                empty(branches);
                return;
            }
        };

        let descriptor = Arc::new(decoder.descriptor().clone());
        let mapping = selection_to_slots(&descriptor, &node.channel_selection);
        let mut matcher = Matcher::new(Arc::clone(&descriptor));
        matcher.set_sample_rate(sample_rate);

        if !matcher.validate_options(&node.options, &mapping, channels) {
            warn!("branch '{}' failed option validation", node.name);
            empty(branches);
            return;
        }

        matcher.prepare(channels, &mapping);
        if let Err(message) = run_decode(decoder.as_mut(), &mut matcher) {
            warn!("branch '{}' decode failed: {}", node.name, message);
            empty(branches);
            return;
        }

        branches.insert(
            node.name.clone(),
            AnnotationSet {
                name: node.name.clone(),
                spans: matcher.take_results(),
            },
        );

        // Stacking: children consume the node's secondary outputs
        // positionally as their channel data; without any, they see the
        // original capture
        let secondary = matcher.take_secondary_outputs();
        if secondary.is_empty() {
            for child in &node.children {
                self.run_node(child, sample_rate, channels, branches);
            }
        } else {
            let derived: Vec<ChannelData> = secondary
                .into_iter()
                .enumerate()
                .map(|(i, (name, samples))| ChannelData::new(i, name, samples))
                .collect();
            debug!(
                "branch '{}' produced {} secondary channel(s) for {} child(ren)",
                node.name,
                derived.len(),
                node.children.len()
            );
            for child in &node.children {
                self.run_node(child, sample_rate, &derived, branches);
            }
        }
    }

    /// Stop in-flight streaming runs and drop cached engine handles.
    /// Safe to call when nothing is running.
    pub fn dispose(&self) {
        let mut engines = self.active_engines.lock().expect("engine list lock poisoned");
        for engine in engines.drain(..) {
            engine.stop();
        }
        debug!("orchestrator disposed");
    }
}

/// Adapts a plain decoder factory into a per-chunk streaming hook
///
/// Each chunk gets a fresh decoder and matcher over the chunk's channel
/// slices; emitted spans are rebased to global sample indices. Spans whose
/// start falls inside the chunk's overlap region are dropped as duplicates
/// of the previous chunk's work.
pub struct ChunkedDecoderRunner<F>
where
    F: Fn() -> Box<dyn Decoder> + Send + Sync,
{
    factory: F,
}

impl<F> ChunkedDecoderRunner<F>
where
    F: Fn() -> Box<dyn Decoder> + Send + Sync,
{
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

impl<F> ChunkProcessor for ChunkedDecoderRunner<F>
where
    F: Fn() -> Box<dyn Decoder> + Send + Sync,
{
    fn process_chunk(&self, chunk: &SampleChunk) -> std::result::Result<Vec<DecodeSpan>, String> {
        let mut decoder = (self.factory)();
        let descriptor = Arc::new(decoder.descriptor().clone());
        let mapping = positional_mapping(&descriptor, &chunk.channels);
        let mut matcher = Matcher::new(descriptor);
        matcher.prepare(&chunk.channels, &mapping);
        decoder.decode(&mut matcher).map_err(|e| e.to_string())?;

        let mut spans = matcher.take_results();
        for span in &mut spans {
            span.start_sample += chunk.start_sample;
            span.end_sample += chunk.start_sample;
        }
        spans.retain(|s| !chunk.in_overlap(s.start_sample));
        Ok(spans)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Run a decode call, converting both `Err` returns and panics inside
/// decoder code into a plain error message. Third-party decoders can fail
/// arbitrarily (an out-of-bounds index, an assertion) and a panicking
/// decoder must not unwind through a caller iterating over many.
fn run_decode(decoder: &mut dyn Decoder, matcher: &mut Matcher) -> std::result::Result<(), String> {
    match panic::catch_unwind(AssertUnwindSafe(|| decoder.decode(matcher))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("decoder panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("decoder panicked: {}", s)
    } else {
        "decoder panicked".to_string()
    }
}

/// Bind decoder slots to capture channels positionally
fn positional_mapping(
    descriptor: &crate::descriptor::DecoderDescriptor,
    channels: &[ChannelData],
) -> Vec<(usize, usize)> {
    descriptor
        .channels
        .iter()
        .zip(channels)
        .map(|(spec, ch)| (spec.index, ch.number))
        .collect()
}

/// Resolve an id-based channel selection into slot/physical pairs
fn selection_to_slots(
    descriptor: &crate::descriptor::DecoderDescriptor,
    selection: &[(String, usize)],
) -> Vec<(usize, usize)> {
    selection
        .iter()
        .filter_map(|(id, physical)| {
            match descriptor.channels.iter().find(|c| &c.id == id) {
                Some(spec) => Some((spec.index, *physical)),
                None => {
                    warn!("selection names unknown channel id '{}'", id);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ChannelSpec, DecoderDescriptor};
    use crate::engine::{ConditionSet, ConditionType, SpanOutput};

    /// Emits one span per rising edge on its single channel, and the edge
    /// pin states as a secondary output
    struct EdgeMarker {
        descriptor: DecoderDescriptor,
        emit_secondary: bool,
    }

    impl EdgeMarker {
        fn new(emit_secondary: bool) -> Self {
            Self {
                descriptor: DecoderDescriptor {
                    id: "edges".into(),
                    name: "Edge marker".into(),
                    channels: vec![ChannelSpec::required("d", "Data", "", 0)],
                    ..Default::default()
                },
                emit_secondary,
            }
        }
    }

    impl Decoder for EdgeMarker {
        fn descriptor(&self) -> &DecoderDescriptor {
            &self.descriptor
        }

        fn decode(&mut self, matcher: &mut Matcher) -> Result<()> {
            let rising = ConditionSet::single(0, ConditionType::Rising);
            let mut edge_bits = Vec::new();
            loop {
                match matcher.wait(&[rising.clone()]) {
                    Ok(m) => {
                        matcher.put(
                            m.sample_number,
                            m.sample_number,
                            SpanOutput::annotation(0, &["rise"]),
                        );
                        edge_bits.push(1);
                        edge_bits.push(0);
                    }
                    Err(DecodeError::EndOfSamples) => break,
                    Err(e) => return Err(e),
                }
            }
            if self.emit_secondary {
                matcher.emit_channel("edge-bits", edge_bits);
            }
            Ok(())
        }
    }

    /// Counts 1-samples on channel 0, one span each
    struct OnesCounter {
        descriptor: DecoderDescriptor,
    }

    impl OnesCounter {
        fn new() -> Self {
            Self {
                descriptor: DecoderDescriptor {
                    id: "ones".into(),
                    name: "Ones counter".into(),
                    channels: vec![ChannelSpec::required("in", "Input", "", 0)],
                    ..Default::default()
                },
            }
        }
    }

    impl Decoder for OnesCounter {
        fn descriptor(&self) -> &DecoderDescriptor {
            &self.descriptor
        }

        fn decode(&mut self, matcher: &mut Matcher) -> Result<()> {
            let high = ConditionSet::single(0, ConditionType::High);
            loop {
                match matcher.wait(&[high.clone()]) {
                    Ok(m) => {
                        matcher.put(m.sample_number, m.sample_number, SpanOutput::default())
                    }
                    Err(DecodeError::EndOfSamples) => break,
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        }
    }

    /// Always fails, for failure-isolation tests
    struct Exploder {
        descriptor: DecoderDescriptor,
    }

    impl Decoder for Exploder {
        fn descriptor(&self) -> &DecoderDescriptor {
            &self.descriptor
        }

        fn decode(&mut self, _matcher: &mut Matcher) -> Result<()> {
            Err(DecodeError::NoChannelData)
        }
    }

    /// Panics mid-decode, as a buggy third-party decoder would
    struct OutOfBounds {
        descriptor: DecoderDescriptor,
    }

    impl Decoder for OutOfBounds {
        fn descriptor(&self) -> &DecoderDescriptor {
            &self.descriptor
        }

        fn decode(&mut self, _matcher: &mut Matcher) -> Result<()> {
            let empty: Vec<u8> = Vec::new();
            let _ = empty[3];
            Ok(())
        }
    }

    fn orchestrator() -> Orchestrator {
        let registry = DecoderRegistry::new();
        registry.register("edges", || Box::new(EdgeMarker::new(false)));
        registry.register("edges-stacked", || Box::new(EdgeMarker::new(true)));
        registry.register("ones", || Box::new(OnesCounter::new()));
        registry.register("boom", || {
            Box::new(Exploder {
                descriptor: DecoderDescriptor {
                    id: "boom".into(),
                    name: "Boom".into(),
                    ..Default::default()
                },
            })
        });
        registry.register("oob", || {
            Box::new(OutOfBounds {
                descriptor: DecoderDescriptor {
                    id: "oob".into(),
                    name: "Out of bounds".into(),
                    ..Default::default()
                },
            })
        });
        Orchestrator::new(registry)
    }

    fn capture() -> Vec<ChannelData> {
        // Rising edges at samples 1, 4 and 7
        vec![ChannelData::new(0, "D", vec![0, 1, 0, 0, 1, 1, 0, 1])]
    }

    #[test]
    fn test_execute_decoder_success() {
        let report = orchestrator()
            .execute_decoder("edges", 1_000_000, &capture(), &[])
            .expect("registered id");
        assert!(report.success, "error: {:?}", report.error);
        assert_eq!(report.decoder_name, "Edge marker");
        let positions: Vec<usize> = report.results.iter().map(|s| s.start_sample).collect();
        assert_eq!(positions, vec![1, 4, 7]);
    }

    #[test]
    fn test_execute_decoder_unknown_id() {
        let err = orchestrator()
            .execute_decoder("nope", 1_000_000, &capture(), &[])
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnknownDecoder(_)));
    }

    #[test]
    fn test_execute_decoder_failure_is_contained() {
        let report = orchestrator()
            .execute_decoder("boom", 1_000_000, &capture(), &[])
            .expect("failure must not propagate");
        assert!(!report.success);
        assert!(report.error.is_some());
    }

    #[test]
    fn test_panicking_decoder_is_contained() {
        let report = orchestrator()
            .execute_decoder("oob", 1_000_000, &capture(), &[])
            .expect("panic must not unwind to the caller");
        assert!(!report.success);
        assert!(
            report.error.as_deref().unwrap_or("").contains("panicked"),
            "error: {:?}",
            report.error
        );
    }

    #[test]
    fn test_panicking_branch_does_not_abort_siblings() {
        let orch = orchestrator();
        let tree = vec![
            ExecutionNode::new("crashy", "oob", &[]),
            ExecutionNode::new("good", "edges", &[("d", 0)]),
        ];
        let branches = orch.execute(1_000_000, &capture(), &tree).expect("has branches");
        assert!(branches["crashy"].spans.is_empty());
        assert_eq!(branches["good"].spans.len(), 3);
    }

    #[test]
    fn test_validation_failure_reported_not_thrown() {
        // EdgeMarker requires one channel; give it none
        let report = orchestrator()
            .execute_decoder("edges", 1_000_000, &[], &[])
            .unwrap();
        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some("option validation failed"));
    }

    #[test]
    fn test_streaming_fallback_to_plain_decoder() {
        let report = orchestrator()
            .execute_streaming_decoder(
                "edges",
                1_000_000,
                &capture(),
                &[],
                StreamingConfig::default(),
                None,
                None,
            )
            .unwrap();
        assert!(!report.is_streaming, "no streaming factory registered");
        assert!(report.outcome.success);
        assert_eq!(report.outcome.results.len(), 3);
    }

    #[test]
    fn test_streaming_path_preferred() {
        let orch = orchestrator();
        orch.registry()
            .register_streaming("edges", || {
                Box::new(ChunkedDecoderRunner::new(|| {
                    Box::new(EdgeMarker::new(false)) as Box<dyn Decoder>
                }))
            });
        let data = vec![ChannelData::new(
            0,
            "D",
            (0..5_000).map(|i| u8::from(i % 10 == 1)).collect(),
        )];
        let report = orch
            .execute_streaming_decoder(
                "edges",
                1_000_000,
                &data,
                &[],
                StreamingConfig {
                    chunk_size: 1_000,
                    ..Default::default()
                },
                None,
                None,
            )
            .unwrap();
        assert!(report.is_streaming);
        assert!(report.outcome.success);
        assert_eq!(report.outcome.stats.chunks_processed, 5);
        assert_eq!(
            report.outcome.results.len(),
            500,
            "one rising edge per 10 samples"
        );
    }

    #[test]
    fn test_execute_tree_sentinels() {
        let orch = orchestrator();
        assert!(orch.execute(1_000_000, &capture(), &[]).is_none());
        assert!(
            orch.execute(1_000_000, &[], &[ExecutionNode::new("a", "edges", &[("d", 0)])])
                .is_none()
        );
    }

    #[test]
    fn test_execute_tree_failed_branch_does_not_abort_siblings() {
        let orch = orchestrator();
        let tree = vec![
            ExecutionNode::new("broken", "boom", &[]),
            ExecutionNode::new("good", "edges", &[("d", 0)]),
        ];
        let branches = orch.execute(1_000_000, &capture(), &tree).expect("has branches");
        assert_eq!(branches.len(), 2);
        assert!(branches["broken"].spans.is_empty(), "failed branch contributes empty set");
        assert_eq!(branches["good"].spans.len(), 3);
    }

    #[test]
    fn test_execute_tree_stacking() {
        let orch = orchestrator();
        // Parent emits [1,0] per rising edge as secondary output; the
        // child counts the 1s, which equals the parent's edge count
        let tree = vec![
            ExecutionNode::new("parent", "edges-stacked", &[("d", 0)])
                .with_child(ExecutionNode::new("child", "ones", &[("in", 0)])),
        ];
        let branches = orch.execute(1_000_000, &capture(), &tree).unwrap();
        assert_eq!(branches["parent"].spans.len(), 3);
        assert_eq!(
            branches["child"].spans.len(),
            3,
            "child must decode the parent's secondary output, not the capture"
        );
    }

    #[test]
    fn test_dispose_is_safe_when_idle() {
        let orch = orchestrator();
        orch.dispose();
        orch.dispose();
    }
}

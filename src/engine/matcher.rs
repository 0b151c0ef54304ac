//! The condition-matching interpreter
//!
//! One `Matcher` instance processes one decode run at a time: `prepare`
//! copies capture channels into slot-indexed buffers, then the decoder calls
//! `wait` to advance the cursor under declarative per-channel conditions and
//! `put` to emit annotation spans. There is no internal concurrency; the
//! streaming engine parallelizes by running distinct instances over distinct
//! chunks.

use crate::capture::ChannelData;
use crate::descriptor::{DecoderDescriptor, OptionBinding};
use crate::engine::conditions::{ConditionSet, WaitMatch};
use crate::engine::span::{DecodeSpan, OutputKind, SpanOutput, SpanShape};
use crate::{DecodeError, Result};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Per-run engine lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Prepared,
    Running,
    Done,
}

/// Condition-matching engine for one decoder instance
pub struct Matcher {
    descriptor: Arc<DecoderDescriptor>,
    /// Slot-indexed channel buffers built by `prepare`
    buffers: Vec<ChannelData>,
    cursor: usize,
    /// Per-slot value at the previous cursor position; seeded from sample 0
    /// at prepare time so edge conditions need two real samples. Fixed-size
    /// arrays keyed by slot, not maps, since the slot count is known at
    /// prepare time.
    last: Vec<u8>,
    current: Vec<u8>,
    state: RunState,
    /// Capture sample rate in Hz, for decoders that derive timings
    sample_rate: u64,
    results: Vec<DecodeSpan>,
    /// Registered output kinds; a kind's handle is its position
    outputs: Vec<OutputKind>,
    /// Named secondary channel outputs for decoder stacking
    secondary: Vec<(String, Vec<u8>)>,
}

impl Matcher {
    /// Create an idle engine for a decoder's descriptor
    pub fn new(descriptor: Arc<DecoderDescriptor>) -> Self {
        Self {
            descriptor,
            buffers: Vec::new(),
            cursor: 0,
            last: Vec::new(),
            current: Vec::new(),
            state: RunState::Idle,
            sample_rate: 0,
            results: Vec::new(),
            outputs: vec![OutputKind::Annotation, OutputKind::Channel],
            secondary: Vec::new(),
        }
    }

    /// The descriptor this engine validates against
    pub fn descriptor(&self) -> &DecoderDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Current cursor position
    pub fn sample_number(&self) -> usize {
        self.cursor
    }

    pub fn set_sample_rate(&mut self, hz: u64) {
        self.sample_rate = hz;
    }

    /// Capture sample rate in Hz; 0 when unknown
    pub fn sample_rate(&self) -> u64 {
        self.sample_rate
    }

    /// Build slot-indexed channel buffers from the capture
    ///
    /// `mapping` binds decoder-channel slots to physical channel indices.
    /// Unmapped slots up to the highest referenced one are zero-filled to
    /// the longest mapped buffer's length, as is a mapped slot whose
    /// physical channel carries no data. Never fails; resets the cursor.
    pub fn prepare(&mut self, channels: &[ChannelData], mapping: &[(usize, usize)]) {
        let highest_slot = mapping.iter().map(|&(slot, _)| slot).max();

        let fill_len = mapping
            .iter()
            .filter_map(|&(_, phys)| channels.iter().find(|c| c.number == phys))
            .map(|c| c.len())
            .max()
            .unwrap_or(0);

        self.buffers.clear();
        if let Some(highest) = highest_slot {
            self.buffers = (0..=highest)
                .map(|slot| {
                    let phys = mapping
                        .iter()
                        .find(|&&(s, _)| s == slot)
                        .map(|&(_, phys)| phys);
                    match phys.and_then(|p| channels.iter().find(|c| c.number == p)) {
                        Some(ch) if !ch.is_empty() => {
                            let mut copy = ch.clone();
                            // All slots share one length so the cursor
                            // exhausts them together
                            copy.samples.resize(fill_len, 0);
                            copy
                        }
                        _ => ChannelData::zero_filled(phys.unwrap_or(0), fill_len),
                    }
                })
                .collect();
        }

        let slots = self.buffers.len();
        self.cursor = 0;
        // Seed the previous-value state from sample 0: an edge needs two
        // samples, so an idle-high bus does not read as a rising edge at
        // the very first sample
        self.last = self.buffers.iter().map(|b| b.sample_at(0)).collect();
        self.current = vec![0; slots];
        self.state = RunState::Prepared;
        for kind in [OutputKind::Annotation, OutputKind::Channel] {
            if !self.outputs.contains(&kind) {
                self.outputs.push(kind);
            }
        }

        debug!(
            "prepared {} channel slot(s), {} sample(s) each",
            slots, fill_len
        );
    }

    /// True while the cursor is strictly inside every configured buffer
    pub fn has_more(&self) -> bool {
        !self.buffers.is_empty() && self.buffers.iter().all(|b| self.cursor < b.len())
    }

    /// Sample of every slot at the cursor; 0 when out of range
    pub fn current_pins(&self) -> Vec<u8> {
        self.buffers
            .iter()
            .map(|b| b.sample_at(self.cursor))
            .collect()
    }

    /// Advance the cursor until one of the supplied condition sets matches
    ///
    /// A set matches only when all its per-channel conditions hold; with
    /// several sets, the first one (by list order) matching at the earliest
    /// cursor position wins. A single set containing only `Skip` conditions
    /// on valid slots matches immediately at the current cursor without
    /// advancing; a `Skip` on a slot with no buffer fails like any other
    /// condition.
    ///
    /// Fails with [`DecodeError::NoChannelData`] when nothing is prepared and
    /// [`DecodeError::EndOfSamples`] when the buffers run out first.
    pub fn wait(&mut self, sets: &[ConditionSet]) -> Result<WaitMatch> {
        if self.buffers.is_empty() {
            return Err(DecodeError::NoChannelData);
        }
        self.state = RunState::Running;

        // Skip-only fast path: an immediate, always-true match that leaves
        // the cursor untouched. Only valid when every referenced slot has a
        // buffer; an out-of-range slot fails its condition even for Skip,
        // so such a set falls through to the scan loop and never matches.
        if sets.len() == 1
            && sets[0].is_skip_only()
            && sets[0]
                .entries()
                .iter()
                .all(|&(slot, _)| slot < self.buffers.len())
        {
            trace!("skip-only wait at sample {}", self.cursor);
            return Ok(WaitMatch {
                pins: self.current_pins(),
                sample_number: self.cursor,
                matched_set: Some(0),
                set_matches: vec![true],
            });
        }

        let num_slots = self.buffers.len();
        while self.has_more() {
            for (slot, buffer) in self.buffers.iter().enumerate() {
                self.current[slot] = buffer.sample_at(self.cursor);
            }

            let set_matches: Vec<bool> = sets
                .iter()
                .map(|set| set.matches(&self.last, &self.current, num_slots))
                .collect();

            if let Some(winner) = set_matches.iter().position(|&m| m) {
                let matched = WaitMatch {
                    pins: self.current.clone(),
                    sample_number: self.cursor,
                    matched_set: Some(winner),
                    set_matches,
                };
                trace!(
                    "wait matched set {} at sample {} pins {:?}",
                    winner, self.cursor, matched.pins
                );
                self.last.copy_from_slice(&self.current);
                self.cursor += 1;
                return Ok(matched);
            }

            self.last.copy_from_slice(&self.current);
            self.cursor += 1;
        }

        self.state = RunState::Done;
        Err(DecodeError::EndOfSamples)
    }

    /// Append an annotation span covering `[start_sample, end_sample]`
    ///
    /// The annotation type defaults to 0 and the shape to hexagon when the
    /// output leaves them unset.
    pub fn put(&mut self, start_sample: usize, end_sample: usize, output: SpanOutput) {
        self.results.push(DecodeSpan {
            start_sample,
            end_sample,
            ann_type: output.ann_type.unwrap_or(0),
            values: output.values,
            raw: output.raw,
            shape: output.shape.unwrap_or(SpanShape::Hexagon),
        });
    }

    /// Register an output kind, returning its stable numeric handle
    ///
    /// Requesting an already-registered kind returns the existing handle.
    /// `Annotation` and `Channel` are pre-registered as handles 0 and 1.
    pub fn register_output(&mut self, kind: OutputKind) -> usize {
        if let Some(handle) = self.outputs.iter().position(|&k| k == kind) {
            return handle;
        }
        self.outputs.push(kind);
        self.outputs.len() - 1
    }

    /// Record a named secondary channel output for stacked decoders
    pub fn emit_channel(&mut self, name: impl Into<String>, samples: Vec<u8>) {
        self.register_output(OutputKind::Channel);
        self.secondary.push((name.into(), samples));
    }

    /// Validate supplied options and channel mapping against the descriptor
    ///
    /// False when a required channel has no mapped index or an option index
    /// is out of range. An out-of-range physical index is tolerated here
    /// (the mapping resolver reports it properly) and only logged.
    pub fn validate_options(
        &self,
        options: &[OptionBinding],
        mapping: &[(usize, usize)],
        captured_channels: &[ChannelData],
    ) -> bool {
        for spec in self.descriptor.required_channels() {
            if !mapping.iter().any(|&(slot, _)| slot == spec.index) {
                debug!("required channel '{}' has no mapping", spec.id);
                return false;
            }
        }
        for binding in options {
            if binding.index >= self.descriptor.options.len() {
                debug!("option index {} out of range", binding.index);
                return false;
            }
        }
        for &(slot, phys) in mapping {
            if !captured_channels.iter().any(|c| c.number == phys) {
                warn!("slot {} mapped to physical channel {} with no data", slot, phys);
            }
        }
        true
    }

    /// Drain the spans accumulated by `put`
    pub fn take_results(&mut self) -> Vec<DecodeSpan> {
        std::mem::take(&mut self.results)
    }

    /// Spans accumulated so far, without draining
    pub fn results(&self) -> &[DecodeSpan] {
        &self.results
    }

    /// Drain the named secondary channel outputs
    pub fn take_secondary_outputs(&mut self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut self.secondary)
    }

    /// Return to `Idle`: clears the cursor, results, match state, secondary
    /// outputs and output registrations. Buffers prepared by a subsequent
    /// `prepare` call are unaffected.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.last.clear();
        self.current.clear();
        self.results.clear();
        self.secondary.clear();
        self.outputs.clear();
        self.state = RunState::Idle;
        debug!("matcher reset to idle");
    }
}

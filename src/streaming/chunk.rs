//! Chunk partitioning and overlap sizing

use crate::capture::ChannelData;

/// Default samples per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Default bound on concurrently processed chunks
pub const DEFAULT_MAX_CONCURRENT_CHUNKS: usize = 3;

/// Cap on the overlap carried into each chunk after the first. The overlap
/// is min(10% of the chunk size, this cap); the cap is a tunable constant,
/// not an invariant.
pub const MAX_OVERLAP_SAMPLES: usize = 1_000;

/// One planned chunk: `[start, end)` in global sample indices, with the
/// first `overlap` samples duplicated from the previous chunk's tail
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkPlan {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub overlap: usize,
}

impl ChunkPlan {
    /// Samples exclusively owned by this chunk (overlap excluded)
    pub fn core_len(&self) -> usize {
        (self.end - self.start) - self.overlap
    }
}

/// A materialized chunk handed to the per-chunk hook
///
/// Channel buffers are copied by value, never aliased, so chunks processed
/// concurrently cannot observe each other's mutations. Sample indices inside
/// the buffers are chunk-local; `start_sample` rebases them to the capture.
#[derive(Clone, Debug)]
pub struct SampleChunk {
    pub index: usize,
    /// Global index of the first sample in the buffers (overlap included)
    pub start_sample: usize,
    /// Global index one past the last sample
    pub end_sample: usize,
    /// Leading samples duplicated from the previous chunk
    pub overlap: usize,
    pub channels: Vec<ChannelData>,
}

impl SampleChunk {
    /// Number of samples in this chunk, overlap included
    pub fn len(&self) -> usize {
        self.end_sample - self.start_sample
    }

    pub fn is_empty(&self) -> bool {
        self.start_sample == self.end_sample
    }

    /// Approximate buffer footprint, for peak-memory accounting
    pub fn byte_size(&self) -> usize {
        self.channels.iter().map(|c| c.samples.len()).sum()
    }

    /// True when a chunk-local result index falls inside the overlap region
    /// (callers use this to drop duplicates of the previous chunk's work)
    pub fn in_overlap(&self, global_sample: usize) -> bool {
        global_sample < self.start_sample + self.overlap
    }
}

/// Partition `[0, total_samples)` into ceil(total/chunk_size) chunks
///
/// Every chunk after the first starts early by the overlap amount so that
/// protocol state spanning a boundary can be re-recognized inside the later
/// chunk.
pub fn plan_chunks(total_samples: usize, chunk_size: usize) -> Vec<ChunkPlan> {
    if total_samples == 0 || chunk_size == 0 {
        return Vec::new();
    }
    let overlap_len = (chunk_size / 10).min(MAX_OVERLAP_SAMPLES);
    let num_chunks = total_samples.div_ceil(chunk_size);
    (0..num_chunks)
        .map(|index| {
            let core_start = index * chunk_size;
            let overlap = if index == 0 {
                0
            } else {
                overlap_len.min(core_start)
            };
            ChunkPlan {
                index,
                start: core_start - overlap,
                end: (core_start + chunk_size).min(total_samples),
                overlap,
            }
        })
        .collect()
}

/// Copy the `[start, end)` slice of every channel into a chunk
pub fn materialize(plan: ChunkPlan, channels: &[ChannelData]) -> SampleChunk {
    let sliced = channels
        .iter()
        .map(|ch| {
            let lo = plan.start.min(ch.samples.len());
            let hi = plan.end.min(ch.samples.len());
            ChannelData::new(ch.number, ch.name.clone(), ch.samples[lo..hi].to_vec())
        })
        .collect();
    SampleChunk {
        index: plan.index,
        start_sample: plan.start,
        end_sample: plan.end,
        overlap: plan.overlap,
        channels: sliced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_count_is_ceiling() {
        assert_eq!(plan_chunks(25_000, 10_000).len(), 3);
        assert_eq!(plan_chunks(30_000, 10_000).len(), 3);
        assert_eq!(plan_chunks(1, 10_000).len(), 1);
        assert!(plan_chunks(0, 10_000).is_empty());
    }

    #[test]
    fn test_first_chunk_has_no_overlap() {
        let plans = plan_chunks(25_000, 10_000);
        assert_eq!(plans[0].overlap, 0);
        assert_eq!(plans[0].start, 0);
        assert_eq!(plans[0].end, 10_000);
    }

    #[test]
    fn test_later_chunks_carry_overlap() {
        let plans = plan_chunks(25_000, 10_000);
        // 10% of 10_000 = 1_000, equal to the cap
        assert_eq!(plans[1].overlap, 1_000);
        assert_eq!(plans[1].start, 9_000);
        assert_eq!(plans[1].end, 20_000);
        assert_eq!(plans[2].start, 19_000);
        assert_eq!(plans[2].end, 25_000);
    }

    #[test]
    fn test_overlap_is_capped() {
        let plans = plan_chunks(100_000, 50_000);
        assert_eq!(
            plans[1].overlap, MAX_OVERLAP_SAMPLES,
            "10% rule must not exceed the fixed cap"
        );
    }

    #[test]
    fn test_core_lengths_sum_to_total() {
        for total in [1usize, 9_999, 10_000, 10_001, 25_000] {
            let sum: usize = plan_chunks(total, 10_000).iter().map(|p| p.core_len()).sum();
            assert_eq!(sum, total, "core lengths must partition {} samples", total);
        }
    }

    #[test]
    fn test_materialize_copies_slices() {
        let channels = vec![ChannelData::new(0, "D", (0..50).map(|i| (i % 2) as u8).collect())];
        let plans = plan_chunks(50, 20);
        let chunk = materialize(plans[1], &channels);
        assert_eq!(chunk.start_sample, 18, "20 - overlap of 2");
        assert_eq!(chunk.channels[0].samples.len(), chunk.len());
        assert_eq!(chunk.channels[0].samples[0], 0, "sample 18 is even");
        assert!(chunk.in_overlap(19));
        assert!(!chunk.in_overlap(20));
    }
}

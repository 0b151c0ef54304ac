//! Condition types and sets for `Matcher::wait`

/// Required per-channel signal state or transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionType {
    /// Always true; a set containing only skips matches immediately
    /// without advancing the cursor
    Skip,
    /// Current value is 0
    Low,
    /// Current value is 1
    High,
    /// Transition 0 -> 1
    Rising,
    /// Transition 1 -> 0
    Falling,
    /// Any transition
    Edge,
    /// No transition
    Stable,
}

impl ConditionType {
    /// Evaluate against the previous and current value of one channel
    #[inline]
    pub fn matches(self, last: u8, current: u8) -> bool {
        match self {
            ConditionType::Skip => true,
            ConditionType::Low => current == 0,
            ConditionType::High => current == 1,
            ConditionType::Rising => last == 0 && current == 1,
            ConditionType::Falling => last == 1 && current == 0,
            ConditionType::Edge => last != current,
            ConditionType::Stable => last == current,
        }
    }
}

/// A conjunction of per-channel conditions
///
/// The set matches at a cursor position only when every entry holds. An
/// entry whose channel slot is at or beyond the number of prepared buffers
/// is false (even `Skip`), failing the whole set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConditionSet {
    entries: Vec<(usize, ConditionType)>,
}

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-condition set
    pub fn single(channel: usize, cond: ConditionType) -> Self {
        Self {
            entries: vec![(channel, cond)],
        }
    }

    /// Builder-style addition of one condition
    pub fn with(mut self, channel: usize, cond: ConditionType) -> Self {
        self.entries.push((channel, cond));
        self
    }

    pub fn entries(&self) -> &[(usize, ConditionType)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if every condition is `Skip` (an empty set counts)
    pub fn is_skip_only(&self) -> bool {
        self.entries
            .iter()
            .all(|(_, cond)| *cond == ConditionType::Skip)
    }

    /// Evaluate all conditions against per-slot last/current state arrays.
    /// `num_channels` is the number of prepared buffers; slots beyond it
    /// fail their condition.
    pub fn matches(&self, last: &[u8], current: &[u8], num_channels: usize) -> bool {
        self.entries.iter().all(|&(slot, cond)| {
            if slot >= num_channels {
                return false;
            }
            cond.matches(last[slot], current[slot])
        })
    }
}

impl FromIterator<(usize, ConditionType)> for ConditionSet {
    fn from_iter<I: IntoIterator<Item = (usize, ConditionType)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Successful result of a `wait`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaitMatch {
    /// Sample value of every prepared channel slot at the matched cursor
    pub pins: Vec<u8>,
    /// Cursor position where the match occurred
    pub sample_number: usize,
    /// Index of the winning set when several were supplied
    pub matched_set: Option<usize>,
    /// Per-set match flags at the winning cursor position
    pub set_matches: Vec<bool>,
}

//! Condition-matching engine
//!
//! The interpreter every concrete decoder is built on. A decoder expresses
//! "advance the sample cursor until these per-channel conditions hold"
//! (`Matcher::wait`) and "emit an annotation spanning these samples"
//! (`Matcher::put`); the engine does the per-sample walking.

pub mod conditions;
pub mod matcher;
pub mod span;

pub use conditions::{ConditionSet, ConditionType, WaitMatch};
pub use matcher::{Matcher, RunState};
pub use span::{DecodeSpan, OutputKind, SpanOutput, SpanShape};

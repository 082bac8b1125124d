//! # time-engine
//!
//! Deterministic time computation for reminder scheduling.
//!
//! Everything here is synchronous and network-free, and no function reads the
//! system clock: callers pass the reference instant explicitly, which keeps
//! results reproducible in tests.
//!
//! ## Modules
//!
//! - [`timezone`] — Local wall-clock ↔ UTC conversion with a fixed DST gap/overlap policy
//! - [`rules`] — Ordered pattern families that resolve time expressions inside free text
//! - [`candidate`] — The [`ParsedTimeCandidate`] value shared by every resolver
//! - [`error`] — Error types

pub mod candidate;
pub mod error;
pub mod rules;
pub mod timezone;

pub use candidate::{CandidateSource, Confidence, ParsedTimeCandidate};
pub use error::TimeEngineError;
pub use rules::{
    default_time, PastTimePolicy, RuleBasedTimeCalculator, RuleOptions, WeekStartDay,
    DEFAULT_HOUR, DEFAULT_MINUTE,
};
pub use timezone::{
    convert_timezone, local_to_utc, parse_rfc3339, parse_timezone, to_local, to_utc,
    utc_offset_at, ConvertedDatetime,
};

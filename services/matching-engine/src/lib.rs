//! Matching Engine
//!
//! Per-symbol order books with price-time priority matching.
//!
//! **Key Invariants:**
//! - Price-time priority strictly enforced: better price first, then lower
//!   acceptance sequence
//! - Books are crossed-free at rest: no resting bid price ever exceeds a
//!   resting ask price once a matching pass completes
//! - Conservation of quantity: an order's fills never exceed its size
//! - A generated trade is never lost: trade creation and maker removal are
//!   one logical step
//!
//! Invariant violations panic; a corrupted book is a bug, not a condition
//! to recover from.

pub mod book;
pub mod engine;
pub mod matching;

pub use engine::{EngineError, MatchOutcome, MatchingEngine};

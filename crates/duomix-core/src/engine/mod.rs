//! Mixing engine - decks, mixer bus, sync, compiler, and sample chain
//!
//! This module contains the control-plane components of the console:
//! - DeckState: per-deck control state and pad machine data
//! - MixerState / compute_effective: loudness balance across decks
//! - Sync: follow-sync, one-shot sync, and auto beat-match
//! - PatternCompiler: deck state to pattern program text
//! - RecomputeScheduler: tick-driven debounce with stale-pass detection
//! - SamplerChain: per-deck processing chain with smoothed parameters
//! - MixEngine: the engine tying everything together

mod compiler;
mod deck;
mod engine;
mod graph;
mod mixer;
mod schedule;
mod sync;

pub use compiler::*;
pub use deck::*;
pub use engine::*;
pub use graph::*;
pub use mixer::*;
pub use schedule::*;
pub use sync::*;

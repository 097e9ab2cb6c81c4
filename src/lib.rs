//! Power-cycle log analysis library.
//!
//! Consumes a firmware event log produced across repeated power-loss /
//! power-recovery cycles and derives per-cycle timing and health metrics,
//! plus a diagnostic IO-trace replay of named digital signals.

pub mod analyzer;
pub mod config;
pub mod decoder;
pub mod dialect;
pub mod health;
pub mod iotrace;
pub mod metrics;
pub mod plot;
pub mod segmenter;
pub mod sink;
pub mod tick;

//! Pluggable tracing interface.
//!
//! The simulator reports its progress through objects implementing the
//! `Logger` trait. This is useful if you want to control what (and how
//! much) output is generated, or to single-step: a logger may block in
//! `cycle_starting` until the user is ready.

use super::Mic1;

/// Trait for objects that observe the machine while it runs.
///
/// The default action for any method is to do nothing, generating no
/// output. `cycle_starting` runs before the datapath executes, so the
/// control word about to run is the one at the current microprogram
/// counter; `cycle_complete` runs after the new counter is in place.
#[allow(unused_variables)]
pub trait Logger {
    fn cycle_starting(&mut self, machine: &Mic1) {}
    fn cycle_complete(&mut self, machine: &Mic1) {}
}

/// Object which does not generate any logging.
pub struct NoLogging;

impl Logger for NoLogging {}

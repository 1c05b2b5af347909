#![deny(
    trivial_numeric_casts,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    unused_results
)]
#![warn(rust_2021_compatibility, unreachable_pub)]

//! The signal a worker receives each time it asks its queue manager for
//! work (spec.md §4.2's `worker_dequeue`).

use std::fmt::{Display, Formatter};

/// A signal delivered to a worker.
#[derive(Debug)]
#[non_exhaustive]
pub enum WorkSignal<Msg> {
    /// An input to process, with whether this is the last preflist position
    /// it could have been forwarded to.
    Input {
        /// The value to process.
        value: Msg,
        /// True iff `preflist_remaining` had length 1 when this input was
        /// dequeued.
        last_preflist: bool,
    },
    /// No more inputs will ever arrive for this (fitting, partition): the
    /// queue has been marked for end-of-input and has drained.
    EndOfInput,
    /// The worker must stop immediately without draining (pipeline abort).
    Stop,
}

impl<Msg> WorkSignal<Msg> {
    /// Returns the name of this signal variant.
    pub fn name(&self) -> &'static str {
        match self {
            WorkSignal::Input { .. } => "Input",
            WorkSignal::EndOfInput => "EndOfInput",
            WorkSignal::Stop => "Stop",
        }
    }
}

impl<Msg> Display for WorkSignal<Msg> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

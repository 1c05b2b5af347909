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

//! The per-node queue manager: owns every `(fitting, partition)` queue
//! hosted on a node, drives the synchronous enqueue/dequeue protocol
//! (spec.md §4.1), and spawns/supervises the workers that run each
//! fitting's behavior (spec.md §4.2).

mod manager;
mod record;
mod worker;

pub use manager::spawn_queue_manager;

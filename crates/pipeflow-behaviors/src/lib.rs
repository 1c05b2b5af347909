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

//! Built-in fitting behaviors: `pass`, `tee`, `transform`, `reduce`
//! (spec.md §1 names a fifth, `get`, deliberately left unimplemented — see
//! SPEC_FULL.md).

pub mod pass;
pub mod reduce;
pub mod sample;
pub mod tee;
pub mod transform;

pub use pass::{Pass, PassFactory};
pub use reduce::{Reduce, ReduceFactory};
pub use sample::Sample;
pub use tee::{Tee, TeeFactory};
pub use transform::{Transform, TransformFactory};

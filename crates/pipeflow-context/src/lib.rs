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

//! A context is a bag of key-value pairs handed to a fitting's `init`
//! callback, and the pipeline-wide log/trace options a client passes to
//! `exec`.

use std::collections::{HashMap, HashSet};

/// Values that can be stored in a [`Context`].
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Value {
    /// A boolean value.
    Bool(bool),
    /// A 64-bit unsigned value.
    U64(u64),
    /// A 64-bit signed value.
    I64(i64),
    /// A string value.
    String(String),
}

/// A bag of key-value pairs passed to a fitting's `init` callback.
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: HashMap<String, Value>,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets a value in the context.
    pub fn set(&mut self, key: &str, value: Value) {
        let _ = self.values.insert(key.to_string(), value);
    }

    /// Reads a value from the context.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

/// Where log records for a pipeline are delivered, per spec.md §6.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum LogMode {
    /// Log records are delivered to the pipeline sink alongside results.
    Sink,
    /// Log records are delivered to the node-local log.
    NodeLog,
    /// Log records are delivered to the cluster-wide system log.
    SystemLog,
    /// Log records are dropped.
    #[default]
    Drop,
}

/// Which trace records a pipeline keeps, per spec.md §6.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TraceFilter {
    /// Every trace record is kept.
    All,
    /// Only trace records whose topics intersect this set are kept.
    Topics(HashSet<String>),
    /// Every trace record is dropped.
    #[default]
    Drop,
}

impl TraceFilter {
    /// Returns whether a trace record carrying `topics` should be kept.
    pub fn admits(&self, topics: &[&str]) -> bool {
        match self {
            TraceFilter::All => true,
            TraceFilter::Drop => false,
            TraceFilter::Topics(allowed) => topics.iter().any(|t| allowed.contains(*t)),
        }
    }
}

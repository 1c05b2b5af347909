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

//! A read-only collaborator that maps a hash to an ordered preflist of
//! partitions (spec.md §2, §4.5). The core crates depend only on the
//! [`RingClient`] trait; [`HashRing`] is the one concrete implementation this
//! repo ships, a standard token-ring with virtual nodes, used by every test
//! and demo in place of a real external ring service.

use std::collections::{BTreeMap, HashSet};
use std::hash::{Hash, Hasher};

/// A 160-bit hash is specified by spec.md; this implementation uses the
/// 64-bit hash produced by `DefaultHasher`, which is more than wide enough
/// for the partition counts any single-process deployment of this crate
/// runs with. See DESIGN.md for the rationale.
pub type HashValue = u64;

/// The id of a ring partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionId(pub u32);

/// The id of a node owning one or more partitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(pub String);

/// One entry of a preflist: a partition and the node that currently owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflistEntry {
    /// The partition.
    pub partition: PartitionId,
    /// The node owning that partition.
    pub node: NodeId,
}

/// Maps a hash to an ordered preflist of partitions. A read-only
/// collaborator: nothing in this crate pack mutates ring state through this
/// trait, ownership changes are applied by reconstructing/replacing the
/// `RingClient` implementation.
pub trait RingClient: Send + Sync {
    /// Returns the preflist for `hash`, in ring order, truncated to at most
    /// `nval` distinct partitions.
    fn preflist(&self, hash: HashValue, nval: usize) -> Vec<PreflistEntry>;

    /// Returns the node currently owning `partition`, if any.
    fn owner(&self, partition: PartitionId) -> Option<NodeId>;
}

/// A consistent-hash ring with virtual nodes, the standard construction used
/// by Dynamo-style systems.
pub struct HashRing {
    /// Ring token -> preflist entry. Each partition contributes
    /// `vnodes_per_partition` tokens so ownership is spread evenly.
    tokens: BTreeMap<u64, PreflistEntry>,
    owners: std::collections::HashMap<PartitionId, NodeId>,
}

impl HashRing {
    /// Builds a ring from a fixed partition -> node ownership map, with
    /// `vnodes_per_partition` virtual nodes per partition.
    pub fn new(ownership: Vec<(PartitionId, NodeId)>, vnodes_per_partition: u32) -> Self {
        let mut tokens = BTreeMap::new();
        let mut owners = std::collections::HashMap::new();

        for (partition, node) in ownership {
            for vnode in 0..vnodes_per_partition {
                let token = token_for(partition, vnode);
                let _ = tokens.insert(
                    token,
                    PreflistEntry {
                        partition,
                        node: node.clone(),
                    },
                );
            }
            let _ = owners.insert(partition, node);
        }

        Self { tokens, owners }
    }
}

fn token_for(partition: PartitionId, vnode: u32) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    partition.0.hash(&mut hasher);
    vnode.hash(&mut hasher);
    hasher.finish()
}

impl RingClient for HashRing {
    fn preflist(&self, hash: HashValue, nval: usize) -> Vec<PreflistEntry> {
        if self.tokens.is_empty() || nval == 0 {
            return vec![];
        }

        let mut seen = HashSet::new();
        let mut result = Vec::with_capacity(nval);

        let clockwise = self
            .tokens
            .range(hash..)
            .chain(self.tokens.range(..hash))
            .map(|(_, entry)| entry);

        for entry in clockwise {
            if seen.insert(entry.partition) {
                result.push(entry.clone());
                if result.len() == nval {
                    break;
                }
            }
        }

        result
    }

    fn owner(&self, partition: PartitionId) -> Option<NodeId> {
        self.owners.get(&partition).cloned()
    }
}

/// Hashes a value implementing [`Hash`] into a [`HashValue`], the default
/// partitioner helper fittings use when they don't need a bespoke hash.
pub fn hash_value<T: Hash>(value: &T) -> HashValue {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod test {
    use super::*;

    fn ring(n: u32) -> HashRing {
        let ownership = (0..n)
            .map(|i| (PartitionId(i), NodeId(format!("node-{}", i % 3))))
            .collect();
        HashRing::new(ownership, 16)
    }

    #[test]
    fn preflist_has_distinct_partitions() {
        let ring = ring(8);
        let preflist = ring.preflist(42, 3);
        assert_eq!(preflist.len(), 3);
        let distinct: HashSet<_> = preflist.iter().map(|e| e.partition).collect();
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn preflist_is_deterministic() {
        let ring = ring(8);
        assert_eq!(ring.preflist(1234, 2), ring.preflist(1234, 2));
    }

    #[test]
    fn preflist_truncates_when_fewer_partitions_than_nval() {
        let ring = ring(2);
        let preflist = ring.preflist(7, 5);
        assert_eq!(preflist.len(), 2);
    }

    #[test]
    fn owner_reports_current_ownership() {
        let ring = ring(4);
        assert_eq!(ring.owner(PartitionId(0)), Some(NodeId("node-0".into())));
        assert_eq!(ring.owner(PartitionId(99)), None);
    }
}

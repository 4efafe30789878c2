//! Property-based test generators using proptest.
//!
//! Provides strategies for generating sync data that maintains the
//! invariants the engine relies on.

use notesync_protocol::{Guid, Notebook, SyncChunk, Tag, Usn};
use proptest::prelude::*;

/// Strategy for generating remote guids.
pub fn guid_strategy() -> impl Strategy<Value = Guid> {
    prop::string::string_regex("[a-f0-9]{8}-[a-f0-9]{4}").expect("Invalid regex")
}

/// Strategy for generating display names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9 ]{0,15}").expect("Invalid regex")
}

/// Strategy for generating contiguous USN ranges starting at 1.
pub fn usn_ranges_strategy(max_chunks: usize) -> impl Strategy<Value = Vec<(Usn, Usn)>> {
    prop::collection::vec(1u32..20, 1..=max_chunks.max(1)).prop_map(|sizes| {
        let mut low = 1;
        sizes
            .into_iter()
            .map(|size| {
                let range = (low, low + size - 1);
                low += size;
                range
            })
            .collect()
    })
}

/// Strategy for generating contiguous chunks starting at USN 1, each
/// carrying notebooks whose USNs lie within the chunk's range.
pub fn chunks_strategy(max_chunks: usize) -> impl Strategy<Value = Vec<SyncChunk>> {
    usn_ranges_strategy(max_chunks)
        .prop_flat_map(|ranges| {
            let count = ranges.len();
            (Just(ranges), prop::collection::vec(any::<bool>(), count))
        })
        .prop_map(|(ranges, with_item)| {
            ranges
                .into_iter()
                .zip(with_item)
                .map(|((low, high), with_item)| {
                    let mut chunk = SyncChunk::new(low, high);
                    if with_item {
                        let notebook = Notebook::new(format!("nb {high}"))
                            .with_guid(format!("nb-{high}"), high);
                        chunk.notebooks.push(notebook);
                    }
                    chunk
                })
                .collect()
        })
}

/// Strategy for generating a tag forest in shuffled order.
///
/// Tag `i` has guid `t{i}`; its parent, if any, is a tag with a smaller
/// index. USNs are a random permutation of `1..=n`, so a parent often
/// carries a higher USN than its children.
pub fn tag_forest_strategy(max_tags: usize) -> impl Strategy<Value = Vec<Tag>> {
    (1..=max_tags.max(1))
        .prop_flat_map(|count| {
            let parents: Vec<_> = (0..count)
                .map(|i| prop::option::of(0..i.max(1)).prop_map(move |p| p.filter(|_| i > 0)))
                .collect();
            let usns = Just((1..=count as Usn).collect::<Vec<_>>()).prop_shuffle();
            (parents, usns)
        })
        .prop_map(|(parents, usns)| {
            parents
                .into_iter()
                .zip(usns)
                .enumerate()
                .map(|(i, (parent, usn))| {
                    let tag = Tag::new(format!("tag {i}")).with_guid(format!("t{i}"), usn);
                    match parent {
                        Some(p) => tag.with_parent(format!("t{p}")),
                        None => tag,
                    }
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

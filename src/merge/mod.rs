//! Merge forests: heading-rooted units selected from source DTBs.
//!
//! A forest is built either from a whole NCC ([`forest_from_ncc`]) or from a
//! macro descriptor ([`MacroDescriptor`]). The builder consumes it through
//! [`flatten`], which fixes the output order and each unit's depth.

pub mod descriptor;
pub mod entry;

use url::Url;

use crate::dom::{Document, document_identity};
use crate::error::{Error, Result};
use crate::store::DocumentStore;

pub use descriptor::{MacroDescriptor, Section};
pub use entry::{MergeEntry, TextElement};

/// A merge entry in flattened build order with its 1-based depth.
#[derive(Debug, Clone, Copy)]
pub struct FlatEntry<'a> {
    pub entry: &'a MergeEntry,
    pub depth: usize,
}

/// Pre-order traversal of every tree in `forest`, trees in input order.
pub fn flatten(forest: &[MergeEntry]) -> Vec<FlatEntry<'_>> {
    fn walk<'a>(entries: &'a [MergeEntry], depth: usize, out: &mut Vec<FlatEntry<'a>>) {
        for entry in entries {
            out.push(FlatEntry { entry, depth });
            walk(&entry.children, depth + 1, out);
        }
    }

    let mut out = Vec::new();
    walk(forest, 1, &mut out);
    out
}

/// Number of entries in `forest`, children included.
pub fn count_entries(forest: &[MergeEntry]) -> usize {
    forest
        .iter()
        .map(|e| 1 + count_entries(&e.children))
        .sum()
}

/// Build a forest with one tree per top-level heading of the NCC at `ncc_uri`.
///
/// A heading's children are the deeper headings between it and the next
/// heading of its own rank or shallower, nested recursively.
pub fn forest_from_ncc(ncc_uri: &Url, store: &DocumentStore) -> Result<Vec<MergeEntry>> {
    let ncc_uri = document_identity(ncc_uri);
    let ncc = store.load(&ncc_uri)?;
    let headings = headings(&ncc)?;
    if headings.is_empty() {
        log::warn!("{ncc_uri} has no headings");
    }
    build_level(&ncc_uri, &headings, store)
}

/// `(level, id)` of every heading in document order.
fn headings(ncc: &Document) -> Result<Vec<(u8, String)>> {
    let scope = ncc.body().unwrap_or_else(|| ncc.root());
    let mut out = Vec::new();
    for node in ncc.descendants(scope) {
        let Some(level) = ncc.heading_level(node) else {
            continue;
        };
        let id = ncc.element_id(node).ok_or_else(|| {
            Error::structural(format!(
                "<{}> \"{}\" has no id",
                ncc.element_name(node).unwrap_or_default(),
                ncc.text_content(node).trim()
            ))
        })?;
        out.push((level, id.to_string()));
    }
    Ok(out)
}

fn build_level(
    ncc_uri: &Url,
    headings: &[(u8, String)],
    store: &DocumentStore,
) -> Result<Vec<MergeEntry>> {
    let Some(top) = headings.iter().map(|(level, _)| *level).min() else {
        return Ok(Vec::new());
    };

    let starts: Vec<usize> = headings
        .iter()
        .enumerate()
        .filter(|(_, (level, _))| *level == top)
        .map(|(i, _)| i)
        .collect();

    let mut entries = Vec::with_capacity(starts.len());
    for (k, &start) in starts.iter().enumerate() {
        let end = starts.get(k + 1).copied().unwrap_or(headings.len());
        let mut anchor = ncc_uri.clone();
        anchor.set_fragment(Some(headings[start].1.as_str()));
        let children = build_level(ncc_uri, &headings[start + 1..end], store)?;
        entries.push(MergeEntry::with_store(anchor, store.clone())?.with_children(children));
    }
    Ok(entries)
}

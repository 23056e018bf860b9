//! Output heads and aggregate DAISY metadata.

use std::collections::HashSet;

use super::BuildState;
use crate::config::BuildOptions;
use crate::dom::{Document, NodeId};
use crate::error::{Error, Result};
use crate::merge::MergeEntry;
use crate::time::format_hms;

const PAGE_TYPES: [(&str, &str); 3] = [
    ("page-front", "ncc:pageFront"),
    ("page-normal", "ncc:pageNormal"),
    ("page-special", "ncc:pageSpecial"),
];

/// Copy `<title>` and `<meta>` elements from the first unit's NCC head into
/// the output NCC, and the title and `dc:identifier` into the content head.
pub(super) fn copy_head(state: &mut BuildState, first: &MergeEntry) -> Result<()> {
    let source = first.ncc()?;
    let Some(source_head) = source.head() else {
        log::warn!("{} has no <head>; output metadata starts empty", first.ncc_uri());
        return Ok(());
    };

    let copied: Vec<NodeId> = source
        .element_children(source_head)
        .filter(|&n| match source.element_name(n) {
            Some("title") => true,
            Some("meta") => source.attr(n, "http-equiv").is_none(),
            _ => false,
        })
        .collect();

    append_to_head(&mut state.ncc, source, &copied)?;

    if let Some(content) = state.content.as_mut() {
        let for_content: Vec<NodeId> = copied
            .iter()
            .copied()
            .filter(|&n| {
                source.element_name(n) == Some("title")
                    || source.attr(n, "name") == Some("dc:identifier")
            })
            .collect();
        append_to_head(content, source, &for_content)?;
    }
    Ok(())
}

fn append_to_head(doc: &mut Document, source: &Document, nodes: &[NodeId]) -> Result<()> {
    let head = doc
        .head()
        .ok_or_else(|| Error::structural("output document has no <head>"))?;
    for &node in nodes {
        let copy = doc.import_subtree(source, node);
        doc.append(head, copy);
        doc.append_text(head, "\n");
    }
    Ok(())
}

/// Recompute the NCC metadata that describes the merged book as a whole.
pub(super) fn write_aggregate(state: &mut BuildState, options: &BuildOptions) {
    let images = distinct_images(state.content.as_ref());
    let files = 1
        + 2 * state.smils.len()
        + usize::from(state.content.is_some())
        + images;

    let pages: Vec<(&str, usize)> = PAGE_TYPES
        .iter()
        .map(|&(class, meta)| (meta, count_pages(&state.ncc, class)))
        .collect();

    let ncc = &mut state.ncc;
    ncc.set_meta("dc:format", "Daisy 2.02");
    ncc.set_meta("ncc:totalTime", &format_hms(state.total_elapsed));
    ncc.set_meta("ncc:files", &files.to_string());
    ncc.set_meta("ncc:depth", &state.max_depth.min(6).to_string());
    ncc.set_meta("ncc:tocItems", &state.toc_items.to_string());
    for (meta, count) in pages {
        ncc.set_meta(meta, &count.to_string());
    }
    let multimedia = if state.has_text {
        "audioFullText"
    } else {
        "audioNCC"
    };
    ncc.set_meta("ncc:multimediaType", multimedia);
    ncc.set_meta("ncc:generator", &options.generator);
}

/// `<span class="page-...">` page markers in the NCC body.
fn count_pages(ncc: &Document, class: &str) -> usize {
    let Some(body) = ncc.body() else {
        return 0;
    };
    ncc.descendants_named(body, "span")
        .into_iter()
        .filter(|&span| ncc.has_class(span, class))
        .count()
}

fn distinct_images(content: Option<&Document>) -> usize {
    let Some(content) = content else {
        return 0;
    };
    content
        .descendants_named(content.root(), "img")
        .into_iter()
        .filter_map(|img| content.attr(img, "src"))
        .map(str::trim)
        .filter(|src| !src.is_empty())
        .collect::<HashSet<_>>()
        .len()
}

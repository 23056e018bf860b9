//! A single heading-rooted unit of source content.

use std::cell::OnceCell;
use std::rc::Rc;

use url::Url;

use crate::audio::{AudioSegment, coalesce_segments};
use crate::dom::{Document, NodeId, Reference, document_identity, resolve_reference};
use crate::error::{Error, Result};
use crate::store::DocumentStore;
use crate::time::parse_clock_value;
use crate::util::collapse_whitespace;

/// Inline elements a `<text src>` target is raised through to find the block
/// it belongs to.
const INLINE_ELEMENTS: &[&str] = &[
    "a", "abbr", "acronym", "b", "bdo", "big", "cite", "code", "dfn", "em", "font", "i", "kbd",
    "q", "s", "samp", "small", "span", "strike", "strong", "sub", "sup", "tt", "u", "var", "img",
    "br",
];

/// A block-level element in one of the unit's content documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextElement {
    /// Identity of the content document holding the element.
    pub document: Url,
    pub node: NodeId,
}

/// One heading-rooted unit to include in an output DTB, with the sub-headings
/// selected under it.
///
/// The source anchor is fixed at construction. Everything derived from it
/// (documents, element runs, audio segments) is resolved on first access and
/// cached; resolution failures surface as errors from the accessor.
#[derive(Debug)]
pub struct MergeEntry {
    source_anchor: Url,
    pub children: Vec<MergeEntry>,
    store: DocumentStore,
    ncc: OnceCell<Rc<Document>>,
    ncc_elements: OnceCell<Vec<NodeId>>,
    smil: OnceCell<Rc<Document>>,
    smil_elements: OnceCell<Vec<NodeId>>,
    content_documents: OnceCell<Vec<(Url, Rc<Document>)>>,
    text_elements: OnceCell<Vec<TextElement>>,
    audio_segments: OnceCell<Vec<AudioSegment>>,
}

/// Resolve a cell, computing it with `init` on first use.
fn cached<'a, T>(cell: &'a OnceCell<T>, init: impl FnOnce() -> Result<T>) -> Result<&'a T> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = init()?;
    Ok(cell.get_or_init(|| value))
}

impl MergeEntry {
    /// Create an entry for the heading named by `source_anchor`
    /// (`.../ncc.html#heading-id`) with its own document store.
    pub fn new(source_anchor: Url) -> Result<Self> {
        Self::with_store(source_anchor, DocumentStore::new())
    }

    /// Create an entry that shares parsed documents through `store`.
    pub fn with_store(source_anchor: Url, store: DocumentStore) -> Result<Self> {
        if source_anchor.fragment().is_none_or(str::is_empty) {
            return Err(Error::structural(format!(
                "merge entry anchor has no heading fragment: {source_anchor}"
            )));
        }
        Ok(Self {
            source_anchor,
            children: Vec::new(),
            store,
            ncc: OnceCell::new(),
            ncc_elements: OnceCell::new(),
            smil: OnceCell::new(),
            smil_elements: OnceCell::new(),
            content_documents: OnceCell::new(),
            text_elements: OnceCell::new(),
            audio_segments: OnceCell::new(),
        })
    }

    pub fn with_children(mut self, children: Vec<MergeEntry>) -> Self {
        self.children = children;
        self
    }

    pub fn source_anchor(&self) -> &Url {
        &self.source_anchor
    }

    /// Heading id named by the anchor fragment.
    pub fn heading_id(&self) -> &str {
        self.source_anchor.fragment().unwrap_or_default()
    }

    /// URI of the source NCC document.
    pub fn ncc_uri(&self) -> Url {
        document_identity(&self.source_anchor)
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    // ------------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------------

    /// The parsed source NCC.
    pub fn ncc(&self) -> Result<&Rc<Document>> {
        cached(&self.ncc, || self.store.load(&self.source_anchor))
    }

    /// The single SMIL document this unit's NCC anchors point into.
    pub fn smil(&self) -> Result<&Rc<Document>> {
        cached(&self.smil, || {
            let ncc = self.ncc()?;
            let mut target: Option<Url> = None;
            for reference in self.ncc_references()? {
                match &target {
                    None => target = Some(reference.document),
                    Some(existing) if *existing == reference.document => {}
                    Some(existing) => {
                        return Err(Error::structural(format!(
                            "heading {:?} in {} points into more than one SMIL file ({} and {})",
                            self.heading_id(),
                            self.ncc_uri(),
                            existing,
                            reference.document
                        )));
                    }
                }
            }
            let target = target.ok_or_else(|| {
                Error::structural(format!(
                    "heading {:?} in {} has no SMIL anchor",
                    self.heading_id(),
                    ncc.base_uri().map(Url::as_str).unwrap_or_default()
                ))
            })?;
            self.store.load(&target)
        })
    }

    /// Every distinct content document referenced by this unit's SMIL
    /// `<text src>` anchors, in order of first reference. The NCC itself is
    /// not a content document.
    pub fn content_documents(&self) -> Result<&Vec<(Url, Rc<Document>)>> {
        cached(&self.content_documents, || {
            let ncc_uri = self.ncc_uri();
            let mut docs: Vec<(Url, Rc<Document>)> = Vec::new();
            for reference in self.text_references()? {
                if reference.document == ncc_uri
                    || docs.iter().any(|(url, _)| *url == reference.document)
                {
                    continue;
                }
                let doc = self.store.load(&reference.document)?;
                docs.push((reference.document, doc));
            }
            Ok(docs)
        })
    }

    /// Content document by identity.
    pub fn content_document(&self, uri: &Url) -> Result<Option<&Rc<Document>>> {
        Ok(self
            .content_documents()?
            .iter()
            .find(|(url, _)| url == uri)
            .map(|(_, doc)| doc))
    }

    // ------------------------------------------------------------------------
    // Element runs
    // ------------------------------------------------------------------------

    /// The heading element and the sibling elements following it, up to (not
    /// including) the next heading.
    pub fn ncc_elements(&self) -> Result<&Vec<NodeId>> {
        cached(&self.ncc_elements, || {
            let ncc = self.ncc()?;
            let heading = ncc.get_by_id(self.heading_id()).ok_or_else(|| {
                Error::structural(format!(
                    "heading {:?} not found in {}",
                    self.heading_id(),
                    self.ncc_uri()
                ))
            })?;
            if ncc.heading_level(heading).is_none() {
                return Err(Error::structural(format!(
                    "anchor {:?} in {} names a <{}>, not a heading",
                    self.heading_id(),
                    self.ncc_uri(),
                    ncc.element_name(heading).unwrap_or_default()
                )));
            }
            Ok(run_until(ncc, heading, |n| ncc.heading_level(n).is_some()))
        })
    }

    /// The heading text, whitespace collapsed.
    pub fn title(&self) -> Result<String> {
        let ncc = self.ncc()?;
        let heading = self.ncc_elements()?[0];
        Ok(collapse_whitespace(&ncc.text_content(heading)).trim().to_string())
    }

    /// Heading level in the source NCC.
    pub fn source_level(&self) -> Result<u8> {
        let ncc = self.ncc()?;
        let heading = self.ncc_elements()?[0];
        Ok(ncc.heading_level(heading).unwrap_or(1))
    }

    /// The run of `<par>` elements from the one this heading points at up to
    /// the one the next heading points at.
    pub fn smil_elements(&self) -> Result<&Vec<NodeId>> {
        cached(&self.smil_elements, || {
            let ncc = self.ncc()?;
            let smil = self.smil()?;
            let run = self.ncc_elements()?;

            let start = heading_par(ncc, smil, run[0])?.ok_or_else(|| {
                Error::structural(format!(
                    "SMIL anchor of heading {:?} does not resolve in {}",
                    self.heading_id(),
                    smil.base_uri().map(Url::as_str).unwrap_or_default()
                ))
            })?;

            let next_heading = run
                .last()
                .and_then(|&last| ncc.next_element_sibling(last));
            let stop = match next_heading {
                Some(next) => heading_par(ncc, smil, next)?,
                None => None,
            };

            Ok(run_until(smil, start, |n| Some(n) == stop))
        })
    }

    /// Block-level content elements referenced by the unit's `<text src>`
    /// anchors, plus any siblings sitting between two referenced blocks.
    pub fn text_elements(&self) -> Result<&Vec<TextElement>> {
        cached(&self.text_elements, || {
            let ncc_uri = self.ncc_uri();
            let mut blocks: Vec<TextElement> = Vec::new();
            for reference in self.text_references()? {
                if reference.document == ncc_uri {
                    continue;
                }
                let Some(doc) = self.content_document(&reference.document)? else {
                    continue;
                };
                let target = reference.resolve_in(doc).ok_or_else(|| {
                    Error::structural(format!(
                        "text anchor {}#{} does not resolve",
                        reference.document, reference.fragment
                    ))
                })?;
                let block = block_ancestor(doc, target);
                if blocks
                    .iter()
                    .any(|b| b.document == reference.document && b.node == block)
                {
                    continue;
                }

                if let Some(last) = blocks.last()
                    && last.document == reference.document
                    && doc.parent(last.node) == doc.parent(block)
                {
                    let interposed = siblings_between(doc, last.node, block);
                    for node in interposed {
                        if !blocks.iter().any(|b| b.document == reference.document && b.node == node) {
                            blocks.push(TextElement {
                                document: reference.document.clone(),
                                node,
                            });
                        }
                    }
                }
                blocks.push(TextElement {
                    document: reference.document.clone(),
                    node: block,
                });
            }
            Ok(blocks)
        })
    }

    /// Audio windows played by the unit's pars, touching clips on the same
    /// file coalesced.
    pub fn audio_segments(&self) -> Result<&Vec<AudioSegment>> {
        cached(&self.audio_segments, || {
            let smil = self.smil()?;
            let mut segments = Vec::new();
            for &par in self.smil_elements()? {
                for audio in smil.descendants_named(par, "audio") {
                    if let Some(segment) = audio_segment(smil, audio)? {
                        segments.push(segment);
                    }
                }
            }
            Ok(coalesce_segments(segments))
        })
    }

    // ------------------------------------------------------------------------
    // Reference helpers
    // ------------------------------------------------------------------------

    /// `<a href>` references inside the NCC run.
    fn ncc_references(&self) -> Result<Vec<Reference>> {
        let ncc = self.ncc()?;
        let mut refs = Vec::new();
        for &element in self.ncc_elements()? {
            refs.extend(links(ncc, element, "a", "href"));
        }
        Ok(refs)
    }

    /// `<text src>` references inside the SMIL run.
    fn text_references(&self) -> Result<Vec<Reference>> {
        let smil = self.smil()?;
        let mut refs = Vec::new();
        for &par in self.smil_elements()? {
            refs.extend(links(smil, par, "text", "src"));
        }
        Ok(refs)
    }
}

/// `start` and the element siblings after it, stopping before the first one
/// matching `stop`.
fn run_until(doc: &Document, start: NodeId, stop: impl Fn(NodeId) -> bool) -> Vec<NodeId> {
    let mut run = vec![start];
    let mut current = start;
    while let Some(next) = doc.next_element_sibling(current) {
        if stop(next) {
            break;
        }
        run.push(next);
        current = next;
    }
    run
}

/// Resolved `<tag attr>` references below `element`.
fn links(doc: &Document, element: NodeId, tag: &str, attr: &str) -> Vec<Reference> {
    doc.descendants_named(element, tag)
        .into_iter()
        .filter_map(|node| {
            let href = doc.attr(node, attr)?;
            let base = doc.base_uri_of(node)?;
            resolve_reference(base, href)
        })
        .collect()
}

/// The `<par>` a heading's first link points at, when it points into `smil`.
fn heading_par(ncc: &Document, smil: &Document, heading: NodeId) -> Result<Option<NodeId>> {
    let Some(reference) = links(ncc, heading, "a", "href").into_iter().next() else {
        return Ok(None);
    };
    let Some(target) = reference.resolve_in(smil) else {
        return Ok(None);
    };
    Ok(Some(smil.closest(target, "par").unwrap_or(target)))
}

fn block_ancestor(doc: &Document, node: NodeId) -> NodeId {
    let mut current = node;
    while let Some(name) = doc.element_name(current) {
        if !INLINE_ELEMENTS.contains(&name) {
            break;
        }
        let parent = doc.parent(current);
        if !doc.is_element(parent) {
            break;
        }
        current = parent;
    }
    current
}

/// Element siblings strictly between `from` and `to`; empty if `to` does not
/// follow `from`.
fn siblings_between(doc: &Document, from: NodeId, to: NodeId) -> Vec<NodeId> {
    let mut between = Vec::new();
    let mut current = from;
    while let Some(next) = doc.next_element_sibling(current) {
        if next == to {
            return between;
        }
        between.push(next);
        current = next;
    }
    Vec::new()
}

fn audio_segment(smil: &Document, audio: NodeId) -> Result<Option<AudioSegment>> {
    let src = smil
        .attr(audio, "src")
        .ok_or_else(|| Error::structural("<audio> without src"))?;
    let base = smil
        .base_uri_of(audio)
        .ok_or_else(|| Error::structural("SMIL document has no base URI"))?;
    let file = document_identity(&base.join(src)?);

    let begin = clip_attr(smil, audio, "clip-begin", "clipBegin")?;
    let end = clip_attr(smil, audio, "clip-end", "clipEnd")?;
    let (Some(begin), Some(end)) = (begin, end) else {
        return Err(Error::format(format!("<audio src={src:?}> lacks clip-begin/clip-end")));
    };

    if end < begin {
        return Err(Error::format(format!(
            "<audio src={src:?}> ends before it begins"
        )));
    }
    if end == begin {
        log::debug!("Dropping zero-length clip on {src}");
        return Ok(None);
    }
    Ok(Some(AudioSegment::new(file, begin, end)))
}

fn clip_attr(
    smil: &Document,
    audio: NodeId,
    name: &str,
    alt: &str,
) -> Result<Option<std::time::Duration>> {
    smil.attr(audio, name)
        .or_else(|| smil.attr(audio, alt))
        .map(parse_clock_value)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::file_url;
    use std::time::Duration;
    use tempfile::TempDir;

    const NCC: &str = r#"<html><head><meta name="dc:title" content="Book"/></head><body>
<h1 id="h1"><a href="book.smil#t1">  One
  </a></h1>
<span class="page-normal" id="pg1"><a href="book.smil#t1b">1</a></span>
<h2 id="h2"><a href="book.smil#t2">Two</a></h2>
<h1 id="h3"><a href="book.smil#t3">Three</a></h1>
<h1 id="bad"><a href="book.smil#t4">Bad</a></h1>
<span class="page-normal" id="pg2"><a href="other.smil#x">2</a></span>
<p id="plain">not a heading</p>
</body></html>"#;

    const SMIL: &str = r#"<smil><body><seq>
<par id="p1" endsync="last"><text id="t1" src="content.html#c1"/><audio src="a.wav" clip-begin="npt=0.000s" clip-end="npt=1.200s"/></par>
<par id="p1b" endsync="last"><text id="t1b" src="content.html#c1-em"/><audio src="a.wav" clip-begin="npt=1.200s" clip-end="npt=3.400s"/><audio src="a.wav" clip-begin="npt=3.400s" clip-end="npt=3.400s"/></par>
<par id="p1c" endsync="last"><text id="t1c" src="content.html#c1-last"/><audio src="b.wav" clip-begin="npt=0.000s" clip-end="npt=0.500s"/></par>
<par id="p2" endsync="last"><text id="t2" src="ncc.html#h2"/><audio src="b.wav" clip-begin="npt=0.500s" clip-end="npt=1.000s"/></par>
<par id="p3" endsync="last"><text id="t3" src="ncc.html#h3"/><audio src="b.wav" clip-begin="npt=1.000s" clip-end="npt=2.000s"/></par>
<par id="p4" endsync="last"><text id="t4" src="ncc.html#bad"/><audio src="b.wav" clipBegin="2s" clipEnd="1s"/></par>
</seq></body></smil>"#;

    const CONTENT: &str = r#"<html><body>
<h1 id="c1">One</h1>
<p id="c1-p">Some <em id="c1-em">stressed</em> text.</p>
<div class="note">Between</div>
<p id="c1-last">Last</p>
</body></html>"#;

    fn book() -> (TempDir, DocumentStore, Url) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("ncc.html"), NCC).unwrap();
        std::fs::write(dir.path().join("book.smil"), SMIL).unwrap();
        std::fs::write(dir.path().join("content.html"), CONTENT).unwrap();
        let ncc = file_url(dir.path().join("ncc.html")).unwrap();
        (dir, DocumentStore::new(), ncc)
    }

    fn entry(store: &DocumentStore, ncc: &Url, id: &str) -> MergeEntry {
        let mut anchor = ncc.clone();
        anchor.set_fragment(Some(id));
        MergeEntry::with_store(anchor, store.clone()).unwrap()
    }

    #[test]
    fn test_anchor_requires_fragment() {
        let url = Url::parse("file:///book/ncc.html").unwrap();
        assert!(matches!(MergeEntry::new(url.clone()), Err(Error::Structural(_))));
        assert!(matches!(
            MergeEntry::new(url.join("#").unwrap()),
            Err(Error::Structural(_))
        ));
    }

    #[test]
    fn test_ncc_run_stops_at_next_heading() {
        let (_dir, store, ncc) = book();
        let one = entry(&store, &ncc, "h1");
        let doc = one.ncc().unwrap();
        let ids: Vec<_> = one
            .ncc_elements()
            .unwrap()
            .iter()
            .map(|&n| doc.element_id(n).unwrap())
            .collect();
        assert_eq!(ids, vec!["h1", "pg1"]);
        assert_eq!(one.title().unwrap(), "One");
        assert_eq!(one.source_level().unwrap(), 1);
    }

    #[test]
    fn test_smil_run_stops_at_next_heading_par() {
        let (_dir, store, ncc) = book();
        let one = entry(&store, &ncc, "h1");
        let smil = one.smil().unwrap();
        let ids: Vec<_> = one
            .smil_elements()
            .unwrap()
            .iter()
            .map(|&n| smil.element_id(n).unwrap())
            .collect();
        assert_eq!(ids, vec!["p1", "p1b", "p1c"]);

        let three = entry(&store, &ncc, "h3");
        let ids: Vec<_> = three
            .smil_elements()
            .unwrap()
            .iter()
            .map(|&n| smil.element_id(n).unwrap())
            .collect();
        assert_eq!(ids, vec!["p3"]);
    }

    #[test]
    fn test_text_elements_raise_inline_and_fill_gaps() {
        let (_dir, store, ncc) = book();
        let one = entry(&store, &ncc, "h1");
        let docs = one.content_documents().unwrap();
        assert_eq!(docs.len(), 1);
        let content = &docs[0].1;

        let blocks: Vec<String> = one
            .text_elements()
            .unwrap()
            .iter()
            .map(|t| {
                content
                    .element_id(t.node)
                    .map(str::to_string)
                    .unwrap_or_else(|| content.element_name(t.node).unwrap().to_string())
            })
            .collect();
        assert_eq!(blocks, vec!["c1", "c1-p", "div", "c1-last"]);
    }

    #[test]
    fn test_ncc_only_unit_has_no_text_elements() {
        let (_dir, store, ncc) = book();
        let two = entry(&store, &ncc, "h2");
        assert!(two.content_documents().unwrap().is_empty());
        assert!(two.text_elements().unwrap().is_empty());
    }

    #[test]
    fn test_audio_segments_coalesced_and_empty_dropped() {
        let (dir, store, ncc) = book();
        let one = entry(&store, &ncc, "h1");
        let a = file_url(dir.path().join("a.wav")).unwrap();
        let b = file_url(dir.path().join("b.wav")).unwrap();
        assert_eq!(
            one.audio_segments().unwrap(),
            &vec![
                AudioSegment::new(a, Duration::ZERO, Duration::from_millis(3_400)),
                AudioSegment::new(b, Duration::ZERO, Duration::from_millis(500)),
            ]
        );
    }

    #[test]
    fn test_smil_spanning_two_files_is_structural_error() {
        let (_dir, store, ncc) = book();
        let bad = entry(&store, &ncc, "bad");
        assert!(matches!(bad.smil(), Err(Error::Structural(_))));
    }

    #[test]
    fn test_inverted_clip_is_format_error() {
        let (dir, store, ncc) = book();
        // Drop the page span that points at a second SMIL file.
        let text = NCC.replace("other.smil#x", "book.smil#t4");
        std::fs::write(dir.path().join("ncc.html"), text).unwrap();
        let bad = entry(&store, &ncc, "bad");
        assert!(matches!(bad.audio_segments(), Err(Error::Format(_))));
    }

    #[test]
    fn test_anchor_to_non_heading_is_structural_error() {
        let (_dir, store, ncc) = book();
        let plain = entry(&store, &ncc, "plain");
        assert!(matches!(plain.ncc_elements(), Err(Error::Structural(_))));
        let missing = entry(&store, &ncc, "nope");
        assert!(matches!(missing.ncc(), Ok(_)));
        assert!(matches!(missing.ncc_elements(), Err(Error::Structural(_))));
    }
}

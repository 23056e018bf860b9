//! Cross-document reference resolution.
//!
//! DTB documents point at each other with relative hrefs such as
//! `chapter1.smil#par_12` or `content.html#p3`. A reference resolves when its
//! document identity (the absolute URI without query or fragment) matches the
//! target document and the fragment names an element id there.

use percent_encoding::percent_decode_str;
use url::Url;

use super::arena::{Document, NodeId};

/// An href joined against its base and split into document + fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Document identity: absolute URI with query and fragment removed.
    pub document: Url,
    /// Fragment without the leading `#`; empty when the href had none.
    pub fragment: String,
}

/// Strip query and fragment from a URI.
pub fn document_identity(url: &Url) -> Url {
    let mut identity = url.clone();
    identity.set_query(None);
    identity.set_fragment(None);
    identity
}

/// Join `href` against `base`. Returns `None` when the href cannot be parsed.
pub fn resolve_reference(base: &Url, href: &str) -> Option<Reference> {
    let joined = base.join(href.trim()).ok()?;
    let fragment = joined.fragment().unwrap_or_default().to_string();
    Some(Reference {
        document: document_identity(&joined),
        fragment,
    })
}

impl Reference {
    /// Whether this reference points into the document identified by `doc`.
    pub fn points_into(&self, doc: &Url) -> bool {
        self.document == document_identity(doc)
    }

    /// Resolve against a parsed target document.
    ///
    /// Absence is a valid outcome here: the document identity may differ, the
    /// fragment may be empty, or no element may carry that id. Callers decide
    /// whether that is an error.
    pub fn resolve_in(&self, target: &Document) -> Option<NodeId> {
        let base = target.base_uri()?;
        if self.fragment.is_empty() || !self.points_into(base) {
            return None;
        }
        target.get_by_id(&self.fragment)
    }
}

/// Last path segment of a URI, percent-decoded.
pub fn file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
        .unwrap_or_default()
}

/// Lowercased extension of a URI's file name, without the dot.
pub fn extension(url: &Url) -> Option<String> {
    let name = file_name(url);
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_str;

    fn base() -> Url {
        Url::parse("file:///books/one/ncc.html").unwrap()
    }

    #[test]
    fn test_resolve_relative_with_fragment() {
        let r = resolve_reference(&base(), "part1.smil#par_3").unwrap();
        assert_eq!(r.document.as_str(), "file:///books/one/part1.smil");
        assert_eq!(r.fragment, "par_3");
    }

    #[test]
    fn test_identity_ignores_query() {
        let r = resolve_reference(&base(), "part1.smil?v=2#x").unwrap();
        assert_eq!(r.document.as_str(), "file:///books/one/part1.smil");
        let doc_url = Url::parse("file:///books/one/part1.smil?other").unwrap();
        assert!(r.points_into(&doc_url));
    }

    #[test]
    fn test_resolve_in_requires_matching_document() {
        let smil_url = Url::parse("file:///books/one/part1.smil").unwrap();
        let doc = parse_str(r#"<smil><par id="p"/></smil>"#, Some(smil_url)).unwrap();

        let hit = resolve_reference(&base(), "part1.smil#p").unwrap();
        assert!(hit.resolve_in(&doc).is_some());

        let other = resolve_reference(&base(), "part2.smil#p").unwrap();
        assert!(other.resolve_in(&doc).is_none());

        let no_fragment = resolve_reference(&base(), "part1.smil").unwrap();
        assert!(no_fragment.resolve_in(&doc).is_none());

        let missing = resolve_reference(&base(), "part1.smil#nope").unwrap();
        assert!(missing.resolve_in(&doc).is_none());
    }

    #[test]
    fn test_file_name_and_extension() {
        let url = Url::parse("file:///a/b/My%20Audio.MP3").unwrap();
        assert_eq!(file_name(&url), "My Audio.MP3");
        assert_eq!(extension(&url).as_deref(), Some("mp3"));
        assert_eq!(extension(&Url::parse("file:///a/noext").unwrap()), None);
    }
}

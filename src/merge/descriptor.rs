//! Macro descriptors: a persisted selection of headings from one or more
//! source DTBs.
//!
//! ```xml
//! <Macro name="Anthology">
//!   <Section file="book1/ncc.html" ItemID="h1_0001">
//!     <Section file="book1/ncc.html" ItemID="h2_0004"/>
//!   </Section>
//!   <Section file="book2/ncc.html" Skip="1"/>
//! </Macro>
//! ```
//!
//! A `Section` with an `ItemID` selects one heading. Without one it selects
//! every top-level heading of the NCC, minus the first `Skip`. Nested sections
//! become children of the last entry their parent produced.

use std::path::Path;

use url::Url;

use super::{MergeEntry, forest_from_ncc};
use crate::dom::{Document, NodeId, parse_bytes, parse_str};
use crate::error::{Error, Result};
use crate::store::{DocumentStore, file_url};

/// One `<Section>` of a macro descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Source NCC, resolved against the descriptor's location.
    pub ncc: Url,
    /// Heading id; `None` selects the NCC's top-level headings.
    pub item_id: Option<String>,
    /// Leading top-level headings to drop when `item_id` is `None`.
    pub skip: usize,
    pub children: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDescriptor {
    pub name: Option<String>,
    pub sections: Vec<Section>,
}

impl MacroDescriptor {
    /// Read a descriptor file. Relative `file` attributes resolve against it.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let base = file_url(path)?;
        let doc = parse_bytes(&bytes, Some(base.clone()))?;
        Self::from_document(&doc, &base)
    }

    /// Parse descriptor text, resolving `file` attributes against `base`.
    pub fn parse(text: &str, base: &Url) -> Result<Self> {
        let doc = parse_str(text, Some(base.clone()))?;
        Self::from_document(&doc, base)
    }

    fn from_document(doc: &Document, base: &Url) -> Result<Self> {
        let root = doc
            .element_children(doc.root())
            .next()
            .ok_or_else(|| Error::structural("empty macro descriptor"))?;
        if doc.element_name(root) != Some("Macro") {
            return Err(Error::structural(format!(
                "expected <Macro> root, found <{}>",
                doc.element_name(root).unwrap_or_default()
            )));
        }
        Ok(Self {
            name: doc.attr(root, "name").map(str::to_string),
            sections: sections(doc, root, base)?,
        })
    }

    /// Build the merge forest this descriptor selects, sharing `store`.
    pub fn into_forest(&self, store: &DocumentStore) -> Result<Vec<MergeEntry>> {
        let mut forest = Vec::new();
        for section in &self.sections {
            append_section(section, store, &mut forest)?;
        }
        Ok(forest)
    }
}

fn sections(doc: &Document, parent: NodeId, base: &Url) -> Result<Vec<Section>> {
    let mut out = Vec::new();
    for node in doc.element_children(parent) {
        if doc.element_name(node) != Some("Section") {
            continue;
        }
        let file = doc
            .attr(node, "file")
            .ok_or_else(|| Error::structural("<Section> without file attribute"))?;
        let mut ncc = base.join(file)?;
        ncc.set_fragment(None);

        let item_id = doc
            .attr(node, "ItemID")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        let skip = match doc.attr(node, "Skip").map(str::trim) {
            None | Some("") => 0,
            Some(value) => value
                .parse()
                .map_err(|_| Error::format(format!("invalid Skip value {value:?}")))?,
        };

        out.push(Section {
            ncc,
            item_id,
            skip,
            children: sections(doc, node, base)?,
        });
    }
    Ok(out)
}

fn append_section(
    section: &Section,
    store: &DocumentStore,
    siblings: &mut Vec<MergeEntry>,
) -> Result<()> {
    let before = siblings.len();
    match &section.item_id {
        Some(id) => {
            let mut anchor = section.ncc.clone();
            anchor.set_fragment(Some(id.as_str()));
            siblings.push(MergeEntry::with_store(anchor, store.clone())?);
        }
        None => {
            let forest = forest_from_ncc(&section.ncc, store)?;
            siblings.extend(forest.into_iter().skip(section.skip));
        }
    }

    if section.children.is_empty() {
        return Ok(());
    }
    if siblings.len() == before {
        log::warn!(
            "Section {} produced no entries; dropping its {} nested section(s)",
            section.ncc,
            section.children.len()
        );
        return Ok(());
    }
    if let Some(last) = siblings.last_mut() {
        for child in &section.children {
            append_section(child, store, &mut last.children)?;
        }
    }
    Ok(())
}

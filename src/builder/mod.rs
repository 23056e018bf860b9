//! Merging a forest of [`MergeEntry`] trees into one DTB.
//!
//! [`DtbBuilder::build`] walks the flattened forest and, for every unit,
//! clones its NCC, content and SMIL runs into fresh output documents,
//! renumbers ids, rewrites cross-references, retimes audio clips against a
//! per-unit audio file, and records which source windows that file must hold.
//! [`DtbBuilder::save`] then writes the documents, assembles the audio and
//! copies images.
//!
//! All per-build state lives in one value that is only installed once the
//! build completes, so a cancelled or failed build leaves the builder empty.

mod metadata;
mod normalize;
mod save;
mod unit;

use std::time::Duration;

use url::Url;

use crate::audio::AudioSegment;
use crate::config::BuildOptions;
use crate::dom::{Document, parse_str};
use crate::error::{Error, Result};
use crate::merge::{MergeEntry, flatten};
use crate::progress::{Progress, percent};

const XHTML_TEMPLATE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Transitional//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd">
<html xmlns="http://www.w3.org/1999/xhtml"><head>
<meta http-equiv="Content-type" content="text/html; charset=utf-8"/>
</head><body>
</body></html>"#;

const SMIL_TEMPLATE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE smil PUBLIC "-//W3C//DTD SMIL 1.0//EN" "http://www.w3.org/TR/REC-smil/SMIL10.dtd">
<smil><head><meta name="dc:format" content="Daisy 2.02"/><layout><region id="txtView"/></layout></head><body><seq dur="0.000s"></seq></body></smil>"#;

/// DAISY 2.02 multimedia type of the output book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub enum MultimediaType {
    /// Audio with NCC navigation only.
    AudioNcc,
    /// Audio with a synchronized full-text content document.
    AudioFullText,
}

impl MultimediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MultimediaType::AudioNcc => "audioNCC",
            MultimediaType::AudioFullText => "audioFullText",
        }
    }
}

/// An image the saved book must contain, copied from `source` to `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCopy {
    pub name: String,
    pub source: Url,
}

/// Summary of a completed build.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct BuildReport {
    pub prefix: String,
    pub units: usize,
    pub smil_files: usize,
    pub audio_files: usize,
    pub images: usize,
    pub toc_items: usize,
    pub depth: usize,
    pub total_time: Duration,
    pub multimedia_type: MultimediaType,
}

/// Everything produced by one build.
#[derive(Debug)]
struct BuildState {
    prefix: String,
    ncc: Document,
    content: Option<Document>,
    smils: Vec<(String, Document)>,
    audio_plan: Vec<(String, Vec<AudioSegment>)>,
    image_plan: Vec<Vec<ImageCopy>>,
    next_ncc_id: usize,
    next_text_id: usize,
    total_elapsed: Duration,
    toc_items: usize,
    max_depth: usize,
    has_text: bool,
}

impl BuildState {
    fn new(prefix: String) -> Result<Self> {
        Ok(Self {
            prefix,
            ncc: parse_str(XHTML_TEMPLATE, None)?,
            content: None,
            smils: Vec::new(),
            audio_plan: Vec::new(),
            image_plan: Vec::new(),
            next_ncc_id: 0,
            next_text_id: 0,
            total_elapsed: Duration::ZERO,
            toc_items: 0,
            max_depth: 0,
            has_text: false,
        })
    }

    fn next_ncc_id(&mut self) -> String {
        let id = format!("NCCID{:05}", self.next_ncc_id);
        self.next_ncc_id += 1;
        id
    }

    fn next_text_id(&mut self) -> String {
        let id = format!("TEXTID{:05}", self.next_text_id);
        self.next_text_id += 1;
        id
    }

    /// The shared content document, created on first use.
    fn content_mut(&mut self) -> Result<&mut Document> {
        if self.content.is_none() {
            self.content = Some(parse_str(XHTML_TEMPLATE, None)?);
        }
        self.content
            .as_mut()
            .ok_or_else(|| Error::structural("content document unavailable"))
    }

    fn multimedia_type(&self) -> MultimediaType {
        if self.has_text {
            MultimediaType::AudioFullText
        } else {
            MultimediaType::AudioNcc
        }
    }
}

/// Builds a single DTB out of a forest of merge entries.
///
/// ```no_run
/// use dtbmerge::{BuildOptions, DtbBuilder, DocumentStore, forest_from_ncc, file_url};
/// use dtbmerge::progress::Silent;
///
/// let store = DocumentStore::new();
/// let forest = forest_from_ncc(&file_url("book/ncc.html")?, &store)?;
/// let mut builder = DtbBuilder::new(forest, BuildOptions::default());
/// if builder.build(&mut Silent)? {
///     builder.save("out".as_ref(), &mut Silent)?;
/// }
/// # Ok::<(), dtbmerge::Error>(())
/// ```
#[derive(Debug)]
pub struct DtbBuilder {
    entries: Vec<MergeEntry>,
    options: BuildOptions,
    state: Option<BuildState>,
}

impl DtbBuilder {
    pub fn new(entries: Vec<MergeEntry>, options: BuildOptions) -> Self {
        Self {
            entries,
            options,
            state: None,
        }
    }

    pub fn merge_entries(&self) -> &[MergeEntry] {
        &self.entries
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Build the output documents and audio plan.
    ///
    /// Returns `Ok(false)` when `progress` cancels; the builder is then left
    /// without build state, as it is after an error.
    pub fn build(&mut self, progress: &mut dyn Progress) -> Result<bool> {
        self.state = None;
        if self.entries.is_empty() {
            return Err(Error::Configuration("no merge entries to build".into()));
        }

        let mut state = BuildState::new(self.options.prefix.generate())?;
        let flat = flatten(&self.entries);
        log::info!(
            "Building {} unit(s) with prefix {:?}",
            flat.len(),
            state.prefix
        );

        for (i, item) in flat.iter().enumerate() {
            let message = format!("Merging {}", item.entry.source_anchor());
            if progress.report(percent(i, flat.len()), &message).is_cancel() {
                log::info!("Build cancelled at unit {i}");
                return Ok(false);
            }
            unit::add_unit(&mut state, &self.options, i, *item)?;
        }

        metadata::copy_head(&mut state, flat[0].entry)?;
        metadata::write_aggregate(&mut state, &self.options);
        normalize::normalize_state(&mut state);

        log::info!(
            "Built {} unit(s), total time {}",
            flat.len(),
            crate::time::format_hms_millis(state.total_elapsed)
        );
        self.state = Some(state);
        Ok(true)
    }

    pub fn is_built(&self) -> bool {
        self.state.is_some()
    }

    pub fn ncc_document(&self) -> Option<&Document> {
        self.state.as_ref().map(|s| &s.ncc)
    }

    pub fn content_document(&self) -> Option<&Document> {
        self.state.as_ref().and_then(|s| s.content.as_ref())
    }

    /// Generated SMIL documents with their file names, in unit order.
    pub fn smil_documents(&self) -> &[(String, Document)] {
        self.state.as_ref().map_or(&[], |s| s.smils.as_slice())
    }

    /// Source windows each generated audio file must hold.
    pub fn audio_plan(&self) -> &[(String, Vec<AudioSegment>)] {
        self.state.as_ref().map_or(&[], |s| s.audio_plan.as_slice())
    }

    /// Images to copy, grouped by unit.
    pub fn image_plan(&self) -> &[Vec<ImageCopy>] {
        self.state.as_ref().map_or(&[], |s| s.image_plan.as_slice())
    }

    pub fn total_elapsed_time(&self) -> Duration {
        self.state
            .as_ref()
            .map_or(Duration::ZERO, |s| s.total_elapsed)
    }

    /// File-name prefix of the last completed build.
    pub fn prefix(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.prefix.as_str())
    }

    pub fn report(&self) -> Option<BuildReport> {
        let state = self.state.as_ref()?;
        Some(BuildReport {
            prefix: state.prefix.clone(),
            units: state.smils.len(),
            smil_files: state.smils.len(),
            audio_files: state.audio_plan.len(),
            images: state.image_plan.iter().map(Vec::len).sum(),
            toc_items: state.toc_items,
            depth: state.max_depth,
            total_time: state.total_elapsed,
            multimedia_type: state.multimedia_type(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Silent;

    #[test]
    fn test_empty_forest_is_configuration_error() {
        let mut builder = DtbBuilder::new(Vec::new(), BuildOptions::default());
        assert!(matches!(
            builder.build(&mut Silent),
            Err(Error::Configuration(_))
        ));
        assert!(builder.ncc_document().is_none());
    }

    #[test]
    fn test_templates_parse() {
        let ncc = parse_str(XHTML_TEMPLATE, None).unwrap();
        assert!(ncc.head().is_some());
        assert!(ncc.body().is_some());

        let smil = parse_str(SMIL_TEMPLATE, None).unwrap();
        assert_eq!(smil.meta_content("dc:format"), Some("Daisy 2.02"));
        assert!(smil.find_by_tag("seq").is_some());
        assert!(smil.find_by_tag("region").is_some());
    }

    #[test]
    fn test_sequential_ids() {
        let mut state = BuildState::new("ab".into()).unwrap();
        assert_eq!(state.next_ncc_id(), "NCCID00000");
        assert_eq!(state.next_ncc_id(), "NCCID00001");
        assert_eq!(state.next_text_id(), "TEXTID00000");
        assert!(state.content.is_none());
        state.content_mut().unwrap();
        assert!(state.content.is_some());
        assert_eq!(state.multimedia_type().as_str(), "audioNCC");
    }
}

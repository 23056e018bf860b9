//! Cloning and rewriting one merge unit into the output documents.

use std::collections::HashMap;
use std::time::Duration;

use url::Url;

use super::{BuildState, ImageCopy, SMIL_TEMPLATE};
use crate::audio::AudioContainer;
use crate::config::BuildOptions;
use crate::dom::{Document, NodeId, document_identity, parse_str, resolve_reference, uri};
use crate::error::{Error, Result};
use crate::merge::FlatEntry;
use crate::time::{format_hms_millis, format_npt, format_seconds, parse_clock_value};

/// Old `(document, id)` to the id it was given in the output.
type IdMap = HashMap<(Url, String), String>;

/// Output heading tag for a nesting depth.
pub(super) fn heading_tag(depth: usize) -> String {
    format!("h{}", depth.clamp(1, 6))
}

pub(super) fn smil_name(prefix: &str, index: usize) -> String {
    format!("{prefix}{index:05}.smil")
}

pub(super) fn audio_name(prefix: &str, index: usize, ext: &str) -> String {
    format!("{prefix}{index:05}.{ext}")
}

pub(super) fn image_name(prefix: &str, index: usize, k: usize, ext: &str) -> String {
    format!("{prefix}{index:05}_{k:02}.{ext}")
}

pub(super) fn add_unit(
    state: &mut BuildState,
    options: &BuildOptions,
    index: usize,
    item: FlatEntry<'_>,
) -> Result<()> {
    let entry = item.entry;
    let ncc_src = entry.ncc()?;
    let smil_src = entry.smil()?;
    let ncc_run = entry.ncc_elements()?;
    let smil_run = entry.smil_elements()?;
    let text_run = entry.text_elements()?;
    let segments = entry.audio_segments()?;

    let ncc_uri = entry.ncc_uri();
    let smil_uri = smil_src
        .base_uri()
        .map(document_identity)
        .ok_or_else(|| Error::structural("SMIL document has no base URI"))?;
    let smil_file = smil_name(&state.prefix, index);
    log::debug!(
        "Unit {index}: {} ({} NCC, {} par, {} text element(s))",
        entry.source_anchor(),
        ncc_run.len(),
        smil_run.len(),
        text_run.len()
    );

    let mut ids = IdMap::new();

    // NCC run
    let mut ncc_nodes = Vec::with_capacity(ncc_run.len());
    for &element in ncc_run {
        let copy = state.ncc.import_subtree(ncc_src, element);
        ncc_nodes.push(copy);
    }
    // Every run element gets an id; nested elements only keep theirs.
    for &copy in &ncc_nodes {
        for node in state.ncc.descendants(copy) {
            let old = state.ncc.element_id(node).map(str::to_string);
            if old.is_none() && node != copy {
                continue;
            }
            let new = state.next_ncc_id();
            state.ncc.set_attr(node, "id", &new);
            if let Some(old) = old {
                ids.insert((ncc_uri.clone(), old), new);
            }
        }
    }

    // Content run
    let mut content_nodes = Vec::with_capacity(text_run.len());
    for element in text_run {
        let source = entry.content_document(&element.document)?.ok_or_else(|| {
            Error::structural(format!("content document {} not loaded", element.document))
        })?;
        let content = state.content_mut()?;
        content_nodes.push(content.import_subtree(source, element.node));
    }
    let content_ids: Vec<(NodeId, Option<String>)> = match &state.content {
        Some(content) => content_nodes
            .iter()
            .flat_map(|&copy| {
                content.descendants(copy).into_iter().filter_map(move |node| {
                    let old = content.element_id(node).map(str::to_string);
                    (old.is_some() || node == copy).then_some((node, old))
                })
            })
            .collect(),
        None => Vec::new(),
    };
    for (node, old) in content_ids {
        let new = state.next_text_id();
        let content = state.content_mut()?;
        content.set_attr(node, "id", &new);
        if let Some(old) = old {
            let origin = content
                .base_uri_of(node)
                .map(document_identity)
                .ok_or_else(|| Error::structural("content element has no base URI"))?;
            ids.insert((origin, old), new);
        }
    }

    // SMIL
    let mut smil = parse_str(SMIL_TEMPLATE, None)?;
    let seq = smil
        .find_by_tag("seq")
        .ok_or_else(|| Error::structural("SMIL template has no <seq>"))?;
    let mut pars = Vec::with_capacity(smil_run.len());
    for &par in smil_run {
        let copy = smil.import_subtree(smil_src, par);
        smil.append(seq, copy);
        pars.push(copy);
    }
    rewrite_text_sources(&mut smil, &pars, &ids, &ncc_uri, options);

    // Links back into the unit's own SMIL file
    rewrite_smil_links(&mut state.ncc, &ncc_nodes, &smil_uri, &smil_file);
    if let Some(content) = state.content.as_mut() {
        rewrite_smil_links(content, &content_nodes, &smil_uri, &smil_file);
    }

    // Heading rank
    let tag = heading_tag(item.depth);
    if let Some(&heading) = ncc_nodes.first() {
        state.ncc.set_element_name(heading, &tag);
    }
    if let Some(content) = state.content.as_mut() {
        let heading = content_nodes
            .iter()
            .flat_map(|&copy| content.descendants(copy))
            .find(|&n| content.heading_level(n).is_some());
        if let Some(heading) = heading {
            content.set_element_name(heading, &tag);
        }
    }

    // Append runs
    let ncc_body = state
        .ncc
        .body()
        .ok_or_else(|| Error::structural("output NCC has no <body>"))?;
    for copy in ncc_nodes {
        state.ncc.append(ncc_body, copy);
        state.ncc.append_text(ncc_body, "\n");
    }
    let mut images = Vec::new();
    if !content_nodes.is_empty() {
        let prefix = state.prefix.clone();
        let content = state.content_mut()?;
        let body = content
            .body()
            .ok_or_else(|| Error::structural("output content document has no <body>"))?;
        for &copy in &content_nodes {
            rename_images(content, copy, &prefix, index, &mut images)?;
            content.append(body, copy);
            content.append_text(body, "\n");
        }
    }
    state.image_plan.push(images);

    // Audio
    let (unit_time, audio_file) = retime_audio(&mut smil, &pars, &state.prefix, index)?;
    if let Some(identifier) = ncc_src.meta_content("dc:identifier") {
        smil.set_meta("dc:identifier", identifier);
    }
    if let Some(title) = ncc_src.meta_content("dc:title") {
        smil.set_meta("dc:title", title);
    }
    smil.set_meta("ncc:generator", &options.generator);
    smil.set_meta("ncc:totalElapsedTime", &format_hms_millis(state.total_elapsed));
    smil.set_meta("ncc:timeInThisSmil", &format_hms_millis(unit_time));
    smil.set_attr(seq, "dur", &format_seconds(unit_time));
    state.total_elapsed += unit_time;

    if let Some(name) = audio_file
        && !segments.is_empty()
    {
        state.audio_plan.push((name, segments.clone()));
    }
    state.smils.push((smil_file, smil));

    state.toc_items += ncc_run.len();
    state.max_depth = state.max_depth.max(item.depth);
    state.has_text |= !text_run.is_empty();
    Ok(())
}

/// Point `<text src>` at the renumbered NCC/content elements.
fn rewrite_text_sources(
    smil: &mut Document,
    pars: &[NodeId],
    ids: &IdMap,
    ncc_uri: &Url,
    options: &BuildOptions,
) {
    let texts: Vec<NodeId> = pars
        .iter()
        .flat_map(|&par| smil.descendants_named(par, "text"))
        .collect();
    for text in texts {
        let Some(src) = smil.attr(text, "src") else {
            continue;
        };
        let Some(reference) = smil
            .base_uri_of(text)
            .and_then(|base| resolve_reference(base, src))
        else {
            log::warn!("Leaving unresolvable <text src={src:?}> unchanged");
            continue;
        };
        let key = (reference.document, reference.fragment);
        let Some(new) = ids.get(&key) else {
            log::warn!(
                "<text src={src:?}> points outside its unit; left unchanged"
            );
            continue;
        };
        let name = if key.0 == *ncc_uri {
            &options.ncc_name
        } else {
            &options.content_name
        };
        let rewritten = format!("{name}#{new}");
        smil.set_attr(text, "src", &rewritten);
    }
}

/// Point `<a href>` links into the unit's source SMIL at its generated SMIL.
fn rewrite_smil_links(doc: &mut Document, roots: &[NodeId], smil_uri: &Url, smil_file: &str) {
    let anchors: Vec<NodeId> = roots
        .iter()
        .flat_map(|&root| doc.descendants_named(root, "a"))
        .collect();
    for anchor in anchors {
        let Some(reference) = doc
            .attr(anchor, "href")
            .zip(doc.base_uri_of(anchor))
            .and_then(|(href, base)| resolve_reference(base, href))
        else {
            continue;
        };
        if reference.document == *smil_uri {
            let href = if reference.fragment.is_empty() {
                smil_file.to_string()
            } else {
                format!("{smil_file}#{}", reference.fragment)
            };
            doc.set_attr(anchor, "href", &href);
        }
    }
}

/// Give each distinct image under `root` a per-unit name and record the copy.
fn rename_images(
    doc: &mut Document,
    root: NodeId,
    prefix: &str,
    index: usize,
    images: &mut Vec<ImageCopy>,
) -> Result<()> {
    for img in doc.descendants_named(root, "img") {
        let Some(src) = doc.attr(img, "src").map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };
        let base = doc
            .base_uri_of(img)
            .ok_or_else(|| Error::structural("image has no base URI"))?;
        let source = document_identity(&base.join(src)?);

        let name = match images.iter().find(|i| i.source == source) {
            Some(existing) => existing.name.clone(),
            None => {
                let ext = uri::extension(&source).unwrap_or_else(|| "img".to_string());
                let name = image_name(prefix, index, images.len(), &ext);
                images.push(ImageCopy {
                    name: name.clone(),
                    source,
                });
                name
            }
        };
        doc.set_attr(img, "src", &name);
    }
    Ok(())
}

/// Point every `<audio>` at the unit's audio file and shift its clip to a
/// running zero-based offset. Returns the summed clip durations and the audio
/// file name, if the unit has any audio.
fn retime_audio(
    smil: &mut Document,
    pars: &[NodeId],
    prefix: &str,
    index: usize,
) -> Result<(Duration, Option<String>)> {
    let audios: Vec<NodeId> = pars
        .iter()
        .flat_map(|&par| smil.descendants_named(par, "audio"))
        .collect();

    let mut destination: Option<String> = None;
    let mut offset = Duration::ZERO;
    for audio in audios {
        let src = smil
            .attr(audio, "src")
            .ok_or_else(|| Error::structural("<audio> without src"))?;
        let name = match &destination {
            Some(name) => name.clone(),
            None => {
                let base = smil
                    .base_uri_of(audio)
                    .ok_or_else(|| Error::structural("SMIL document has no base URI"))?;
                let ext = AudioContainer::from_url(&base.join(src)?)?.extension();
                let name = audio_name(prefix, index, ext);
                destination = Some(name.clone());
                name
            }
        };

        let begin_attr = clip_attr_name(smil, audio, "clip-begin", "clipBegin");
        let end_attr = clip_attr_name(smil, audio, "clip-end", "clipEnd");
        let begin = required_clock(smil, audio, begin_attr)?;
        let end = required_clock(smil, audio, end_attr)?;
        let length = end.checked_sub(begin).ok_or_else(|| {
            Error::format(format!("<audio src={src:?}> ends before it begins"))
        })?;

        smil.set_attr(audio, "src", &name);
        smil.set_attr(audio, begin_attr, &format_npt(offset));
        offset += length;
        smil.set_attr(audio, end_attr, &format_npt(offset));
    }
    Ok((offset, destination))
}

/// The spelling of a clip attribute present on `audio`, preferring `primary`.
fn clip_attr_name(
    smil: &Document,
    audio: NodeId,
    primary: &'static str,
    alt: &'static str,
) -> &'static str {
    if smil.attr(audio, primary).is_none() && smil.attr(audio, alt).is_some() {
        alt
    } else {
        primary
    }
}

fn required_clock(smil: &Document, audio: NodeId, attr: &str) -> Result<Duration> {
    let value = smil
        .attr(audio, attr)
        .ok_or_else(|| Error::format(format!("<audio> lacks {attr}")))?;
    parse_clock_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_tag_clamps() {
        assert_eq!(heading_tag(1), "h1");
        assert_eq!(heading_tag(6), "h6");
        assert_eq!(heading_tag(9), "h6");
        assert_eq!(heading_tag(0), "h1");
    }

    #[test]
    fn test_generated_names() {
        assert_eq!(smil_name("qx", 3), "qx00003.smil");
        assert_eq!(audio_name("qx", 12, "mp3"), "qx00012.mp3");
        assert_eq!(image_name("qx", 3, 1, "jpg"), "qx00003_01.jpg");
    }

    #[test]
    fn test_retime_audio_shifts_to_zero() {
        let base = Url::parse("file:///book/a.smil").unwrap();
        let mut smil = parse_str(
            r#"<smil><body><seq>
<par id="p1"><audio src="x.wav" clip-begin="npt=10.000s" clip-end="npt=12.500s"/></par>
<par id="p2"><audio src="x.wav" clipBegin="npt=12.500s" clipEnd="npt=13.000s"/></par>
</seq></body></smil>"#,
            Some(base),
        )
        .unwrap();
        let pars = vec![smil.get_by_id("p1").unwrap(), smil.get_by_id("p2").unwrap()];

        let (total, name) = retime_audio(&mut smil, &pars, "ab", 7).unwrap();
        assert_eq!(total, Duration::from_millis(3_000));
        assert_eq!(name.as_deref(), Some("ab00007.wav"));

        let audios = smil.descendants_named(smil.root(), "audio");
        assert_eq!(smil.attr(audios[0], "src"), Some("ab00007.wav"));
        assert_eq!(smil.attr(audios[0], "clip-begin"), Some("npt=0.000s"));
        assert_eq!(smil.attr(audios[0], "clip-end"), Some("npt=2.500s"));
        assert_eq!(smil.attr(audios[1], "clipBegin"), Some("npt=2.500s"));
        assert_eq!(smil.attr(audios[1], "clipEnd"), Some("npt=3.000s"));
    }

    #[test]
    fn test_rewrite_smil_links_keeps_fragment() {
        let base = Url::parse("file:///book/ncc.html").unwrap();
        let doc_src = parse_str(
            r#"<html><body><h1 id="h"><a href="a.smil#t1">A</a> <a href="other.smil#x">B</a></h1></body></html>"#,
            Some(base),
        )
        .unwrap();
        let mut out = Document::new(None);
        let h = doc_src.get_by_id("h").unwrap();
        let copy = out.import_subtree(&doc_src, h);
        out.append(out.root(), copy);

        let smil_uri = Url::parse("file:///book/a.smil").unwrap();
        rewrite_smil_links(&mut out, &[copy], &smil_uri, "zz00000.smil");
        let anchors = out.descendants_named(copy, "a");
        assert_eq!(out.attr(anchors[0], "href"), Some("zz00000.smil#t1"));
        assert_eq!(out.attr(anchors[1], "href"), Some("other.smil#x"));
    }

    #[test]
    fn test_rewrite_smil_links_without_fragment() {
        let base = Url::parse("file:///book/ncc.html").unwrap();
        let doc_src = parse_str(
            r#"<html><body><h1 id="h"><a href="a.smil">A</a></h1></body></html>"#,
            Some(base),
        )
        .unwrap();
        let mut out = Document::new(None);
        let copy = out.import_subtree(&doc_src, doc_src.get_by_id("h").unwrap());
        out.append(out.root(), copy);

        let smil_uri = Url::parse("file:///book/a.smil").unwrap();
        rewrite_smil_links(&mut out, &[copy], &smil_uri, "zz00000.smil");
        let anchors = out.descendants_named(copy, "a");
        assert_eq!(out.attr(anchors[0], "href"), Some("zz00000.smil"));
    }
}

//! Synthetic DTB fixtures shared by the integration tests.

#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::Path;

use dtbmerge::file_url;
use url::Url;

pub const RATE: u32 = 8_000;

/// A window of a source WAV file played by one `<audio>` element.
#[derive(Debug, Clone, Copy)]
pub struct Clip {
    pub file: &'static str,
    pub begin_ms: u64,
    pub end_ms: u64,
}

pub fn clip(file: &'static str, begin_ms: u64, end_ms: u64) -> Clip {
    Clip {
        file,
        begin_ms,
        end_ms,
    }
}

/// One heading of a fixture book.
#[derive(Debug, Clone)]
pub struct Heading {
    pub level: u8,
    pub title: &'static str,
    /// Clips, one per par: the heading par first, then one per paragraph.
    /// Extra clips all go to the last par.
    pub clips: Vec<Clip>,
    /// Content paragraphs (full-text books only).
    pub paragraphs: usize,
    /// Page markers following the heading in the NCC.
    pub pages: usize,
    /// Images placed in the first paragraph.
    pub images: Vec<&'static str>,
}

pub fn heading(level: u8, title: &'static str, clips: Vec<Clip>) -> Heading {
    Heading {
        level,
        title,
        clips,
        paragraphs: 0,
        pages: 0,
        images: Vec::new(),
    }
}

impl Heading {
    pub fn with_paragraphs(mut self, n: usize) -> Self {
        self.paragraphs = n;
        self
    }

    pub fn with_pages(mut self, n: usize) -> Self {
        self.pages = n;
        self
    }

    pub fn with_image(mut self, name: &'static str) -> Self {
        self.images.push(name);
        self
    }
}

/// Mono 16-bit WAV of `seconds` at `rate`.
pub fn write_wav(path: &Path, rate: u32, seconds: f64) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (f64::from(rate) * seconds).round() as u32;
    for i in 0..frames {
        writer.write_sample((i % 1000) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

fn npt(ms: u64) -> String {
    format!("npt={}.{:03}s", ms / 1000, ms % 1000)
}

/// Write `ncc.html`, `book.smil` and (for full-text books) `content.html`
/// into `dir`. Headings get ids `h0`, `h1`, ...; their SMIL text elements
/// `t0`, `t1`, .... Returns the NCC URI.
pub fn write_book(dir: &Path, title: &str, headings: &[Heading], full_text: bool) -> Url {
    std::fs::create_dir_all(dir).unwrap();

    let mut ncc = String::new();
    let mut smil = String::new();
    let mut content = String::new();

    writeln!(
        ncc,
        r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head>
<meta http-equiv="Content-type" content="text/html; charset=utf-8"/>
<title>{title}</title>
<meta name="dc:title" content="{title}"/>
<meta name="dc:identifier" content="id-{title}"/>
<meta name="ncc:totalTime" content="99:99:99"/>
</head><body>"#
    )
    .unwrap();
    smil.push_str("<smil><head><meta name=\"dc:format\" content=\"Daisy 2.02\"/></head><body><seq dur=\"0s\">\n");
    content.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>{title}</title></head><body>\n"
    ));

    for (k, h) in headings.iter().enumerate() {
        let tag = format!("h{}", h.level);
        writeln!(
            ncc,
            r#"<{tag} id="h{k}"><a href="book.smil#t{k}">{}</a></{tag}>"#,
            h.title
        )
        .unwrap();
        for page in 0..h.pages {
            writeln!(
                ncc,
                r#"<span class="page-normal" id="pg{k}_{page}"><a href="book.smil#t{k}">{}</a></span>"#,
                page + 1
            )
            .unwrap();
        }

        let pars = 1 + if full_text { h.paragraphs } else { 0 };
        let mut par_audio = vec![String::new(); pars];
        for (i, c) in h.clips.iter().enumerate() {
            let slot = i.min(pars - 1);
            write!(
                par_audio[slot],
                r#"<audio src="{}" clip-begin="{}" clip-end="{}"/>"#,
                c.file,
                npt(c.begin_ms),
                npt(c.end_ms)
            )
            .unwrap();
        }

        let heading_target = if full_text {
            format!("content.html#c{k}")
        } else {
            format!("ncc.html#h{k}")
        };
        writeln!(
            smil,
            r#"<par id="p{k}" endsync="last"><text id="t{k}" src="{heading_target}"/>{}</par>"#,
            par_audio[0]
        )
        .unwrap();

        if full_text {
            writeln!(content, r#"<{tag} id="c{k}">{}</{tag}>"#, h.title).unwrap();
            for j in 1..=h.paragraphs {
                let image: String = match j {
                    1 => h
                        .images
                        .iter()
                        .map(|src| format!(r#" <img src="{src}" alt=""/>"#))
                        .collect(),
                    _ => String::new(),
                };
                writeln!(
                    content,
                    "<p id=\"c{k}_{j}\">\n  Paragraph   {j} of {}{image}\n</p>",
                    h.title
                )
                .unwrap();
                if j == 1 && h.paragraphs > 1 {
                    content.push_str("<p class=\"aside\">Unreferenced aside</p>\n");
                }
                writeln!(
                    smil,
                    r#"<par id="p{k}_{j}" endsync="last"><text id="t{k}_{j}" src="content.html#c{k}_{j}"/>{}</par>"#,
                    par_audio[j]
                )
                .unwrap();
            }
        }
    }

    ncc.push_str("</body></html>\n");
    smil.push_str("</seq></body></smil>\n");
    content.push_str("</body></html>\n");

    std::fs::write(dir.join("ncc.html"), ncc).unwrap();
    std::fs::write(dir.join("book.smil"), smil).unwrap();
    if full_text {
        std::fs::write(dir.join("content.html"), content).unwrap();
    }
    file_url(dir.join("ncc.html")).unwrap()
}

/// Every `id` attribute in a document.
pub fn all_ids(doc: &dtbmerge::dom::Document) -> Vec<String> {
    doc.descendants(doc.root())
        .into_iter()
        .filter_map(|n| doc.element_id(n).map(str::to_string))
        .collect()
}

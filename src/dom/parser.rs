//! quick-xml driven parser producing a [`Document`].

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use url::Url;

use super::arena::{Attribute, Document, NodeId};
use crate::error::{Error, Result};
use crate::util::{decode_text, extract_encoding_hint};

/// Parse raw document bytes, detecting the text encoding first.
pub fn parse_bytes(bytes: &[u8], base_uri: Option<Url>) -> Result<Document> {
    let text = decode_text(strip_bom(bytes), extract_encoding_hint(bytes));
    parse_str(&text, base_uri)
}

/// Parse a document from text.
///
/// Whitespace is preserved verbatim; the XML declaration and processing
/// instructions are dropped (the serializer writes its own declaration).
pub fn parse_str(content: &str, base_uri: Option<Url>) -> Result<Document> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(false);

    let mut doc = Document::new(base_uri);
    let mut stack: Vec<NodeId> = vec![doc.root()];

    loop {
        let parent = stack.last().copied().unwrap_or(doc.root());
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let node = create_element(&mut doc, &e);
                doc.append(parent, node);
                stack.push(node);
            }
            Ok(Event::Empty(e)) => {
                let node = create_element(&mut doc, &e);
                doc.append(parent, node);
            }
            Ok(Event::End(_)) => {
                if stack.len() > 1 {
                    stack.pop();
                }
            }
            Ok(Event::Text(e)) => {
                let text = String::from_utf8_lossy(e.as_ref());
                if parent != doc.root() {
                    doc.append_text(parent, &text);
                }
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(e.as_ref());
                doc.append_text(parent, &text);
            }
            Ok(Event::GeneralRef(e)) => {
                let entity = String::from_utf8_lossy(e.as_ref());
                match resolve_entity(&entity) {
                    Some(resolved) => doc.append_text(parent, &resolved),
                    None => doc.append_text(parent, &format!("&{entity};")),
                }
            }
            Ok(Event::Comment(e)) => {
                let text = String::from_utf8_lossy(e.as_ref()).to_string();
                let node = doc.create_comment(text);
                doc.append(parent, node);
            }
            Ok(Event::DocType(e)) => {
                let body = String::from_utf8_lossy(e.as_ref()).trim().to_string();
                let node = doc.create_doctype(body);
                doc.append(doc.root(), node);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    if doc.is_empty() {
        return Err(Error::structural("document has no root element"));
    }

    Ok(doc)
}

fn create_element(doc: &mut Document, e: &BytesStart<'_>) -> NodeId {
    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
    let attrs = e
        .attributes()
        .flatten()
        .map(|attr| {
            Attribute::new(
                String::from_utf8_lossy(attr.key.as_ref()).to_string(),
                unescape(&String::from_utf8_lossy(&attr.value)),
            )
        })
        .collect();
    doc.create_element(name, attrs)
}

/// Strip a UTF-8 byte order mark.
pub fn strip_bom(data: &[u8]) -> &[u8] {
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    }
}

/// Resolve entity references inside an attribute value.
fn unescape(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        match after.find(';') {
            Some(semi) if semi <= 10 => match resolve_entity(&after[..semi]) {
                Some(resolved) => {
                    out.push_str(&resolved);
                    rest = &after[semi + 1..];
                }
                None => {
                    out.push('&');
                    rest = after;
                }
            },
            _ => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Resolve XML and common HTML entity references.
fn resolve_entity(entity: &str) -> Option<String> {
    let named = match entity {
        "apos" => Some('\''),
        "quot" => Some('"'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "nbsp" => Some('\u{00A0}'),
        "copy" => Some('\u{00A9}'),
        "reg" => Some('\u{00AE}'),
        "shy" => Some('\u{00AD}'),
        "ndash" => Some('\u{2013}'),
        "mdash" => Some('\u{2014}'),
        "hellip" => Some('\u{2026}'),
        "lsquo" => Some('\u{2018}'),
        "rsquo" => Some('\u{2019}'),
        "ldquo" => Some('\u{201C}'),
        "rdquo" => Some('\u{201D}'),
        _ => None,
    };
    if let Some(c) = named {
        return Some(c.to_string());
    }

    if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        if let Ok(code) = u32::from_str_radix(hex, 16)
            && let Some(c) = char::from_u32(code)
        {
            return Some(c.to_string());
        }
    } else if let Some(dec) = entity.strip_prefix('#')
        && let Ok(code) = dec.parse::<u32>()
        && let Some(c) = char::from_u32(code)
    {
        return Some(c.to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_smil_structure() {
        let smil = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE smil PUBLIC "-//W3C//DTD SMIL 1.0//EN" "http://www.w3.org/TR/REC-smil/SMIL10.dtd">
<smil><head><meta name="dc:format" content="Daisy 2.02"/></head>
<body><seq dur="3.0s"><par id="p1" endsync="last"><text src="ncc.html#h1"/><audio src="a.mp3" clip-begin="npt=0.000s" clip-end="npt=3.000s"/></par></seq></body></smil>"#;
        let doc = parse_str(smil, None).unwrap();

        let par = doc.get_by_id("p1").unwrap();
        assert_eq!(doc.element_name(par), Some("par"));
        let audio = doc.find_by_tag("audio").unwrap();
        assert_eq!(doc.attr(audio, "clip-end"), Some("npt=3.000s"));
        assert_eq!(doc.closest(audio, "par"), Some(par));
    }

    #[test]
    fn test_parse_entities() {
        let doc = parse_str(
            r#"<p title="a &amp; b">x&nbsp;y &#233;&#x41;</p>"#,
            None,
        )
        .unwrap();
        let p = doc.find_by_tag("p").unwrap();
        assert_eq!(doc.attr(p, "title"), Some("a & b"));
        assert_eq!(doc.text_content(p), "x\u{00A0}y \u{e9}A");
    }

    #[test]
    fn test_parse_bytes_latin1() {
        let mut bytes = br#"<?xml version="1.0" encoding="iso-8859-1"?><h1 id="a">Gr"#.to_vec();
        bytes.push(0xF8);
        bytes.extend_from_slice(b"d</h1>");
        let doc = parse_bytes(&bytes, None).unwrap();
        let h1 = doc.get_by_id("a").unwrap();
        assert_eq!(doc.text_content(h1), "Gr\u{f8}d");
    }

    #[test]
    fn test_parse_mismatched_end_is_error() {
        assert!(parse_str("<a><b></a>", None).is_err());
    }

    #[test]
    fn test_parse_empty_is_structural_error() {
        assert!(matches!(
            parse_str("   ", None),
            Err(Error::Structural(_))
        ));
    }

    #[test]
    fn test_unescape_leaves_stray_ampersand() {
        assert_eq!(unescape("a & b"), "a & b");
        assert_eq!(unescape("x&lt;y"), "x<y");
    }
}

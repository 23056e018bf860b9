//! End-to-end tests for saving merged DTBs: documents, audio and images.

mod common;

use std::path::Path;

use common::{RATE, clip, heading, write_book, write_wav};
use dtbmerge::progress::Silent;
use dtbmerge::{BuildOptions, DocumentStore, DtbBuilder, Error, forest_from_ncc};
use tempfile::TempDir;

fn options() -> BuildOptions {
    BuildOptions::default().with_fixed_prefix("out")
}

/// One-heading NCC-only book whose single clip plays `[0, 9.8s)` of a
/// `source_seconds` long WAV.
fn single_clip_builder(dir: &Path, source_seconds: f64) -> DtbBuilder {
    std::fs::create_dir_all(dir).unwrap();
    write_wav(&dir.join("src.wav"), RATE, source_seconds);
    let ncc = write_book(
        dir,
        "Single",
        &[heading(1, "Only", vec![clip("src.wav", 0, 9_800)])],
        false,
    );
    let forest = forest_from_ncc(&ncc, &DocumentStore::new()).unwrap();
    let mut builder = DtbBuilder::new(forest, options());
    assert!(builder.build(&mut Silent).unwrap());
    builder
}

#[test]
fn test_short_tail_is_byte_copy() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("book");
    let out = dir.path().join("merged");
    let builder = single_clip_builder(&src, 10.9);

    assert!(builder.save(&out, &mut Silent).unwrap());
    let copied = std::fs::read(out.join("out00000.wav")).unwrap();
    let original = std::fs::read(src.join("src.wav")).unwrap();
    assert_eq!(copied, original);
}

#[test]
fn test_long_tail_is_trimmed() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("book");
    let out = dir.path().join("merged");
    let builder = single_clip_builder(&src, 12.0);

    assert!(builder.save(&out, &mut Silent).unwrap());
    let reader = hound::WavReader::open(out.join("out00000.wav")).unwrap();
    assert_eq!(reader.spec().sample_rate, RATE);
    // Exactly 9.8 seconds of frames.
    assert_eq!(reader.duration(), 78_400);
}

#[test]
fn test_save_writes_every_document() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("book");
    std::fs::create_dir_all(&src).unwrap();
    write_wav(&src.join("a.wav"), RATE, 6.0);
    std::fs::write(src.join("pic.jpg"), b"not really a jpeg").unwrap();
    let ncc = write_book(
        &src,
        "Full",
        &[
            heading(1, "First", vec![clip("a.wav", 0, 1_000), clip("a.wav", 1_000, 2_000)])
                .with_paragraphs(1)
                .with_image("pic.jpg"),
            heading(1, "Second", vec![clip("a.wav", 3_000, 4_000)]),
        ],
        true,
    );
    let forest = forest_from_ncc(&ncc, &DocumentStore::new()).unwrap();
    let mut builder = DtbBuilder::new(forest, options());
    assert!(builder.build(&mut Silent).unwrap());

    let out = dir.path().join("merged");
    std::fs::create_dir_all(out.join("stale")).unwrap();
    std::fs::write(out.join("old.smil"), "stale").unwrap();

    assert!(builder.save(&out, &mut Silent).unwrap());

    let mut names: Vec<String> = std::fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "content.html",
            "ncc.html",
            "out00000.smil",
            "out00000.wav",
            "out00000_00.jpg",
            "out00001.smil",
            "out00001.wav",
        ]
    );

    assert_eq!(
        std::fs::read(out.join("out00000_00.jpg")).unwrap(),
        b"not really a jpeg"
    );
    let content = std::fs::read_to_string(out.join("content.html")).unwrap();
    assert!(content.contains(r#"<img src="out00000_00.jpg" alt="" />"#));
    assert!(content.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));

    let ncc = std::fs::read_to_string(out.join("ncc.html")).unwrap();
    assert!(ncc.contains(r#"<meta name="ncc:files" content="7" />"#));
    assert!(ncc.contains(r#"<h1 id="NCCID00000"><a href="out00000.smil#t0">First</a></h1>"#));

    let smil = std::fs::read_to_string(out.join("out00001.smil")).unwrap();
    assert!(smil.contains(r#"<seq dur="1.000s">"#));
    assert!(smil.contains(
        r#"<audio src="out00001.wav" clip-begin="npt=0.000s" clip-end="npt=1.000s" />"#
    ));

    let first = hound::WavReader::open(out.join("out00000.wav")).unwrap();
    assert_eq!(first.duration(), 16_000);
}

#[test]
fn test_mismatched_sample_rates_fail_without_output() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("book");
    std::fs::create_dir_all(&src).unwrap();
    write_wav(&src.join("low.wav"), 8_000, 2.0);
    write_wav(&src.join("high.wav"), 16_000, 2.0);
    let ncc = write_book(
        &src,
        "Mixed",
        &[heading(1, "Mixed", vec![clip("low.wav", 0, 1_000), clip("high.wav", 0, 1_000)])],
        false,
    );
    let forest = forest_from_ncc(&ncc, &DocumentStore::new()).unwrap();
    let mut builder = DtbBuilder::new(forest, options());
    assert!(builder.build(&mut Silent).unwrap());

    let out = dir.path().join("merged");
    let err = builder.save(&out, &mut Silent).unwrap_err();
    assert!(matches!(err, Error::Format(_)), "{err}");
    assert!(!out.join("out00000.wav").exists());
    // Documents were already written; there is no rollback.
    assert!(out.join("ncc.html").exists());
}

#[test]
fn test_clip_beyond_source_is_data_consistency_error() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("book");
    std::fs::create_dir_all(&src).unwrap();
    write_wav(&src.join("short.wav"), RATE, 1.0);
    let ncc = write_book(
        &src,
        "Short",
        &[heading(1, "Short", vec![clip("short.wav", 500, 1_500)])],
        false,
    );
    let forest = forest_from_ncc(&ncc, &DocumentStore::new()).unwrap();
    let mut builder = DtbBuilder::new(forest, options());
    assert!(builder.build(&mut Silent).unwrap());

    let err = builder
        .save(&dir.path().join("merged"), &mut Silent)
        .unwrap_err();
    assert!(matches!(err, Error::DataConsistency(_)), "{err}");
}

#[test]
fn test_cancel_during_save_stops_writing() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("book");
    std::fs::create_dir_all(&src).unwrap();
    write_wav(&src.join("a.wav"), RATE, 4.0);
    let ncc = write_book(
        &src,
        "Two",
        &[
            heading(1, "One", vec![clip("a.wav", 0, 1_000)]),
            heading(1, "Two", vec![clip("a.wav", 1_000, 2_000)]),
        ],
        false,
    );
    let forest = forest_from_ncc(&ncc, &DocumentStore::new()).unwrap();
    let mut builder = DtbBuilder::new(forest, options());
    assert!(builder.build(&mut Silent).unwrap());

    let out = dir.path().join("merged");
    let mut cancel_on_ncc = |_: u32, message: &str| message.contains("ncc.html");
    assert!(!builder.save(&out, &mut cancel_on_ncc).unwrap());

    assert!(out.join("out00000.smil").exists());
    assert!(out.join("out00001.smil").exists());
    assert!(!out.join("ncc.html").exists());
    assert!(!out.join("out00000.wav").exists());
}

#[test]
fn test_cancel_between_images_of_one_unit() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("book");
    std::fs::create_dir_all(&src).unwrap();
    write_wav(&src.join("a.wav"), RATE, 4.0);
    std::fs::write(src.join("one.png"), b"one").unwrap();
    std::fs::write(src.join("two.png"), b"two").unwrap();
    let ncc = write_book(
        &src,
        "Pictures",
        &[heading(1, "Pictures", vec![clip("a.wav", 0, 1_000)])
            .with_paragraphs(1)
            .with_image("one.png")
            .with_image("two.png")],
        true,
    );
    let forest = forest_from_ncc(&ncc, &DocumentStore::new()).unwrap();
    let mut builder = DtbBuilder::new(forest, options());
    assert!(builder.build(&mut Silent).unwrap());
    assert_eq!(builder.image_plan()[0].len(), 2);

    let out = dir.path().join("merged");
    let mut cancel_on_second = |_: u32, message: &str| message.contains("out00000_01.png");
    assert!(!builder.save(&out, &mut cancel_on_second).unwrap());

    assert_eq!(std::fs::read(out.join("out00000_00.png")).unwrap(), b"one");
    assert!(!out.join("out00000_01.png").exists());
}

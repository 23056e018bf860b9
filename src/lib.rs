//! # dtbmerge
//!
//! Merge and rebuild DAISY 2.02 Digital Talking Books.
//!
//! A DTB is an NCC navigation document, SMIL timing files, segmented audio
//! and, optionally, a full-text content document. This crate selects
//! heading-rooted units from one or more source DTBs and combines them into a
//! single, internally consistent book.
//!
//! ## Features
//!
//! - Lazy resolution of a heading's NCC, SMIL, text and audio runs
//!   ([`MergeEntry`])
//! - Forests built from an NCC or from a macro descriptor
//! - Id renumbering, reference rewriting and aggregate DAISY metadata
//!   ([`DtbBuilder`])
//! - Audio assembly by verbatim copy or by PCM re-encoding (WAV and MP3)
//! - Cooperative cancellation through [`Progress`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use dtbmerge::{BuildOptions, DocumentStore, DtbBuilder, file_url, forest_from_ncc};
//! use dtbmerge::progress::LogProgress;
//!
//! let store = DocumentStore::new();
//! let mut forest = forest_from_ncc(&file_url("first/ncc.html")?, &store)?;
//! forest.extend(forest_from_ncc(&file_url("second/ncc.html")?, &store)?);
//!
//! let mut builder = DtbBuilder::new(forest, BuildOptions::default());
//! if builder.build(&mut LogProgress)? {
//!     builder.save("merged".as_ref(), &mut LogProgress)?;
//! }
//! # Ok::<(), dtbmerge::Error>(())
//! ```

pub mod audio;
pub mod builder;
pub mod config;
pub mod dom;
pub mod error;
pub mod merge;
pub mod progress;
pub mod store;
pub mod time;
pub(crate) mod util;

pub use audio::{AssemblyMode, AudioAssembler, AudioSegment, audio_file_duration};
pub use builder::{BuildReport, DtbBuilder, ImageCopy, MultimediaType};
pub use config::{BuildOptions, PrefixGenerator};
pub use error::{Error, Result};
pub use merge::{FlatEntry, MacroDescriptor, MergeEntry, Section, flatten, forest_from_ncc};
pub use progress::{Progress, Signal};
pub use store::{DocumentStore, file_url};

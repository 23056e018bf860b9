//! Memoizing document loader.
//!
//! Merge entries drawn from the same DTB share their NCC, SMIL and content
//! documents. The store parses each file once, keyed by document identity,
//! and hands out shared read-only [`Rc<Document>`] handles.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use url::Url;

use crate::dom::{Document, document_identity, parse_bytes};
use crate::error::{Error, Result};

/// Shared cache of parsed source documents. Cloning the store clones the
/// handle, not the cache.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    cache: Rc<RefCell<HashMap<Url, Rc<Document>>>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load (or fetch from cache) the document identified by `uri`.
    /// Query and fragment are ignored.
    pub fn load(&self, uri: &Url) -> Result<Rc<Document>> {
        let identity = document_identity(uri);
        if let Some(doc) = self.cache.borrow().get(&identity) {
            return Ok(Rc::clone(doc));
        }

        let path = to_file_path(&identity)?;
        log::debug!("Loading {}", path.display());
        let bytes = std::fs::read(&path)?;
        let doc = Rc::new(parse_bytes(&bytes, Some(identity.clone()))?);

        self.cache.borrow_mut().insert(identity, Rc::clone(&doc));
        Ok(doc)
    }

    /// Number of distinct documents parsed so far.
    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.borrow().is_empty()
    }
}

/// Filesystem path for a `file:` URI.
pub fn to_file_path(uri: &Url) -> Result<PathBuf> {
    if uri.scheme() != "file" {
        return Err(Error::structural(format!(
            "unsupported URI scheme {:?} in {uri}",
            uri.scheme()
        )));
    }
    uri.to_file_path()
        .map_err(|()| Error::structural(format!("not a local file path: {uri}")))
}

/// `file:` URI for a filesystem path, made absolute against the current
/// directory when relative.
pub fn file_url(path: impl Into<PathBuf>) -> Result<Url> {
    let path = path.into();
    let absolute = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()?.join(path)
    };
    Url::from_file_path(&absolute)
        .map_err(|()| Error::structural(format!("cannot express {} as a URI", absolute.display())))
}

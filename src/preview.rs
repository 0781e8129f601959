use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::files::safe_file_name;
use crate::http::BinaryPayload;

/// A downloaded document staged on disk for an external viewer.
///
/// The staged file is removed exactly once, by the first of an explicit
/// [`DocumentPreview::release`] or the drop of this handle. Holding the
/// handle is what keeps the file alive.
#[derive(Debug)]
pub struct DocumentPreview {
    path: PathBuf,
    content_type: mime::Mime,
    released: bool,
}

impl DocumentPreview {
    pub(crate) fn create(staging_dir: &Path, payload: BinaryPayload) -> Result<Self> {
        fs::create_dir_all(staging_dir)
            .with_context(|| format!("failed to create {}", staging_dir.display()))?;

        // A random prefix keeps two previews of the same document apart.
        let name = safe_file_name(payload.file_name.as_deref(), "document");
        let path = staging_dir.join(format!("{}-{name}", Uuid::new_v4()));
        fs::write(&path, &payload.bytes)
            .with_context(|| format!("failed to stage preview at {}", path.display()))?;
        debug!(path = %path.display(), "staged document preview");

        Ok(Self {
            path,
            content_type: payload.content_type,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content_type(&self) -> &mime::Mime {
        &self.content_type
    }

    /// Remove the staged file. Calling this again, or dropping the handle
    /// afterwards, does nothing.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                warn!(?err, path = %self.path.display(), "failed to remove staged preview");
            }
        }
    }
}

impl Drop for DocumentPreview {
    fn drop(&mut self) {
        self.release();
    }
}

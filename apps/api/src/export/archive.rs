//! Export archive: a copy of every rendered file under `<root>/<owner>/<file_name>`.
//!
//! The owner is the draft id once a session has been saved, the session id before that.
//! A re-export of the same format replaces the previous copy.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;
use uuid::Uuid;

use crate::drafts::StorageError;
use crate::export::ExportArtifact;

pub struct ExportArchive {
    root: PathBuf,
}

impl ExportArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Writes the artifact through a temp file in the owner's directory and returns its path.
    pub async fn save(&self, owner: Uuid, artifact: &ExportArtifact) -> Result<PathBuf, StorageError> {
        let dir = self.root.join(owner.to_string());
        let path = dir.join(&artifact.file_name);
        let bytes = artifact.bytes.clone();

        let target = path.clone();
        tokio::task::spawn_blocking(move || write_replacing(&dir, &target, &bytes))
            .await
            .map_err(|e| StorageError::Io(io::Error::new(io::ErrorKind::Other, e)))??;

        debug!("Archived export at {}", path.display());
        Ok(path)
    }
}

fn write_replacing(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    std::fs::create_dir_all(dir)?;
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(target).map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tempfile::TempDir;

    use super::*;
    use crate::export::ExportFormat;

    fn artifact(body: &'static [u8]) -> ExportArtifact {
        ExportArtifact {
            format: ExportFormat::Html,
            bytes: Bytes::from_static(body),
            file_name: "website-revamp.html".to_string(),
            mime_type: ExportFormat::Html.mime_type(),
            source_revision: 1,
        }
    }

    #[tokio::test]
    async fn test_export_lands_under_owner_directory() {
        let dir = TempDir::new().unwrap();
        let archive = ExportArchive::new(dir.path());
        let owner = Uuid::new_v4();

        let path = archive.save(owner, &artifact(b"<!DOCTYPE html>v1")).await.unwrap();
        assert_eq!(path, dir.path().join(owner.to_string()).join("website-revamp.html"));
        assert_eq!(std::fs::read(&path).unwrap(), b"<!DOCTYPE html>v1");
    }

    #[tokio::test]
    async fn test_re_export_replaces_the_previous_copy() {
        let dir = TempDir::new().unwrap();
        let archive = ExportArchive::new(dir.path());
        let owner = Uuid::new_v4();

        archive.save(owner, &artifact(b"<!DOCTYPE html>v1")).await.unwrap();
        let path = archive.save(owner, &artifact(b"<!DOCTYPE html>v2")).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"<!DOCTYPE html>v2");

        let files = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(files, 1);
    }
}

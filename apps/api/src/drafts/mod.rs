//! Draft Store: append-only, versioned persistence of proposal snapshots.
//!
//! Layout on disk: `<root>/<draft_id>/v000001.json`, `v000002.json`, …
//! CRITICAL: versions are never rewritten. Each save lands in a fresh file that is
//! written to a temp file first and persisted without clobbering.

pub mod handlers;

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::draft::{DraftSnapshot, DraftSummary, DraftVersion};

/// Attempts at claiming a version number before giving up.
const MAX_SAVE_ATTEMPTS: u32 = 8;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    NotFound(String),

    #[error("draft storage I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("stored draft is corrupt: {0}")]
    Corrupt(String),

    #[error("draft could not be serialized: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl StorageError {
    fn draft_not_found(draft_id: Uuid) -> Self {
        StorageError::NotFound(format!("Draft {draft_id} not found"))
    }

    fn version_not_found(draft_id: Uuid, version: u32) -> Self {
        StorageError::NotFound(format!("Draft {draft_id} has no version {version}"))
    }
}

/// Where a save landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedDraft {
    pub draft_id: Uuid,
    pub version: u32,
}

/// Versioned draft persistence. Carried in `AppState` as `Arc<dyn DraftStore>`.
#[async_trait]
pub trait DraftStore: Send + Sync {
    /// Appends a new version. `None` starts a new draft; an unknown id is `NotFound`.
    async fn save(
        &self,
        draft_id: Option<Uuid>,
        snapshot: DraftSnapshot,
    ) -> Result<SavedDraft, StorageError>;

    /// Latest version of a draft.
    async fn load(&self, draft_id: Uuid) -> Result<DraftSnapshot, StorageError>;

    async fn load_version(&self, draft_id: Uuid, version: u32)
        -> Result<DraftSnapshot, StorageError>;

    /// Every version of a draft, oldest first.
    async fn list_versions(&self, draft_id: Uuid) -> Result<Vec<DraftVersion>, StorageError>;

    /// Every draft, most recently saved first.
    async fn list_drafts(&self) -> Result<Vec<DraftSummary>, StorageError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Filesystem backend
// ────────────────────────────────────────────────────────────────────────────

pub struct FsDraftStore {
    root: PathBuf,
}

/// The few fields listings need, read without materialising the whole snapshot.
#[derive(Deserialize)]
struct SnapshotHeader {
    saved_at: DateTime<Utc>,
    proposal: HeaderProposal,
}

#[derive(Deserialize)]
struct HeaderProposal {
    meta: HeaderMeta,
}

#[derive(Deserialize)]
struct HeaderMeta {
    project_title: String,
}

impl FsDraftStore {
    /// Opens (creating if needed) the draft root directory.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        info!("Draft store at {}", root.display());
        Ok(Self { root })
    }

    fn draft_dir(&self, draft_id: Uuid) -> PathBuf {
        self.root.join(draft_id.to_string())
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(PathBuf) -> Result<T, StorageError> + Send + 'static,
    {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || work(root))
            .await
            .map_err(|e| StorageError::Io(io::Error::new(io::ErrorKind::Other, e)))?
    }
}

fn version_file_name(version: u32) -> String {
    format!("v{version:06}.json")
}

fn parse_version_file_name(name: &str) -> Option<u32> {
    let digits = name.strip_prefix('v')?.strip_suffix(".json")?;
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|v| *v > 0)
}

/// Version numbers present in a draft directory, ascending. Missing directory → NotFound.
fn versions_in(dir: &Path, draft_id: Uuid) -> Result<Vec<u32>, StorageError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StorageError::draft_not_found(draft_id))
        }
        Err(e) => return Err(e.into()),
    };
    let mut versions = Vec::new();
    for entry in entries {
        let entry = entry?;
        if let Some(version) = entry.file_name().to_str().and_then(parse_version_file_name) {
            versions.push(version);
        }
    }
    versions.sort_unstable();
    Ok(versions)
}

fn read_snapshot(path: &Path) -> Result<DraftSnapshot, StorageError> {
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| StorageError::Corrupt(format!("{}: {e}", path.display())))
}

fn read_header(path: &Path) -> Result<SnapshotHeader, StorageError> {
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| StorageError::Corrupt(format!("{}: {e}", path.display())))
}

#[async_trait]
impl DraftStore for FsDraftStore {
    async fn save(
        &self,
        draft_id: Option<Uuid>,
        mut snapshot: DraftSnapshot,
    ) -> Result<SavedDraft, StorageError> {
        let is_new = draft_id.is_none();
        let draft_id = draft_id.unwrap_or_else(Uuid::new_v4);
        let dir = self.draft_dir(draft_id);

        let saved = self
            .blocking(move |_| {
                let existing = if is_new {
                    std::fs::create_dir_all(&dir)?;
                    Vec::new()
                } else {
                    versions_in(&dir, draft_id)?
                };
                let mut version = existing.last().copied().unwrap_or(0) + 1;

                for _ in 0..MAX_SAVE_ATTEMPTS {
                    snapshot.draft_id = draft_id;
                    snapshot.version = version;
                    let bytes =
                        serde_json::to_vec_pretty(&snapshot).map_err(StorageError::Serialize)?;

                    let mut tmp = NamedTempFile::new_in(&dir)?;
                    io::Write::write_all(&mut tmp, &bytes)?;
                    tmp.as_file().sync_all()?;

                    match tmp.persist_noclobber(dir.join(version_file_name(version))) {
                        Ok(_) => return Ok(SavedDraft { draft_id, version }),
                        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                            warn!("Draft {draft_id} v{version} already exists; trying next version");
                            version += 1;
                        }
                        Err(e) => return Err(StorageError::Io(e.error)),
                    }
                }
                Err(StorageError::Io(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("could not claim a new version for draft {draft_id}"),
                )))
            })
            .await?;

        info!("Saved draft {} v{}", saved.draft_id, saved.version);
        Ok(saved)
    }

    async fn load(&self, draft_id: Uuid) -> Result<DraftSnapshot, StorageError> {
        let dir = self.draft_dir(draft_id);
        self.blocking(move |_| {
            let latest = versions_in(&dir, draft_id)?
                .last()
                .copied()
                .ok_or_else(|| StorageError::draft_not_found(draft_id))?;
            read_snapshot(&dir.join(version_file_name(latest)))
        })
        .await
    }

    async fn load_version(
        &self,
        draft_id: Uuid,
        version: u32,
    ) -> Result<DraftSnapshot, StorageError> {
        let dir = self.draft_dir(draft_id);
        self.blocking(move |_| {
            let path = dir.join(version_file_name(version));
            if !path.is_file() {
                // Distinguish an unknown draft from an unknown version.
                versions_in(&dir, draft_id)?;
                return Err(StorageError::version_not_found(draft_id, version));
            }
            read_snapshot(&path)
        })
        .await
    }

    async fn list_versions(&self, draft_id: Uuid) -> Result<Vec<DraftVersion>, StorageError> {
        let dir = self.draft_dir(draft_id);
        self.blocking(move |_| {
            let versions = versions_in(&dir, draft_id)?;
            if versions.is_empty() {
                return Err(StorageError::draft_not_found(draft_id));
            }
            versions
                .into_iter()
                .map(|version| {
                    let path = dir.join(version_file_name(version));
                    let size_bytes = std::fs::metadata(&path)?.len();
                    let header = read_header(&path)?;
                    Ok(DraftVersion {
                        version,
                        saved_at: header.saved_at,
                        size_bytes,
                    })
                })
                .collect()
        })
        .await
    }

    async fn list_drafts(&self) -> Result<Vec<DraftSummary>, StorageError> {
        let mut drafts = self
            .blocking(|root| {
                let mut drafts = Vec::new();
                for entry in std::fs::read_dir(&root)? {
                    let entry = entry?;
                    let Some(draft_id) = entry
                        .file_name()
                        .to_str()
                        .and_then(|n| Uuid::parse_str(n).ok())
                    else {
                        continue;
                    };
                    let dir = entry.path();
                    let Some(latest) = versions_in(&dir, draft_id)?.last().copied() else {
                        continue;
                    };
                    match read_header(&dir.join(version_file_name(latest))) {
                        Ok(header) => drafts.push(DraftSummary {
                            draft_id,
                            latest_version: latest,
                            project_title: header.proposal.meta.project_title,
                            saved_at: header.saved_at,
                        }),
                        Err(e) => warn!("Skipping unreadable draft {draft_id}: {e}"),
                    }
                }
                Ok(drafts)
            })
            .await?;
        drafts.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        debug!("Listed {} drafts", drafts.len());
        Ok(drafts)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::insights::TranscriptInsights;
    use crate::models::proposal::fixtures::{acme_request, filled_proposal};
    use crate::models::proposal::SectionKind;

    const SECRET: &str = "SECRET-TRANSCRIPT-MARKER Globex CFO said the budget could stretch";

    fn snapshot(privacy_mode: bool) -> DraftSnapshot {
        let mut request = acme_request();
        request.transcript = Some(SECRET.to_string());
        let insights = TranscriptInsights {
            quotes: vec!["SECRET-INSIGHT-MARKER".to_string()],
            ..TranscriptInsights::default()
        };
        DraftSnapshot::capture(&request, Some(&insights), &filled_proposal(), privacy_mode)
    }

    #[tokio::test]
    async fn test_n_saves_produce_n_ordered_versions() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDraftStore::open(dir.path()).await.unwrap();

        let first = store.save(None, snapshot(false)).await.unwrap();
        assert_eq!(first.version, 1);
        for expected in 2..=4 {
            let saved = store.save(Some(first.draft_id), snapshot(false)).await.unwrap();
            assert_eq!(saved.draft_id, first.draft_id);
            assert_eq!(saved.version, expected);
        }

        let versions = store.list_versions(first.draft_id).await.unwrap();
        let numbers: Vec<u32> = versions.iter().map(|v| v.version).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert!(versions.iter().all(|v| v.size_bytes > 0));
        assert!(versions.windows(2).all(|w| w[0].saved_at <= w[1].saved_at));
    }

    #[tokio::test]
    async fn test_earlier_versions_are_never_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDraftStore::open(dir.path()).await.unwrap();

        let first = store.save(None, snapshot(false)).await.unwrap();
        let v1_path = dir
            .path()
            .join(first.draft_id.to_string())
            .join("v000001.json");
        let v1_bytes = std::fs::read(&v1_path).unwrap();

        let mut edited = snapshot(false);
        edited
            .proposal
            .apply_edit(SectionKind::Appendix, "Edited appendix".to_string());
        store.save(Some(first.draft_id), edited).await.unwrap();

        assert_eq!(std::fs::read(&v1_path).unwrap(), v1_bytes);
        let latest = store.load(first.draft_id).await.unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(
            latest.proposal.section(SectionKind::Appendix).body,
            "Edited appendix"
        );
        let original = store.load_version(first.draft_id, 1).await.unwrap();
        assert_eq!(original.version, 1);
        assert!(original
            .proposal
            .section(SectionKind::Appendix)
            .history
            .is_empty());
    }

    #[tokio::test]
    async fn test_unknown_draft_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDraftStore::open(dir.path()).await.unwrap();
        let unknown = Uuid::new_v4();

        assert!(matches!(store.load(unknown).await, Err(StorageError::NotFound(_))));
        assert!(matches!(
            store.list_versions(unknown).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            store.save(Some(unknown), snapshot(false)).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_version_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDraftStore::open(dir.path()).await.unwrap();
        let saved = store.save(None, snapshot(false)).await.unwrap();

        let err = store.load_version(saved.draft_id, 9).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(ref m) if m.contains("version 9")));
    }

    #[tokio::test]
    async fn test_privacy_mode_keeps_transcript_out_of_stored_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDraftStore::open(dir.path()).await.unwrap();
        let saved = store.save(None, snapshot(true)).await.unwrap();

        let path = dir
            .path()
            .join(saved.draft_id.to_string())
            .join("v000001.json");
        let stored = std::fs::read_to_string(path).unwrap();
        assert!(!stored.contains("SECRET-TRANSCRIPT-MARKER"));
        assert!(!stored.contains("SECRET-INSIGHT-MARKER"));

        let loaded = store.load(saved.draft_id).await.unwrap();
        assert!(loaded.privacy_mode);
        assert!(loaded.request.transcript.is_none());
        assert!(loaded.insights.is_none());
        assert!(loaded.proposal.is_complete());
    }

    #[tokio::test]
    async fn test_transcript_is_kept_when_privacy_is_off() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDraftStore::open(dir.path()).await.unwrap();
        let saved = store.save(None, snapshot(false)).await.unwrap();

        let loaded = store.load(saved.draft_id).await.unwrap();
        assert_eq!(loaded.request.transcript.as_deref(), Some(SECRET));
        assert!(loaded.insights.is_some());
    }

    #[tokio::test]
    async fn test_list_drafts_reports_latest_versions() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDraftStore::open(dir.path()).await.unwrap();
        let a = store.save(None, snapshot(false)).await.unwrap();
        store.save(Some(a.draft_id), snapshot(false)).await.unwrap();
        let b = store.save(None, snapshot(true)).await.unwrap();

        let drafts = store.list_drafts().await.unwrap();
        assert_eq!(drafts.len(), 2);
        let summary_a = drafts.iter().find(|d| d.draft_id == a.draft_id).unwrap();
        assert_eq!(summary_a.latest_version, 2);
        assert_eq!(summary_a.project_title, "Website Revamp");
        assert!(drafts.iter().any(|d| d.draft_id == b.draft_id));
    }

    #[tokio::test]
    async fn test_corrupt_version_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDraftStore::open(dir.path()).await.unwrap();
        let saved = store.save(None, snapshot(false)).await.unwrap();
        let draft_dir = dir.path().join(saved.draft_id.to_string());
        std::fs::write(draft_dir.join("v000002.json"), b"{not json").unwrap();

        assert!(matches!(
            store.load(saved.draft_id).await,
            Err(StorageError::Corrupt(_))
        ));
    }

    #[test]
    fn test_version_file_names_round_trip() {
        assert_eq!(version_file_name(7), "v000007.json");
        assert_eq!(parse_version_file_name("v000007.json"), Some(7));
        assert_eq!(parse_version_file_name("v7.json"), None);
        assert_eq!(parse_version_file_name("v000000.json"), None);
        assert_eq!(parse_version_file_name(".tmpXYZ"), None);
    }
}

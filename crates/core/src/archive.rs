//! Thread archive/unarchive: snapshots a thread's associated files under a
//! SHA-256 manifest so a thread can later be restored, detecting if the
//! archived files changed out from under it between archive and unarchive.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use acp_runtime::PreferenceStore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

fn io_err(message: impl Into<String>) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, message.into())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveManifestEntry {
    pub kind: String,
    pub source_path: String,
    pub archived_path: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub thread_id: String,
    pub timestamp: String,
    pub entries: Vec<ArchiveManifestEntry>,
}

#[derive(Debug, Clone)]
pub struct UnarchiveOutcome {
    pub archive_modified: bool,
    pub modified_files: Vec<String>,
}

fn preference_key(thread_id: &str) -> String {
    format!("archive:{thread_id}")
}

pub struct ThreadArchiver {
    root: PathBuf,
    prefs: Arc<dyn PreferenceStore>,
}

impl ThreadArchiver {
    pub fn new(home: PathBuf, prefs: Arc<dyn PreferenceStore>) -> Self {
        Self {
            root: home.join(".multi-agent").join("thread-archives"),
            prefs,
        }
    }

    /// Copies `files` into a freshly allocated archive directory and writes
    /// a manifest. The directory name is suffixed until it doesn't collide
    /// with a prior archive of the same thread; an archive target that
    /// already exists on disk is treated as a hard error rather than
    /// silently overwritten.
    pub async fn archive(&self, thread_id: &str, files: &[PathBuf], timestamp: &str) -> std::io::Result<ArchiveManifest> {
        let mut dir = self.root.join(thread_id).join(timestamp);
        let mut suffix = 0u32;
        while tokio::fs::metadata(&dir).await.is_ok() {
            suffix += 1;
            dir = self.root.join(thread_id).join(format!("{timestamp}-{suffix}"));
        }
        tokio::fs::create_dir_all(&dir).await?;

        let mut entries = Vec::new();
        for file in files {
            let file_name = file
                .file_name()
                .ok_or_else(|| io_err("archive: source path has no file name"))?;
            let target = dir.join(file_name);
            if tokio::fs::metadata(&target).await.is_ok() {
                return Err(io_err(format!(
                    "archive: refusing to overwrite existing archive target {}",
                    target.display()
                )));
            }
            let metadata = tokio::fs::metadata(file).await?;
            let kind = if metadata.is_dir() { "directory" } else { "file" };
            let bytes = tokio::fs::read(file).await?;
            tokio::fs::write(&target, &bytes).await?;
            entries.push(ArchiveManifestEntry {
                kind: kind.to_string(),
                source_path: file.display().to_string(),
                archived_path: target.display().to_string(),
                size: bytes.len() as u64,
                sha256: sha256_hex(&bytes),
            });
        }

        let manifest = ArchiveManifest {
            thread_id: thread_id.to_string(),
            timestamp: timestamp.to_string(),
            entries,
        };
        let manifest_bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| io_err(format!("archive: failed to serialize manifest: {e}")))?;
        tokio::fs::write(dir.join("manifest.json"), manifest_bytes).await?;

        self.prefs.set(&preference_key(thread_id), dir.display().to_string()).await;
        Ok(manifest)
    }

    /// Restores a thread's archived files to their recorded source paths.
    /// Any entry whose archived content no longer matches its recorded hash
    /// is skipped and reported rather than restored, since restoring it
    /// would silently replace live content with data that may have rotted.
    pub async fn unarchive(&self, thread_id: &str) -> std::io::Result<UnarchiveOutcome> {
        let Some(dir) = self.prefs.get(&preference_key(thread_id)).await else {
            return Err(io_err("unarchive: no archive recorded for thread"));
        };
        let dir = PathBuf::from(dir);
        let manifest_bytes = tokio::fs::read(dir.join("manifest.json")).await?;
        let manifest: ArchiveManifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| io_err(format!("unarchive: corrupt manifest: {e}")))?;

        let mut modified_files = Vec::new();
        for entry in &manifest.entries {
            let bytes = tokio::fs::read(&entry.archived_path).await?;
            if sha256_hex(&bytes) != entry.sha256 {
                modified_files.push(entry.source_path.clone());
                continue;
            }
            if let Some(parent) = Path::new(&entry.source_path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&entry.source_path, &bytes).await?;
        }

        self.prefs.remove(&preference_key(thread_id)).await;

        let archive_modified = !modified_files.is_empty();
        if archive_modified {
            tracing::warn!(thread_id, ?modified_files, "archived content changed since it was snapshotted");
        }
        Ok(UnarchiveOutcome {
            archive_modified,
            modified_files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acp_runtime::MockPreferenceStore;

    #[tokio::test]
    async fn archive_then_unarchive_round_trips() {
        let home = tempfile::tempdir().unwrap();
        let source_dir = tempfile::tempdir().unwrap();
        let source_file = source_dir.path().join("notes.md");
        tokio::fs::write(&source_file, b"hello world").await.unwrap();

        let prefs = Arc::new(MockPreferenceStore::default());
        let archiver = ThreadArchiver::new(home.path().to_path_buf(), prefs);

        let manifest = archiver
            .archive("thread-1", &[source_file.clone()], "2026-08-01T00-00-00Z")
            .await
            .unwrap();
        assert_eq!(manifest.entries.len(), 1);

        tokio::fs::write(&source_file, b"overwritten").await.unwrap();
        let outcome = archiver.unarchive("thread-1").await.unwrap();
        assert!(!outcome.archive_modified);
        let restored = tokio::fs::read_to_string(&source_file).await.unwrap();
        assert_eq!(restored, "hello world");
    }

    #[tokio::test]
    async fn unarchive_without_prior_archive_errors() {
        let home = tempfile::tempdir().unwrap();
        let prefs = Arc::new(MockPreferenceStore::default());
        let archiver = ThreadArchiver::new(home.path().to_path_buf(), prefs);
        assert!(archiver.unarchive("nonexistent").await.is_err());
    }

    #[tokio::test]
    async fn unarchive_detects_tampered_archive_copy() {
        let home = tempfile::tempdir().unwrap();
        let source_dir = tempfile::tempdir().unwrap();
        let source_file = source_dir.path().join("notes.md");
        tokio::fs::write(&source_file, b"hello world").await.unwrap();

        let prefs = Arc::new(MockPreferenceStore::default());
        let archiver = ThreadArchiver::new(home.path().to_path_buf(), prefs);
        let manifest = archiver
            .archive("thread-1", &[source_file.clone()], "2026-08-01T00-00-00Z")
            .await
            .unwrap();

        tokio::fs::write(&manifest.entries[0].archived_path, b"tampered")
            .await
            .unwrap();

        let outcome = archiver.unarchive("thread-1").await.unwrap();
        assert!(outcome.archive_modified);
        assert_eq!(outcome.modified_files.len(), 1);
    }
}

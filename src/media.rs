//! Media staging — attachments accepted during the dialog, pending publish.
//!
//! Arenas are keyed by conversation id so concurrent operators cannot see
//! each other's staged files. Index assignment and persist run under one
//! lock; the lock is never held across network calls.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::dialog::ConversationId;
use crate::error::StagingError;

/// Maximum staged items, unless the selected network set is exactly the
/// single network without an attachment-count limit.
pub const MAX_STAGED_ITEMS: usize = 4;

/// Inferred content category of a staged attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaCategory {
    Image,
    Video,
    Other,
}

impl MediaCategory {
    /// Infer a category from a filename extension.
    pub fn from_filename(filename: &str) -> Self {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" => Self::Image,
            "mp4" | "mov" | "webm" | "mkv" | "avi" => Self::Video,
            _ => Self::Other,
        }
    }

    /// Infer a category from a MIME type.
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            Self::Image
        } else if mime.starts_with("video/") {
            Self::Video
        } else {
            Self::Other
        }
    }
}

/// One attachment awaiting publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedMedia {
    /// Sequential arrival index, monotonic per conversation.
    pub index: u32,
    pub category: MediaCategory,
    pub path: PathBuf,
}

#[derive(Default)]
struct Arena {
    items: Vec<StagedMedia>,
}

impl Arena {
    /// `max(existing indices) + 1`, defaulting to 1 when nothing is staged.
    fn next_index(&self) -> u32 {
        self.items.iter().map(|m| m.index).max().unwrap_or(0) + 1
    }
}

/// Session-scoped staging area for attachments.
pub struct MediaStaging {
    root: PathBuf,
    arenas: Mutex<HashMap<ConversationId, Arena>>,
}

impl MediaStaging {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            arenas: Mutex::new(HashMap::new()),
        }
    }

    /// Remove every staged file under the media root. Called once at boot.
    pub async fn sweep(&self) -> Result<(), StagingError> {
        if tokio::fs::try_exists(&self.root).await? {
            tokio::fs::remove_dir_all(&self.root).await?;
        }
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Accept an attachment: assign the next index, write the bytes, record
    /// the item. Fails with `LimitExceeded` when the arena already holds
    /// `MAX_STAGED_ITEMS` and `unlimited` is false; the item is not stored.
    ///
    /// Index assignment and persist are one critical section so concurrent
    /// attachments cannot claim the same index or overwrite each other.
    pub async fn accept(
        &self,
        conversation: ConversationId,
        bytes: &[u8],
        filename: &str,
        category: MediaCategory,
        unlimited: bool,
    ) -> Result<StagedMedia, StagingError> {
        let mut arenas = self.arenas.lock().await;
        let arena = arenas.entry(conversation).or_default();

        if !unlimited && arena.items.len() >= MAX_STAGED_ITEMS {
            return Err(StagingError::LimitExceeded {
                max: MAX_STAGED_ITEMS,
            });
        }

        let index = arena.next_index();
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();

        let dir = self.root.join(conversation.to_string());
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("media_{index}{ext}"));
        tokio::fs::write(&path, bytes).await?;

        let item = StagedMedia {
            index,
            category,
            path,
        };
        arena.items.push(item.clone());
        tracing::debug!(
            conversation = %conversation,
            index,
            category = ?category,
            "Staged media item"
        );
        Ok(item)
    }

    /// Staged items sorted by arrival index — the canonical publish order.
    pub async fn list_ordered(&self, conversation: ConversationId) -> Vec<StagedMedia> {
        let arenas = self.arenas.lock().await;
        let mut items = arenas
            .get(&conversation)
            .map(|a| a.items.clone())
            .unwrap_or_default();
        items.sort_by_key(|m| m.index);
        items
    }

    /// Number of currently staged items.
    pub async fn count(&self, conversation: ConversationId) -> usize {
        let arenas = self.arenas.lock().await;
        arenas.get(&conversation).map(|a| a.items.len()).unwrap_or(0)
    }

    /// Delete all staged items and their files for a conversation.
    pub async fn clear(&self, conversation: ConversationId) -> Result<(), StagingError> {
        let mut arenas = self.arenas.lock().await;
        arenas.remove(&conversation);
        let dir = self.root.join(conversation.to_string());
        if tokio::fs::try_exists(&dir).await? {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staging() -> (tempfile::TempDir, MediaStaging) {
        let dir = tempfile::tempdir().unwrap();
        let staging = MediaStaging::new(dir.path().join("media"));
        (dir, staging)
    }

    const CONV: ConversationId = ConversationId(7);

    // ── Category inference ──────────────────────────────────────────

    #[test]
    fn category_from_filename() {
        assert_eq!(MediaCategory::from_filename("a.JPG"), MediaCategory::Image);
        assert_eq!(MediaCategory::from_filename("b.mp4"), MediaCategory::Video);
        assert_eq!(MediaCategory::from_filename("c.pdf"), MediaCategory::Other);
        assert_eq!(MediaCategory::from_filename("noext"), MediaCategory::Other);
    }

    #[test]
    fn category_from_mime() {
        assert_eq!(MediaCategory::from_mime("image/png"), MediaCategory::Image);
        assert_eq!(MediaCategory::from_mime("video/mp4"), MediaCategory::Video);
        assert_eq!(
            MediaCategory::from_mime("application/pdf"),
            MediaCategory::Other
        );
    }

    // ── Indexing and ordering ───────────────────────────────────────

    #[tokio::test]
    async fn indices_are_sequential_from_one() {
        let (_dir, staging) = staging();
        for expected in 1..=3u32 {
            let item = staging
                .accept(CONV, b"x", "a.jpg", MediaCategory::Image, false)
                .await
                .unwrap();
            assert_eq!(item.index, expected);
        }
    }

    #[tokio::test]
    async fn list_ordered_preserves_arrival_order() {
        let (_dir, staging) = staging();
        staging
            .accept(CONV, b"1", "a.jpg", MediaCategory::Image, false)
            .await
            .unwrap();
        staging
            .accept(CONV, b"2", "b.mp4", MediaCategory::Video, false)
            .await
            .unwrap();
        let items = staging.list_ordered(CONV).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].index, 1);
        assert_eq!(items[0].category, MediaCategory::Image);
        assert_eq!(items[1].index, 2);
        assert_eq!(items[1].category, MediaCategory::Video);
    }

    #[tokio::test]
    async fn files_are_written_and_cleared() {
        let (_dir, staging) = staging();
        let item = staging
            .accept(CONV, b"payload", "a.png", MediaCategory::Image, false)
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&item.path).await.unwrap(), b"payload");

        staging.clear(CONV).await.unwrap();
        assert!(!item.path.exists());
        assert_eq!(staging.count(CONV).await, 0);
    }

    // ── Limit enforcement ───────────────────────────────────────────

    #[tokio::test]
    async fn fifth_item_rejected_when_limited() {
        let (_dir, staging) = staging();
        for _ in 0..4 {
            staging
                .accept(CONV, b"x", "a.jpg", MediaCategory::Image, false)
                .await
                .unwrap();
        }
        let err = staging
            .accept(CONV, b"x", "a.jpg", MediaCategory::Image, false)
            .await
            .unwrap_err();
        assert!(matches!(err, StagingError::LimitExceeded { max: 4 }));
        assert_eq!(staging.count(CONV).await, 4);
    }

    #[tokio::test]
    async fn fifth_item_accepted_when_unlimited() {
        let (_dir, staging) = staging();
        for _ in 0..4 {
            staging
                .accept(CONV, b"x", "a.jpg", MediaCategory::Image, true)
                .await
                .unwrap();
        }
        let item = staging
            .accept(CONV, b"x", "a.jpg", MediaCategory::Image, true)
            .await
            .unwrap();
        assert_eq!(item.index, 5);
    }

    // ── Arena isolation ─────────────────────────────────────────────

    #[tokio::test]
    async fn arenas_are_isolated_per_conversation() {
        let (_dir, staging) = staging();
        let other = ConversationId(8);
        staging
            .accept(CONV, b"x", "a.jpg", MediaCategory::Image, false)
            .await
            .unwrap();
        assert_eq!(staging.count(other).await, 0);

        staging.clear(other).await.unwrap();
        assert_eq!(staging.count(CONV).await, 1);
    }

    #[tokio::test]
    async fn concurrent_accepts_never_share_an_index() {
        let (_dir, staging) = staging();
        let staging = std::sync::Arc::new(staging);
        let mut handles = Vec::new();
        for i in 0..4 {
            let staging = std::sync::Arc::clone(&staging);
            handles.push(tokio::spawn(async move {
                staging
                    .accept(CONV, &[i], "a.jpg", MediaCategory::Image, false)
                    .await
                    .unwrap()
                    .index
            }));
        }
        let mut indices = Vec::new();
        for handle in handles {
            indices.push(handle.await.unwrap());
        }
        indices.sort();
        assert_eq!(indices, vec![1, 2, 3, 4]);
    }
}

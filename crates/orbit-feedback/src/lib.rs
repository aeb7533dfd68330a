//! Feedback Capture (C11): implicit diff-based entries recorded when a
//! reviewer corrects an AI-produced artifact, and explicit closed-vocabulary
//! tags recorded when a reviewer flags one intentionally.
//!
//! Feedback is append-only and never mutates the artifact it references —
//! it is read back per task, and aggregated across tasks as a retrieval
//! corpus, the way the dispatch decision log is read back elsewhere in
//! this workspace.

use chrono::Utc;
use orbit_core::{FeedbackEntry, FeedbackKind, OrbitError, OrbitResult};
use orbit_store::FeedbackStore;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// The closed vocabulary explicit feedback tags are drawn from (§4.9).
pub const TAG_VOCABULARY: [&str; 4] = [
    "misclassified",
    "missing_context",
    "judgment_call",
    "calculation_fix",
];

/// Feedback Capture: validates and persists implicit and explicit
/// feedback over a [`FeedbackStore`].
pub struct FeedbackCapture<S: FeedbackStore> {
    store: Arc<S>,
}

impl<S: FeedbackStore> FeedbackCapture<S> {
    /// Wrap a [`FeedbackStore`] with capture semantics.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Record an implicit entry: the diff between the AI-produced content
    /// and a reviewer's correction. Fails if the two are identical —
    /// there is nothing to learn from a no-op save.
    pub async fn capture_implicit(
        &self,
        task_id: Uuid,
        reviewer_id: Option<String>,
        original_content: impl Into<String>,
        corrected_content: impl Into<String>,
    ) -> OrbitResult<FeedbackEntry> {
        let original_content = original_content.into();
        let corrected_content = corrected_content.into();

        if original_content == corrected_content {
            return Err(OrbitError::Validation(
                "implicit feedback requires corrected_content to differ from original_content"
                    .into(),
            ));
        }

        let diff_summary = diff_summary(&original_content, &corrected_content);

        let entry = FeedbackEntry {
            id: Uuid::new_v4(),
            task_id,
            kind: FeedbackKind::Implicit,
            reviewer_id,
            tags: Vec::new(),
            original_content,
            corrected_content: Some(corrected_content),
            diff_summary: Some(diff_summary),
            note: None,
            created_at: Utc::now(),
        };
        self.store.add(entry.clone()).await?;
        info!(task_id = %task_id, "implicit feedback captured");
        Ok(entry)
    }

    /// Record an explicit entry: a set of closed-vocabulary tags plus an
    /// optional free-text note. Fails if `tags` is empty or any tag is
    /// outside [`TAG_VOCABULARY`].
    pub async fn capture_explicit(
        &self,
        task_id: Uuid,
        reviewer_id: Option<String>,
        original_content: impl Into<String>,
        tags: Vec<String>,
        note: Option<String>,
    ) -> OrbitResult<FeedbackEntry> {
        if tags.is_empty() {
            return Err(OrbitError::Validation(
                "explicit feedback requires at least one tag".into(),
            ));
        }
        if let Some(bad) = tags.iter().find(|t| !TAG_VOCABULARY.contains(&t.as_str())) {
            return Err(OrbitError::Validation(format!(
                "'{bad}' is not a recognized feedback tag"
            )));
        }

        let entry = FeedbackEntry {
            id: Uuid::new_v4(),
            task_id,
            kind: FeedbackKind::Explicit,
            reviewer_id,
            tags,
            original_content: original_content.into(),
            corrected_content: None,
            diff_summary: None,
            note,
            created_at: Utc::now(),
        };
        self.store.add(entry.clone()).await?;
        info!(task_id = %task_id, "explicit feedback captured");
        Ok(entry)
    }

    /// All feedback for one task, oldest first.
    pub async fn for_task(&self, task_id: Uuid) -> OrbitResult<Vec<FeedbackEntry>> {
        self.store.list_for_task(task_id).await
    }

    /// Every feedback entry across every task, for aggregation into a
    /// future retrieval corpus.
    pub async fn all(&self) -> OrbitResult<Vec<FeedbackEntry>> {
        self.store.all().await
    }
}

/// Compute a human-readable per-line diff summary between `original` and
/// `corrected`. Not a full LCS alignment — sufficient for surfacing which
/// lines changed, which is all the reviewer-facing summary needs.
fn diff_summary(original: &str, corrected: &str) -> String {
    let original_lines: Vec<&str> = original.lines().collect();
    let corrected_lines: Vec<&str> = corrected.lines().collect();
    let max_len = original_lines.len().max(corrected_lines.len());

    let mut changes = Vec::new();
    for i in 0..max_len {
        let before = original_lines.get(i).copied();
        let after = corrected_lines.get(i).copied();
        if before != after {
            match (before, after) {
                (Some(b), Some(a)) => changes.push(format!("line {}: \"{b}\" -> \"{a}\"", i + 1)),
                (Some(b), None) => changes.push(format!("line {}: removed \"{b}\"", i + 1)),
                (None, Some(a)) => changes.push(format!("line {}: added \"{a}\"", i + 1)),
                (None, None) => unreachable!("at least one side has a line at index {i}"),
            }
        }
    }

    if changes.is_empty() {
        "no line-level differences detected".to_string()
    } else {
        changes.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_store::FileFeedbackStore;

    async fn capture() -> FeedbackCapture<FileFeedbackStore> {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = Arc::new(FileFeedbackStore::new(tmp.path().to_path_buf()).await.unwrap());
        std::mem::forget(tmp);
        FeedbackCapture::new(store)
    }

    #[tokio::test]
    async fn implicit_rejects_identical_content() {
        let capture = capture().await;
        let err = capture
            .capture_implicit(Uuid::new_v4(), None, "wages: 1000", "wages: 1000")
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "validation_error");
    }

    #[tokio::test]
    async fn implicit_identifies_changed_line() {
        let capture = capture().await;
        let entry = capture
            .capture_implicit(
                Uuid::new_v4(),
                Some("reviewer-1".into()),
                "wages: 1000\ninterest: 100",
                "wages: 1200\ninterest: 100",
            )
            .await
            .unwrap();
        let summary = entry.diff_summary.unwrap();
        assert!(summary.contains("line 1"));
        assert!(!summary.contains("line 2"));
    }

    #[tokio::test]
    async fn explicit_rejects_empty_tags() {
        let capture = capture().await;
        let err = capture
            .capture_explicit(Uuid::new_v4(), None, "content", Vec::new(), None)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "validation_error");
    }

    #[tokio::test]
    async fn explicit_rejects_unknown_tag() {
        let capture = capture().await;
        let err = capture
            .capture_explicit(
                Uuid::new_v4(),
                None,
                "content",
                vec!["not_a_real_tag".into()],
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "validation_error");
    }

    #[tokio::test]
    async fn explicit_accepts_known_tags() {
        let capture = capture().await;
        let entry = capture
            .capture_explicit(
                Uuid::new_v4(),
                Some("reviewer-1".into()),
                "content",
                vec!["calculation_fix".into()],
                Some("fixed the wages box".into()),
            )
            .await
            .unwrap();
        assert_eq!(entry.tags, vec!["calculation_fix".to_string()]);
    }

    #[tokio::test]
    async fn for_task_returns_all_entries_for_that_task() {
        let capture = capture().await;
        let task_id = Uuid::new_v4();
        capture
            .capture_explicit(task_id, None, "c", vec!["judgment_call".into()], None)
            .await
            .unwrap();
        capture
            .capture_implicit(task_id, None, "a", "b")
            .await
            .unwrap();

        let entries = capture.for_task(task_id).await.unwrap();
        assert_eq!(entries.len(), 2);
    }
}

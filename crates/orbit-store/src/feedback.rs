use async_trait::async_trait;
use orbit_core::{FeedbackEntry, OrbitResult};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Append-only record of reviewer feedback. Entries are immutable once
/// written; there is deliberately no `update` or `delete` method.
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Persist a new feedback entry.
    async fn add(&self, entry: FeedbackEntry) -> OrbitResult<()>;

    /// All feedback owned by `task_id`, oldest first.
    async fn list_for_task(&self, task_id: Uuid) -> OrbitResult<Vec<FeedbackEntry>>;

    /// All feedback across every task, for aggregation into retrieval
    /// corpora.
    async fn all(&self) -> OrbitResult<Vec<FeedbackEntry>>;
}

/// File-backed feedback store: one append-only JSONL file per task.
pub struct FileFeedbackStore {
    dir: PathBuf,
    cache: RwLock<HashMap<Uuid, Vec<FeedbackEntry>>>,
}

impl FileFeedbackStore {
    /// Open (creating if absent) a feedback store rooted at `dir`.
    pub async fn new(dir: PathBuf) -> OrbitResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn path(&self, task_id: Uuid) -> PathBuf {
        self.dir.join(format!("{task_id}.feedback.jsonl"))
    }

    async fn load(&self, task_id: Uuid) -> OrbitResult<Vec<FeedbackEntry>> {
        let path = self.path(task_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let mut entries: Vec<FeedbackEntry> = data
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }
}

#[async_trait]
impl FeedbackStore for FileFeedbackStore {
    async fn add(&self, entry: FeedbackEntry) -> OrbitResult<()> {
        let path = self.path(entry.task_id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        let mut cache = self.cache.write().await;
        cache.entry(entry.task_id).or_default().push(entry);
        Ok(())
    }

    async fn list_for_task(&self, task_id: Uuid) -> OrbitResult<Vec<FeedbackEntry>> {
        if let Some(cached) = self.cache.read().await.get(&task_id) {
            return Ok(cached.clone());
        }
        let loaded = self.load(task_id).await?;
        self.cache.write().await.insert(task_id, loaded.clone());
        Ok(loaded)
    }

    async fn all(&self) -> OrbitResult<Vec<FeedbackEntry>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut all = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let Some(stem) = name.strip_suffix(".feedback.jsonl") else {
                continue;
            };
            let Ok(task_id) = Uuid::parse_str(stem) else {
                continue;
            };
            all.extend(self.list_for_task(task_id).await?);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use orbit_core::FeedbackKind;

    fn implicit_entry(task_id: Uuid) -> FeedbackEntry {
        FeedbackEntry {
            id: Uuid::new_v4(),
            task_id,
            kind: FeedbackKind::Implicit,
            reviewer_id: Some("reviewer-1".into()),
            tags: Vec::new(),
            original_content: "wages: 1000\ninterest: 100".into(),
            corrected_content: Some("wages: 1200\ninterest: 100".into()),
            diff_summary: Some("wages: 1000 -> 1200".into()),
            note: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn add_and_list_for_task_round_trips() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileFeedbackStore::new(tmp.path().to_path_buf()).await.unwrap();
        let task_id = Uuid::new_v4();
        store.add(implicit_entry(task_id)).await.unwrap();

        let rows = store.list_for_task(task_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, FeedbackKind::Implicit);
    }

    #[tokio::test]
    async fn all_aggregates_across_tasks() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileFeedbackStore::new(tmp.path().to_path_buf()).await.unwrap();
        store.add(implicit_entry(Uuid::new_v4())).await.unwrap();
        store.add(implicit_entry(Uuid::new_v4())).await.unwrap();

        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 2);
    }
}

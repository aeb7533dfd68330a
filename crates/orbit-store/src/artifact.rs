use async_trait::async_trait;
use orbit_core::{OrbitResult, TaskArtifact};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Append-only record of artifacts produced by task attempts.
///
/// Previous attempts are never overwritten: a new `add` call is always an
/// insert, never an update.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist a new artifact.
    async fn add(&self, artifact: TaskArtifact) -> OrbitResult<()>;

    /// All artifacts owned by `task_id`, oldest first.
    async fn list_for_task(&self, task_id: Uuid) -> OrbitResult<Vec<TaskArtifact>>;

    /// The most recent artifact of `kind` for `task_id`, if any.
    async fn latest_of_kind(
        &self,
        task_id: Uuid,
        kind: orbit_core::ArtifactKind,
    ) -> OrbitResult<Option<TaskArtifact>> {
        let mut all = self.list_for_task(task_id).await?;
        all.retain(|a| a.kind == kind);
        Ok(all.into_iter().max_by_key(|a| a.created_at))
    }
}

/// File-backed artifact store: one append-only JSONL file per task.
pub struct FileArtifactStore {
    dir: PathBuf,
    cache: RwLock<HashMap<Uuid, Vec<TaskArtifact>>>,
}

impl FileArtifactStore {
    /// Open (creating if absent) an artifact store rooted at `dir`.
    pub async fn new(dir: PathBuf) -> OrbitResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn path(&self, task_id: Uuid) -> PathBuf {
        self.dir.join(format!("{task_id}.artifacts.jsonl"))
    }

    async fn load(&self, task_id: Uuid) -> OrbitResult<Vec<TaskArtifact>> {
        let path = self.path(task_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let mut artifacts: Vec<TaskArtifact> = data
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        artifacts.sort_by_key(|a| a.created_at);
        Ok(artifacts)
    }
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn add(&self, artifact: TaskArtifact) -> OrbitResult<()> {
        let path = self.path(artifact.task_id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let mut line = serde_json::to_string(&artifact)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        let mut cache = self.cache.write().await;
        cache.entry(artifact.task_id).or_default().push(artifact);
        Ok(())
    }

    async fn list_for_task(&self, task_id: Uuid) -> OrbitResult<Vec<TaskArtifact>> {
        if let Some(cached) = self.cache.read().await.get(&task_id) {
            return Ok(cached.clone());
        }
        let loaded = self.load(task_id).await?;
        self.cache.write().await.insert(task_id, loaded.clone());
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_core::ArtifactKind;

    fn artifact(task_id: Uuid, kind: ArtifactKind, attempt: u32) -> TaskArtifact {
        TaskArtifact {
            id: Uuid::new_v4(),
            task_id,
            kind,
            path: format!("s3://bucket/{task_id}/{attempt}"),
            hash: "deadbeef".into(),
            attempt,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn previous_attempts_preserved() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileArtifactStore::new(tmp.path().to_path_buf()).await.unwrap();
        let task_id = Uuid::new_v4();

        store.add(artifact(task_id, ArtifactKind::Worksheet, 1)).await.unwrap();
        store.add(artifact(task_id, ArtifactKind::Worksheet, 2)).await.unwrap();

        let all = store.list_for_task(task_id).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].attempt, 1);
        assert_eq!(all[1].attempt, 2);
    }

    #[tokio::test]
    async fn latest_of_kind_picks_newest() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileArtifactStore::new(tmp.path().to_path_buf()).await.unwrap();
        let task_id = Uuid::new_v4();

        store.add(artifact(task_id, ArtifactKind::Worksheet, 1)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        store.add(artifact(task_id, ArtifactKind::Notes, 1)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let newest = artifact(task_id, ArtifactKind::Worksheet, 2);
        let newest_id = newest.id;
        store.add(newest).await.unwrap();

        let latest = store
            .latest_of_kind(task_id, ArtifactKind::Worksheet)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, newest_id);
    }
}

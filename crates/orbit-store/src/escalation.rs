use async_trait::async_trait;
use orbit_core::{OrbitError, OrbitResult};
use orbit_core::Escalation;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Durable record of escalations, one task may own several over its life.
#[async_trait]
pub trait EscalationStore: Send + Sync {
    /// Persist a new escalation.
    async fn add(&self, escalation: Escalation) -> OrbitResult<()>;

    /// All escalations owned by `task_id`, oldest first.
    async fn list_for_task(&self, task_id: Uuid) -> OrbitResult<Vec<Escalation>>;

    /// Mark an escalation resolved, storing `resolution` and `resolved_at`.
    async fn resolve(&self, id: Uuid, resolution: String) -> OrbitResult<Escalation>;
}

/// File-backed escalation store: one JSON file per task listing all of its
/// escalations (escalations are infrequent, so a full rewrite on resolve is
/// acceptable).
pub struct FileEscalationStore {
    dir: PathBuf,
    cache: RwLock<HashMap<Uuid, Vec<Escalation>>>,
}

impl FileEscalationStore {
    /// Open (creating if absent) an escalation store rooted at `dir`.
    pub async fn new(dir: PathBuf) -> OrbitResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn path(&self, task_id: Uuid) -> PathBuf {
        self.dir.join(format!("{task_id}.escalations.json"))
    }

    async fn load(&self, task_id: Uuid) -> OrbitResult<Vec<Escalation>> {
        let path = self.path(task_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&data)?)
    }

    async fn persist(&self, task_id: Uuid, rows: &[Escalation]) -> OrbitResult<()> {
        let json = serde_json::to_string_pretty(rows)?;
        tokio::fs::write(self.path(task_id), json).await?;
        Ok(())
    }

    /// Scan every escalation file on disk for `id`, covering a task whose
    /// escalations haven't been pulled into the cache yet by a prior
    /// `list_for_task` call.
    async fn find_on_disk(&self, id: Uuid) -> OrbitResult<Option<(Uuid, Vec<Escalation>)>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let Some(stem) = name.strip_suffix(".escalations.json") else {
                continue;
            };
            let Ok(task_id) = Uuid::parse_str(stem) else {
                continue;
            };
            let rows = self.load(task_id).await?;
            if rows.iter().any(|e| e.id == id) {
                return Ok(Some((task_id, rows)));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl EscalationStore for FileEscalationStore {
    async fn add(&self, escalation: Escalation) -> OrbitResult<()> {
        let task_id = escalation.task_id;
        let mut cache = self.cache.write().await;
        let rows = match cache.get(&task_id) {
            Some(r) => r.clone(),
            None => self.load(task_id).await?,
        };
        let mut rows = rows;
        rows.push(escalation);
        self.persist(task_id, &rows).await?;
        cache.insert(task_id, rows);
        Ok(())
    }

    async fn list_for_task(&self, task_id: Uuid) -> OrbitResult<Vec<Escalation>> {
        if let Some(cached) = self.cache.read().await.get(&task_id) {
            return Ok(cached.clone());
        }
        let loaded = self.load(task_id).await?;
        self.cache.write().await.insert(task_id, loaded.clone());
        Ok(loaded)
    }

    async fn resolve(&self, id: Uuid, resolution: String) -> OrbitResult<Escalation> {
        let found = {
            let cache = self.cache.read().await;
            cache
                .iter()
                .find(|(_, rows)| rows.iter().any(|e| e.id == id))
                .map(|(task_id, rows)| (*task_id, rows.clone()))
        };
        let found = match found {
            Some(hit) => Some(hit),
            None => self.find_on_disk(id).await?,
        };
        let Some((task_id, mut rows)) = found else {
            return Err(OrbitError::MissingResource(format!(
                "escalation {id} not found"
            )));
        };
        let Some(row) = rows.iter_mut().find(|e| e.id == id) else {
            return Err(OrbitError::MissingResource(format!(
                "escalation {id} not found"
            )));
        };
        row.resolved_at = Some(chrono::Utc::now());
        row.resolution = Some(resolution);
        let resolved = row.clone();

        self.persist(task_id, &rows).await?;
        self.cache.write().await.insert(task_id, rows);
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_and_list_round_trips() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileEscalationStore::new(tmp.path().to_path_buf()).await.unwrap();
        let task_id = Uuid::new_v4();
        let esc = Escalation::new(task_id, "low_confidence:W2", true);
        store.add(esc.clone()).await.unwrap();

        let rows = store.list_for_task(task_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reason, "low_confidence:W2");
        assert!(rows[0].resolved_at.is_none());
    }

    #[tokio::test]
    async fn resolve_sets_resolution_and_is_visible_after_cache_miss() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileEscalationStore::new(tmp.path().to_path_buf()).await.unwrap();
        let task_id = Uuid::new_v4();
        let esc = Escalation::new(task_id, "low_confidence:W2", true);
        let esc_id = esc.id;
        store.add(esc).await.unwrap();

        // A fresh store instance over the same directory has an empty cache,
        // exercising `find_on_disk` rather than the in-memory fast path.
        let reopened = FileEscalationStore::new(tmp.path().to_path_buf()).await.unwrap();
        let resolved = reopened
            .resolve(esc_id, "reviewer confirmed wages".into())
            .await
            .unwrap();
        assert_eq!(resolved.resolution.as_deref(), Some("reviewer confirmed wages"));
        assert!(resolved.resolved_at.is_some());

        let rows = reopened.list_for_task(task_id).await.unwrap();
        assert_eq!(rows[0].resolution.as_deref(), Some("reviewer confirmed wages"));
    }

    #[tokio::test]
    async fn resolve_unknown_id_is_missing_resource() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileEscalationStore::new(tmp.path().to_path_buf()).await.unwrap();
        let err = store.resolve(Uuid::new_v4(), "n/a".into()).await.unwrap_err();
        assert!(matches!(err, OrbitError::MissingResource(_)));
    }
}

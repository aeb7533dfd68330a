use async_trait::async_trait;
use chrono::{Duration, Utc};
use orbit_core::{AuthorKind, ClientProfileEntry, OrbitError, OrbitResult};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Entries older than this are excluded from the derived view (but kept in
/// `history`), per the Profile Service's retention rule.
pub const RETENTION: Duration = Duration::days(3 * 365);

/// Append-only log of client profile entries.
#[async_trait]
pub trait ProfileLogStore: Send + Sync {
    /// Append an immutable row. Rejects a `null` payload.
    async fn append(&self, entry: ClientProfileEntry) -> OrbitResult<()>;

    /// All entries for `client_id`, oldest first.
    async fn history_raw(&self, client_id: Uuid) -> OrbitResult<Vec<ClientProfileEntry>>;
}

/// File-backed, append-only per-client log (JSONL, one file per client).
pub struct FileProfileLogStore {
    dir: PathBuf,
    cache: RwLock<HashMap<Uuid, Vec<ClientProfileEntry>>>,
}

impl FileProfileLogStore {
    /// Open (creating if absent) a profile log store rooted at `dir`.
    pub async fn new(dir: PathBuf) -> OrbitResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn path(&self, client_id: Uuid) -> PathBuf {
        self.dir.join(format!("{client_id}.profile.jsonl"))
    }

    async fn load(&self, client_id: Uuid) -> OrbitResult<Vec<ClientProfileEntry>> {
        let path = self.path(client_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let mut entries: Vec<ClientProfileEntry> = data
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }
}

#[async_trait]
impl ProfileLogStore for FileProfileLogStore {
    async fn append(&self, entry: ClientProfileEntry) -> OrbitResult<()> {
        if entry.payload.is_null() {
            return Err(OrbitError::Validation(
                "profile entry payload must not be null".into(),
            ));
        }
        let path = self.path(entry.client_id);
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
        cache.entry(entry.client_id).or_default().push(entry);
        Ok(())
    }

    async fn history_raw(&self, client_id: Uuid) -> OrbitResult<Vec<ClientProfileEntry>> {
        if let Some(cached) = self.cache.read().await.get(&client_id) {
            return Ok(cached.clone());
        }
        let loaded = self.load(client_id).await?;
        self.cache.write().await.insert(client_id, loaded.clone());
        Ok(loaded)
    }
}

/// The Profile Service (C5): append + derive over a [`ProfileLogStore`].
///
/// `view` is always computed at read time — partition by `entry_type`,
/// order by `created_at` descending, take the first non-archived row. It is
/// never itself persisted as truth.
pub struct ProfileService<S: ProfileLogStore> {
    log: S,
}

impl<S: ProfileLogStore> ProfileService<S> {
    /// Wrap a [`ProfileLogStore`] with the derivation logic.
    pub fn new(log: S) -> Self {
        Self { log }
    }

    /// Append an immutable row. Entries past the retention window are
    /// marked `archived` automatically; the row itself is never deleted.
    pub async fn append(
        &self,
        client_id: Uuid,
        entry_type: impl Into<String>,
        payload: serde_json::Value,
        author_kind: AuthorKind,
        author_id: impl Into<String>,
    ) -> OrbitResult<ClientProfileEntry> {
        if payload.is_null() {
            return Err(OrbitError::Validation(
                "profile entry payload must not be null".into(),
            ));
        }
        let entry = ClientProfileEntry {
            id: Uuid::new_v4(),
            client_id,
            created_at: Utc::now(),
            author_kind,
            author_id: author_id.into(),
            entry_type: entry_type.into(),
            payload,
            effective_date: None,
            archived: false,
        };
        self.log.append(entry.clone()).await?;
        Ok(entry)
    }

    /// Derived `entry_type → latest payload` view, excluding archived rows.
    pub async fn view(&self, client_id: Uuid) -> OrbitResult<HashMap<String, serde_json::Value>> {
        let entries = self.effective_history(client_id).await?;
        let mut latest: HashMap<String, &ClientProfileEntry> = HashMap::new();
        for entry in &entries {
            if entry.archived {
                continue;
            }
            match latest.get(&entry.entry_type) {
                Some(existing) if existing.created_at >= entry.created_at => {}
                _ => {
                    latest.insert(entry.entry_type.clone(), entry);
                }
            }
        }
        Ok(latest
            .into_iter()
            .map(|(k, v)| (k, v.payload.clone()))
            .collect())
    }

    /// Chronological entries, optionally filtered by `entry_type`, including
    /// archived rows (they are only excluded from `view`).
    pub async fn history(
        &self,
        client_id: Uuid,
        entry_type: Option<&str>,
        limit: Option<usize>,
    ) -> OrbitResult<Vec<ClientProfileEntry>> {
        let mut entries = self.effective_history(client_id).await?;
        if let Some(et) = entry_type {
            entries.retain(|e| e.entry_type == et);
        }
        if let Some(n) = limit {
            entries.truncate(n);
        }
        Ok(entries)
    }

    /// Row count, optionally filtered by `entry_type`.
    pub async fn count(&self, client_id: Uuid, entry_type: Option<&str>) -> OrbitResult<usize> {
        let entries = self.log.history_raw(client_id).await?;
        Ok(match entry_type {
            Some(et) => entries.iter().filter(|e| e.entry_type == et).count(),
            None => entries.len(),
        })
    }

    async fn effective_history(&self, client_id: Uuid) -> OrbitResult<Vec<ClientProfileEntry>> {
        let cutoff = Utc::now() - RETENTION;
        let mut entries = self.log.history_raw(client_id).await?;
        for entry in &mut entries {
            if entry.created_at < cutoff {
                entry.archived = true;
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service() -> ProfileService<FileProfileLogStore> {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let log = FileProfileLogStore::new(tmp.path().to_path_buf())
            .await
            .expect("store");
        std::mem::forget(tmp);
        ProfileService::new(log)
    }

    #[tokio::test]
    async fn view_returns_latest_per_type() {
        let svc = service().await;
        let client = Uuid::new_v4();
        svc.append(
            client,
            "filing_status",
            serde_json::json!("single"),
            AuthorKind::Human,
            "reviewer-1",
        )
        .await
        .unwrap();
        svc.append(
            client,
            "filing_status",
            serde_json::json!("MFJ"),
            AuthorKind::Human,
            "reviewer-1",
        )
        .await
        .unwrap();
        svc.append(
            client,
            "income_source",
            serde_json::json!({"type": "W2"}),
            AuthorKind::Agent,
            "extractor",
        )
        .await
        .unwrap();

        let view = svc.view(client).await.unwrap();
        assert_eq!(view.get("filing_status").unwrap(), &serde_json::json!("MFJ"));
        assert!(view.contains_key("income_source"));
        assert_eq!(svc.history(client, None, None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn concurrent_appends_both_survive_as_history() {
        let svc = service().await;
        let client = Uuid::new_v4();
        let (a, b) = tokio::join!(
            svc.append(
                client,
                "income_source",
                serde_json::json!({"type": "W2"}),
                AuthorKind::Agent,
                "extractor",
            ),
            svc.append(
                client,
                "income_source",
                serde_json::json!({"type": "1099"}),
                AuthorKind::Agent,
                "extractor",
            ),
        );
        a.unwrap();
        b.unwrap();

        let history = svc.history(client, Some("income_source"), None).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn rejects_null_payload() {
        let svc = service().await;
        let client = Uuid::new_v4();
        let err = svc
            .append(client, "filing_status", serde_json::Value::Null, AuthorKind::Human, "r1")
            .await
            .unwrap_err();
        assert!(matches!(err, OrbitError::Validation(_)));
    }
}

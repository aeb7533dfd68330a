use async_trait::async_trait;
use orbit_core::{DocumentMeta, OrbitResult};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Metadata-only record of uploaded client documents, keyed by
/// `(client_id, tax_year)` for the Context Builder's resolution step.
/// Blob content lives behind a storage facade out of scope here — this
/// store only ever returns `storage_ref`, never bytes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Register a document's metadata. Fails with `IntegrityViolation` if
    /// `id` already exists.
    async fn add(&self, document: DocumentMeta) -> OrbitResult<()>;

    /// All documents for `(client_id, tax_year)`, oldest first.
    async fn list_for_client_year(
        &self,
        client_id: Uuid,
        tax_year: i32,
    ) -> OrbitResult<Vec<DocumentMeta>>;

    /// Fetch one document's metadata by id.
    async fn get(&self, id: Uuid) -> OrbitResult<Option<DocumentMeta>>;
}

/// File-backed document store: one JSON file per document, indexed in
/// memory by `(client_id, tax_year)` for the Context Builder's lookups.
pub struct FileDocumentStore {
    dir: PathBuf,
    cache: RwLock<HashMap<Uuid, DocumentMeta>>,
}

impl FileDocumentStore {
    /// Open (creating if absent) a document store rooted at `dir`, loading
    /// any existing document files into the in-memory cache.
    pub async fn new(dir: PathBuf) -> OrbitResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        let mut cache = HashMap::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };
            let Ok(id) = Uuid::parse_str(stem) else {
                continue;
            };
            let data = tokio::fs::read_to_string(entry.path()).await?;
            let document: DocumentMeta = serde_json::from_str(&data)?;
            cache.insert(id, document);
        }
        Ok(Self {
            dir,
            cache: RwLock::new(cache),
        })
    }

    fn path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn add(&self, document: DocumentMeta) -> OrbitResult<()> {
        let mut cache = self.cache.write().await;
        if cache.contains_key(&document.id) {
            return Err(orbit_core::OrbitError::IntegrityViolation(format!(
                "document {} already exists",
                document.id
            )));
        }
        let json = serde_json::to_string_pretty(&document)?;
        tokio::fs::write(self.path(document.id), json).await?;
        cache.insert(document.id, document);
        Ok(())
    }

    async fn list_for_client_year(
        &self,
        client_id: Uuid,
        tax_year: i32,
    ) -> OrbitResult<Vec<DocumentMeta>> {
        let cache = self.cache.read().await;
        let mut docs: Vec<DocumentMeta> = cache
            .values()
            .filter(|d| d.client_id == client_id && d.tax_year == tax_year)
            .cloned()
            .collect();
        docs.sort_by_key(|d| d.created_at);
        Ok(docs)
    }

    async fn get(&self, id: Uuid) -> OrbitResult<Option<DocumentMeta>> {
        Ok(self.cache.read().await.get(&id).cloned())
    }
}

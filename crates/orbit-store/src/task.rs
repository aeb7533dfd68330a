use async_trait::async_trait;
use orbit_core::{OrbitError, OrbitResult, Task, TaskStatus};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Filters accepted by [`TaskStore::list`].
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Restrict to this status.
    pub status: Option<TaskStatus>,
    /// Restrict to this client.
    pub client_id: Option<Uuid>,
    /// Restrict to this task type.
    pub task_type: Option<String>,
    /// Restrict to this assigned agent.
    pub assigned_agent: Option<String>,
    /// Maximum rows to return.
    pub limit: Option<usize>,
    /// Rows to skip before taking `limit`.
    pub offset: Option<usize>,
}

/// Durable record of tasks with per-task serialized mutation.
///
/// `compare_and_swap` is the only mutation entry point: the State Machine
/// is the sole caller, and every transition is expressed as "the row must
/// currently be in `expected`, else fail with `InvalidTransition`".
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a brand-new task. Fails with `IntegrityViolation` if the id
    /// already exists.
    async fn create(&self, task: Task) -> OrbitResult<()>;

    /// Fetch a task by id.
    async fn get(&self, id: Uuid) -> OrbitResult<Option<Task>>;

    /// List tasks matching `filter`, ordered by `created_at` ascending.
    async fn list(&self, filter: &TaskFilter) -> OrbitResult<Vec<Task>>;

    /// Atomically apply `mutate` to the task if and only if its current
    /// status equals `expected`. Returns the committed task.
    ///
    /// This is the only path that can change a task's state: it is how the
    /// State Machine (C8) enforces "exactly one transition wins" under
    /// concurrent dispatch (property 10).
    async fn compare_and_swap(
        &self,
        id: Uuid,
        expected: TaskStatus,
        mutate: Box<dyn FnOnce(&mut Task) + Send>,
    ) -> OrbitResult<Task>;

    /// Renew `heartbeat_at` for a running task. Not a lifecycle transition
    /// (no status check, no CAS) — a handler calls this periodically while
    /// it runs so the liveness supervisor can tell a slow task from a dead
    /// one (§4.2 "Partial state").
    async fn touch_heartbeat(&self, id: Uuid) -> OrbitResult<()>;
}

/// File-backed [`TaskStore`]: one JSON file per task, a write-through
/// in-memory cache, and a named async lock per task id guarding
/// `compare_and_swap`.
pub struct FileTaskStore {
    dir: PathBuf,
    cache: RwLock<HashMap<Uuid, Task>>,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl FileTaskStore {
    /// Open (creating if absent) a task store rooted at `dir`, loading any
    /// existing task files into the in-memory cache.
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
            let task: Task = serde_json::from_str(&data)?;
            cache.insert(id, task);
        }
        Ok(Self {
            dir,
            cache: RwLock::new(cache),
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn write_through(&self, task: &Task) -> OrbitResult<()> {
        let json = serde_json::to_string_pretty(task)?;
        tokio::fs::write(self.path(task.id), json).await?;
        Ok(())
    }

    async fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn create(&self, task: Task) -> OrbitResult<()> {
        let mut cache = self.cache.write().await;
        if cache.contains_key(&task.id) {
            return Err(OrbitError::IntegrityViolation(format!(
                "task {} already exists",
                task.id
            )));
        }
        self.write_through(&task).await?;
        cache.insert(task.id, task);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> OrbitResult<Option<Task>> {
        Ok(self.cache.read().await.get(&id).cloned())
    }

    async fn list(&self, filter: &TaskFilter) -> OrbitResult<Vec<Task>> {
        let cache = self.cache.read().await;
        let mut tasks: Vec<Task> = cache
            .values()
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| filter.client_id.map_or(true, |c| t.client_id == c))
            .filter(|t| {
                filter
                    .task_type
                    .as_ref()
                    .map_or(true, |tt| &t.task_type == tt)
            })
            .filter(|t| {
                filter
                    .assigned_agent
                    .as_ref()
                    .map_or(true, |a| t.assigned_agent.as_ref() == Some(a))
            })
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        let offset = filter.offset.unwrap_or(0);
        let tasks = tasks.into_iter().skip(offset);
        Ok(match filter.limit {
            Some(n) => tasks.take(n).collect(),
            None => tasks.collect(),
        })
    }

    async fn compare_and_swap(
        &self,
        id: Uuid,
        expected: TaskStatus,
        mutate: Box<dyn FnOnce(&mut Task) + Send>,
    ) -> OrbitResult<Task> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut task = {
            let cache = self.cache.read().await;
            cache
                .get(&id)
                .cloned()
                .ok_or_else(|| OrbitError::MissingResource(format!("task {id} not found")))?
        };
        if task.status != expected {
            return Err(OrbitError::InvalidTransition(format!(
                "task {id} is {:?}, expected {:?}",
                task.status, expected
            )));
        }
        mutate(&mut task);
        self.write_through(&task).await?;
        self.cache.write().await.insert(id, task.clone());
        Ok(task)
    }

    async fn touch_heartbeat(&self, id: Uuid) -> OrbitResult<()> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut task = {
            let cache = self.cache.read().await;
            cache
                .get(&id)
                .cloned()
                .ok_or_else(|| OrbitError::MissingResource(format!("task {id} not found")))?
        };
        task.heartbeat_at = Some(chrono::Utc::now());
        self.write_through(&task).await?;
        self.cache.write().await.insert(id, task);
        Ok(())
    }
}

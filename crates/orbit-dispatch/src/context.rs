//! The Context Builder (C6): assembles `{profile view, documents, skills,
//! prior year artifact}` for a task, reading from C1/C4/C5 and nothing
//! else. Side-effect-free besides the reads it performs.

use async_trait::async_trait;
use orbit_core::{DocumentMeta, OrbitResult, Skill, Task, TaskArtifact, TaskStatus};
use orbit_skills::SkillEngine;
use orbit_store::{ArtifactStore, DocumentStore, ProfileLogStore, ProfileService, SkillStore, TaskFilter, TaskStore};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// The assembled execution context a handler receives alongside its task.
#[derive(Debug, Clone)]
pub struct AgentContext {
    /// Latest-per-`entry_type` view of the client's profile log.
    pub client_profile_view: HashMap<String, Value>,
    /// Document metadata for `(client_id, tax_year)`. Content is fetched
    /// lazily by the handler via `storage_ref`.
    pub documents: Vec<DocumentMeta>,
    /// Skills selected for `tax_year`, in the order their names were
    /// declared for this task's `task_type`.
    pub skills: Vec<Skill>,
    /// The latest completed `worksheet` artifact from the prior tax year,
    /// if one exists.
    pub prior_year_artifact: Option<TaskArtifact>,
}

/// Object-safe entry point a [`crate::dispatcher::Dispatcher`] holds
/// without propagating every backing store's generic parameter through its
/// own type signature.
#[async_trait]
pub trait BuildContext: Send + Sync {
    /// Assemble an [`AgentContext`] for `task`.
    async fn build(&self, task: &Task) -> OrbitResult<AgentContext>;
}

/// The Context Builder: wires the Profile Service, the document metadata
/// store, the Skill Engine, and the task/artifact stores needed to resolve
/// a prior-year worksheet.
pub struct ContextBuilder<P, D, Sk, A, T>
where
    P: ProfileLogStore,
    D: DocumentStore,
    Sk: SkillStore,
    A: ArtifactStore,
    T: TaskStore,
{
    profile: Arc<ProfileService<P>>,
    documents: Arc<D>,
    skills: Arc<SkillEngine<Sk>>,
    artifacts: Arc<A>,
    tasks: Arc<T>,
    /// `task_type → [skill_name…]`, declared by the Dispatcher's caller
    /// (§4.6 step 3).
    skills_for_task_type: HashMap<String, Vec<String>>,
}

impl<P, D, Sk, A, T> ContextBuilder<P, D, Sk, A, T>
where
    P: ProfileLogStore,
    D: DocumentStore,
    Sk: SkillStore,
    A: ArtifactStore,
    T: TaskStore,
{
    /// Wire a Context Builder over its backing stores and the
    /// `task_type → skills` declaration.
    pub fn new(
        profile: Arc<ProfileService<P>>,
        documents: Arc<D>,
        skills: Arc<SkillEngine<Sk>>,
        artifacts: Arc<A>,
        tasks: Arc<T>,
        skills_for_task_type: HashMap<String, Vec<String>>,
    ) -> Self {
        Self {
            profile,
            documents,
            skills,
            artifacts,
            tasks,
            skills_for_task_type,
        }
    }

    async fn prior_year_artifact(&self, task: &Task) -> OrbitResult<Option<TaskArtifact>> {
        let Some(tax_year) = task.tax_year else {
            return Ok(None);
        };
        let prior_year = tax_year - 1;

        let filter = TaskFilter {
            client_id: Some(task.client_id),
            task_type: Some(task.task_type.clone()),
            status: Some(TaskStatus::Completed),
            ..Default::default()
        };
        let candidates = self.tasks.list(&filter).await?;

        let mut best: Option<TaskArtifact> = None;
        for candidate in candidates.into_iter().filter(|t| t.tax_year == Some(prior_year)) {
            if let Some(artifact) = self
                .artifacts
                .latest_of_kind(candidate.id, orbit_core::ArtifactKind::Worksheet)
                .await?
            {
                let newer = best
                    .as_ref()
                    .map(|b| artifact.created_at > b.created_at)
                    .unwrap_or(true);
                if newer {
                    best = Some(artifact);
                }
            }
        }
        Ok(best)
    }
}

#[async_trait]
impl<P, D, Sk, A, T> BuildContext for ContextBuilder<P, D, Sk, A, T>
where
    P: ProfileLogStore,
    D: DocumentStore,
    Sk: SkillStore,
    A: ArtifactStore,
    T: TaskStore,
{
    async fn build(&self, task: &Task) -> OrbitResult<AgentContext> {
        let client_profile_view = self.profile.view(task.client_id).await?;

        let documents = match task.tax_year {
            Some(tax_year) => self.documents.list_for_client_year(task.client_id, tax_year).await?,
            None => Vec::new(),
        };

        let skill_names = self
            .skills_for_task_type
            .get(&task.task_type)
            .cloned()
            .unwrap_or_default();
        let skills = match task.tax_year {
            Some(tax_year) => self.skills.select_many(&skill_names, tax_year).await?,
            None => Vec::new(),
        };

        let prior_year_artifact = self.prior_year_artifact(task).await?;

        Ok(AgentContext {
            client_profile_view,
            documents,
            skills,
            prior_year_artifact,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_core::{ArtifactKind, AuthorKind};
    use orbit_store::{FileArtifactStore, FileDocumentStore, FileProfileLogStore, FileSkillStore, FileTaskStore};
    use uuid::Uuid;

    async fn builder() -> (
        ContextBuilder<FileProfileLogStore, FileDocumentStore, FileSkillStore, FileArtifactStore, FileTaskStore>,
        Arc<FileTaskStore>,
        Arc<FileArtifactStore>,
    ) {
        let tmp = tempfile::TempDir::new().unwrap();
        let profile = Arc::new(ProfileService::new(
            FileProfileLogStore::new(tmp.path().join("profile")).await.unwrap(),
        ));
        let documents = Arc::new(FileDocumentStore::new(tmp.path().join("documents")).await.unwrap());
        let skills = Arc::new(SkillEngine::new(Arc::new(
            FileSkillStore::new(tmp.path().join("skills")).await.unwrap(),
        )));
        let artifacts = Arc::new(FileArtifactStore::new(tmp.path().join("artifacts")).await.unwrap());
        let tasks = Arc::new(FileTaskStore::new(tmp.path().join("tasks")).await.unwrap());
        std::mem::forget(tmp);

        let mut skills_for_task_type = HashMap::new();
        skills_for_task_type.insert("personal_tax".to_string(), vec!["w2".to_string()]);

        let builder = ContextBuilder::new(profile, documents, skills, artifacts.clone(), tasks.clone(), skills_for_task_type);
        (builder, tasks, artifacts)
    }

    #[tokio::test]
    async fn assembles_profile_view_and_documents() {
        let (builder, tasks, _artifacts) = builder().await;
        let client = Uuid::new_v4();
        builder
            .profile
            .append(
                client,
                "filing_status",
                serde_json::json!("MFJ"),
                AuthorKind::Human,
                "reviewer-1",
            )
            .await
            .unwrap();
        builder
            .documents
            .add(DocumentMeta {
                id: Uuid::new_v4(),
                client_id: client,
                tax_year: 2024,
                document_type: "w2".into(),
                storage_ref: "s3://bucket/w2".into(),
                file_name: None,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let task = Task::new(client, "personal_tax", Some(2024));
        tasks.create(task.clone()).await.unwrap();

        let context = builder.build(&task).await.unwrap();
        assert_eq!(
            context.client_profile_view.get("filing_status").unwrap(),
            &serde_json::json!("MFJ")
        );
        assert_eq!(context.documents.len(), 1);
        assert!(context.prior_year_artifact.is_none());
    }

    #[tokio::test]
    async fn finds_prior_year_completed_worksheet() {
        let (builder, tasks, artifacts) = builder().await;
        let client = Uuid::new_v4();

        let mut prior_task = Task::new(client, "personal_tax", Some(2023));
        prior_task.status = TaskStatus::Completed;
        let prior_id = prior_task.id;
        tasks.create(prior_task).await.unwrap();
        artifacts
            .add(TaskArtifact {
                id: Uuid::new_v4(),
                task_id: prior_id,
                kind: ArtifactKind::Worksheet,
                path: "s3://bucket/prior".into(),
                hash: "abc".into(),
                attempt: 1,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let task = Task::new(client, "personal_tax", Some(2024));
        tasks.create(task.clone()).await.unwrap();

        let context = builder.build(&task).await.unwrap();
        assert_eq!(context.prior_year_artifact.unwrap().task_id, prior_id);
    }
}

//! End-to-end dispatch test covering the seed scenarios of a personal-tax
//! task: the happy path (assign → start → handler → complete, with
//! worksheet/notes artifacts and a monotonic progress trail) and an
//! escalation path driven by a skill's `escalation_triggers`.
//!
//! Exercises the full stack a real worker wires together: Store, KV,
//! Skill Engine, Profile Service, Context Builder, Progress Bus, State
//! Machine, and Dispatcher — no mocks below the handler.

use async_trait::async_trait;
use orbit_core::{ArtifactKind, AuthorKind, DocumentMeta, OrbitResult, Task, TaskArtifact, TaskStatus};
use orbit_dispatch::context::{AgentContext, ContextBuilder};
use orbit_dispatch::dispatcher::{DispatchConfig, Dispatcher};
use orbit_dispatch::handler::{HandlerEnv, HandlerOutcome, TaskHandler};
use orbit_dispatch::registry::HandlerRegistry;
use orbit_kv::InMemoryKv;
use orbit_progress::ProgressBus;
use orbit_skills::SkillEngine;
use orbit_state::StateMachine;
use orbit_store::{
    ArtifactStore, FileArtifactStore, FileDocumentStore, FileEscalationStore, FileProfileLogStore,
    FileSkillStore, FileTaskStore, ProfileService, TaskStore,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

const W2_SKILL: &str = r#"
metadata:
  name: w2_extraction
  version: "1.0.0"
  effective_date: "2023-01-01"
  tags: [extraction, w2]
content:
  instructions: "Extract wages and federal withholding from a W-2."
  examples: ["box 1: 50000 -> wages=50000"]
  constraints: ["never infer a missing box"]
  escalation_triggers: ["illegible scan"]
"#;

/// Stands in for the out-of-scope LLM vision extraction + tax
/// calculation: walks the standard progress stages and either completes
/// with a worksheet + notes artifact, or escalates when the task's
/// metadata flags a low-confidence extraction, mirroring the skill's
/// `escalation_triggers`.
struct PersonalTaxHandler;

#[async_trait]
impl TaskHandler for PersonalTaxHandler {
    fn task_type(&self) -> &str {
        "personal_tax"
    }
    fn agent_name(&self) -> &str {
        "w2_extraction_agent"
    }

    async fn handle(&self, task: &Task, context: &AgentContext, env: &HandlerEnv) -> OrbitResult<HandlerOutcome> {
        assert_eq!(
            context.client_profile_view.get("filing_status"),
            Some(&serde_json::json!("MFJ"))
        );
        assert_eq!(context.skills.len(), 1);
        assert_eq!(context.skills[0].name, "w2_extraction");

        env.progress.publish(task.id, "scanning", 20, "reading document pages").await?;
        env.progress.publish(task.id, "extracting", 60, "pulling W-2 boxes").await?;

        let low_confidence = task
            .metadata
            .get("simulate_low_confidence")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if low_confidence {
            return Ok(HandlerOutcome::Escalated {
                reason: "low_confidence:W2".into(),
                context: serde_json::json!({ "form": "W2", "field": "box1_wages" }),
                blocking: true,
            });
        }

        env.progress.publish(task.id, "calculating", 85, "applying worksheet rules").await?;

        env.artifacts
            .add(TaskArtifact {
                id: Uuid::new_v4(),
                task_id: task.id,
                kind: ArtifactKind::Worksheet,
                path: "mem://worksheet".into(),
                hash: "h1".into(),
                attempt: task.attempt_count + 1,
                created_at: chrono::Utc::now(),
            })
            .await?;
        env.artifacts
            .add(TaskArtifact {
                id: Uuid::new_v4(),
                task_id: task.id,
                kind: ArtifactKind::Notes,
                path: "mem://notes".into(),
                hash: "h2".into(),
                attempt: task.attempt_count + 1,
                created_at: chrono::Utc::now(),
            })
            .await?;

        env.progress
            .publish_terminal(task.id, "generating", 100, "done", TaskStatus::Completed)
            .await?;
        Ok(HandlerOutcome::Completed)
    }
}

type Fixture = (
    Dispatcher<FileTaskStore, FileEscalationStore>,
    Arc<FileTaskStore>,
    Arc<FileArtifactStore>,
    Arc<FileEscalationStore>,
    Arc<ProgressBus>,
    Arc<ProfileService<FileProfileLogStore>>,
);

async fn wire_stack() -> Fixture {
    let tmp = tempfile::TempDir::new().unwrap();

    let tasks = Arc::new(FileTaskStore::new(tmp.path().join("tasks")).await.unwrap());
    let escalations = Arc::new(FileEscalationStore::new(tmp.path().join("escalations")).await.unwrap());
    let artifacts = Arc::new(FileArtifactStore::new(tmp.path().join("artifacts")).await.unwrap());
    let documents = Arc::new(FileDocumentStore::new(tmp.path().join("documents")).await.unwrap());
    let skill_store = Arc::new(FileSkillStore::new(tmp.path().join("skills")).await.unwrap());
    let profile = Arc::new(ProfileService::new(
        FileProfileLogStore::new(tmp.path().join("profile")).await.unwrap(),
    ));
    let agent_log = Arc::new(orbit_store::AgentLog::new(tmp.path().join("logs")));
    // `tempfile::TempDir` removes its directory on drop; every store above
    // keeps only a `PathBuf`, so the fixture must outlive the directory.
    std::mem::forget(tmp);

    let skills = Arc::new(SkillEngine::new(skill_store));
    skills.load(W2_SKILL).await.unwrap();

    let mut skills_for_task_type = HashMap::new();
    skills_for_task_type.insert("personal_tax".to_string(), vec!["w2_extraction".to_string()]);

    let context_builder = Arc::new(ContextBuilder::new(
        profile.clone(),
        documents,
        skills,
        artifacts.clone(),
        tasks.clone(),
        skills_for_task_type,
    ));

    let kv = Arc::new(InMemoryKv::new());
    let progress = Arc::new(ProgressBus::new(kv));

    let state_machine = Arc::new(StateMachine::new(tasks.clone(), escalations.clone()));
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(PersonalTaxHandler));

    let dispatcher = Dispatcher::new(
        tasks.clone(),
        state_machine,
        Arc::new(registry),
        context_builder,
        progress.clone(),
        artifacts.clone(),
        agent_log,
        DispatchConfig::default(),
    );

    (dispatcher, tasks, artifacts, escalations, progress, profile)
}

async fn seed_client_and_task(profile: &ProfileService<FileProfileLogStore>, tasks: &FileTaskStore, simulate_low_confidence: bool) -> (Uuid, Uuid) {
    let client_id = Uuid::new_v4();
    profile
        .append(client_id, "filing_status", serde_json::json!("MFJ"), AuthorKind::Human, "reviewer-1")
        .await
        .unwrap();

    let mut task = Task::new(client_id, "personal_tax", Some(2024));
    if simulate_low_confidence {
        task.metadata.insert("simulate_low_confidence".into(), serde_json::json!(true));
    }
    let task_id = task.id;
    tasks.create(task).await.unwrap();
    (client_id, task_id)
}

#[tokio::test]
async fn s1_happy_path_completes_with_artifacts_and_monotonic_progress() {
    let (dispatcher, tasks, artifacts, _escalations, progress, profile) = wire_stack().await;
    let (_client_id, task_id) = seed_client_and_task(&profile, &tasks, false).await;

    let processed = dispatcher.dispatch_once().await.unwrap();
    assert_eq!(processed, Some(task_id));

    let task = tasks.get(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.assigned_agent.as_deref(), Some("w2_extraction_agent"));
    assert!(task.completed_at.is_some());

    let stored = artifacts.list_for_task(task_id).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().any(|a| a.kind == ArtifactKind::Worksheet));
    assert!(stored.iter().any(|a| a.kind == ArtifactKind::Notes));

    let snapshot = progress.snapshot(task_id).await.unwrap().unwrap();
    assert_eq!(snapshot.percent, 100);
    assert_eq!(snapshot.stage, "generating");
}

#[tokio::test]
async fn s3_low_confidence_escalates_and_blocks() {
    let (dispatcher, tasks, artifacts, escalations, _progress, profile) = wire_stack().await;
    let (_client_id, task_id) = seed_client_and_task(&profile, &tasks, true).await;

    dispatcher.dispatch_once().await.unwrap();

    let task = tasks.get(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Escalated);

    let rows = escalations.list_for_task(task_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].blocking);
    assert_eq!(rows[0].reason, "low_confidence:W2");
    assert!(rows[0].resolved_at.is_none());

    // No worksheet was produced before the escalating return.
    assert!(artifacts.list_for_task(task_id).await.unwrap().is_empty());
}

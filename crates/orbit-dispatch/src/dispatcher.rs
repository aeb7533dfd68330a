//! The Dispatcher (C9): leases pending tasks, routes them to their
//! registered handler, and maps the handler's result to exactly one
//! State Machine transition (§4.2).

use crate::context::BuildContext;
use crate::handler::{HandlerEnv, HandlerOutcome};
use crate::registry::HandlerRegistry;
use orbit_core::{Escalation, OrbitError, OrbitResult, Task, TaskStatus};
use orbit_progress::ProgressBus;
use orbit_state::StateMachine;
use orbit_store::{ArtifactStore, EscalationStore, TaskFilter, TaskStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Tunables for a [`Dispatcher`] round.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Ceiling on one handler invocation's wall-time (§5, default 60 min).
    pub handler_timeout: Duration,
    /// How many pending tasks to consider leasing in one `dispatch_once`
    /// call, bounding the work done per poll.
    pub lease_batch: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(60 * 60),
            lease_batch: 10,
        }
    }
}

/// The Dispatcher: one lease-assign-start-invoke-map cycle per call to
/// [`Self::dispatch_once`], or a polling loop via [`Self::run_forever`].
pub struct Dispatcher<T: TaskStore, E: EscalationStore> {
    tasks: Arc<T>,
    state_machine: Arc<StateMachine<T, E>>,
    registry: Arc<HandlerRegistry>,
    context_builder: Arc<dyn BuildContext>,
    progress: Arc<ProgressBus>,
    artifacts: Arc<dyn ArtifactStore>,
    agent_log: Arc<orbit_store::AgentLog>,
    config: DispatchConfig,
    shutdown: CancellationToken,
}

impl<T: TaskStore, E: EscalationStore> Dispatcher<T, E> {
    /// Wire a Dispatcher over its backing stores, handler registry, and
    /// Context Builder.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tasks: Arc<T>,
        state_machine: Arc<StateMachine<T, E>>,
        registry: Arc<HandlerRegistry>,
        context_builder: Arc<dyn BuildContext>,
        progress: Arc<ProgressBus>,
        artifacts: Arc<dyn ArtifactStore>,
        agent_log: Arc<orbit_store::AgentLog>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            tasks,
            state_machine,
            registry,
            context_builder,
            progress,
            artifacts,
            agent_log,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// A token whose cancellation is propagated to every handler
    /// invocation this Dispatcher starts from now on.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Signal every in-flight and future handler invocation to stop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Lease and drive at most one pending task through to a terminal
    /// handler outcome. Returns the task id processed, or `None` if no
    /// pending task was available (or every candidate lost its lease race
    /// to another worker).
    pub async fn dispatch_once(&self) -> OrbitResult<Option<Uuid>> {
        let filter = TaskFilter {
            status: Some(TaskStatus::Pending),
            limit: Some(self.config.lease_batch),
            ..Default::default()
        };
        let candidates = self.tasks.list(&filter).await?;

        for task in candidates {
            let Some(handler) = self.registry.get(&task.task_type) else {
                self.state_machine.fail_unleased(task.id, "no_handler").await?;
                self.agent_log.record(task.id, None, "no_handler", json!({ "task_type": task.task_type }));
                return Ok(Some(task.id));
            };

            match self.state_machine.assign(task.id, handler.agent_name()).await {
                Ok(_) => {}
                Err(OrbitError::InvalidTransition(_)) => {
                    // Another worker won the lease race; move to the next candidate.
                    continue;
                }
                Err(err) => return Err(err),
            }
            self.agent_log.record(
                task.id,
                Some(handler.agent_name().to_string()),
                "leased",
                json!({}),
            );

            let started = self.state_machine.start(task.id).await?;
            self.agent_log.record(task.id, Some(handler.agent_name().to_string()), "started", json!({}));

            let outcome = self.invoke(&started, handler).await;
            self.apply_outcome(&started, outcome).await?;
            return Ok(Some(task.id));
        }

        Ok(None)
    }

    async fn invoke(
        &self,
        task: &Task,
        handler: Arc<dyn crate::handler::TaskHandler>,
    ) -> OrbitResult<HandlerOutcome> {
        let context = self.context_builder.build(task).await?;
        let env = HandlerEnv {
            progress: self.progress.clone(),
            artifacts: self.artifacts.clone(),
            cancel: self.shutdown.child_token(),
        };

        match tokio::time::timeout(self.config.handler_timeout, handler.handle(task, &context, &env)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                warn!(task_id = %task.id, "handler exceeded wall-time ceiling");
                Err(OrbitError::TransientUpstream("handler timed out".into()))
            }
        }
    }

    async fn apply_outcome(&self, task: &Task, outcome: OrbitResult<HandlerOutcome>) -> OrbitResult<()> {
        match outcome {
            Ok(HandlerOutcome::Completed) => {
                self.state_machine.complete(task.id).await?;
                self.agent_log.record(task.id, task.assigned_agent.clone(), "completed", json!({}));
            }
            Ok(HandlerOutcome::Failed { reason }) => {
                self.state_machine.fail(task.id, reason.clone()).await?;
                self.agent_log
                    .record(task.id, task.assigned_agent.clone(), "failed", json!({ "reason": reason }));
            }
            Ok(HandlerOutcome::Escalated { reason, context, blocking }) => {
                let mut escalation = Escalation::new(task.id, reason.clone(), blocking);
                escalation.context = context;
                self.state_machine.escalate(task.id, escalation).await?;
                self.agent_log
                    .record(task.id, task.assigned_agent.clone(), "escalated", json!({ "reason": reason }));
            }
            Err(err) => {
                let reason = err.reason().to_string();
                self.state_machine.fail(task.id, reason.clone()).await?;
                self.agent_log
                    .record(task.id, task.assigned_agent.clone(), "failed", json!({ "reason": reason }));
            }
        }
        Ok(())
    }

    /// Poll [`Self::dispatch_once`] until [`Self::shutdown`] is called,
    /// sleeping `idle_interval` whenever a round finds nothing to lease.
    pub async fn run_forever(&self, idle_interval: Duration) {
        info!("dispatcher loop starting");
        loop {
            if self.shutdown.is_cancelled() {
                info!("dispatcher loop stopping: shutdown requested");
                return;
            }
            match self.dispatch_once().await {
                Ok(Some(_)) => {}
                Ok(None) => tokio::time::sleep(idle_interval).await,
                Err(err) => {
                    warn!(error = %err, "dispatch round failed");
                    tokio::time::sleep(idle_interval).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AgentContext, BuildContext};
    use async_trait::async_trait;
    use orbit_core::OrbitResult as CoreResult;
    use orbit_kv::InMemoryKv;
    use orbit_store::{FileArtifactStore, FileEscalationStore, FileTaskStore};
    use std::collections::HashMap;

    struct StaticContextBuilder;

    #[async_trait]
    impl BuildContext for StaticContextBuilder {
        async fn build(&self, _task: &Task) -> CoreResult<AgentContext> {
            Ok(AgentContext {
                client_profile_view: HashMap::new(),
                documents: Vec::new(),
                skills: Vec::new(),
                prior_year_artifact: None,
            })
        }
    }

    struct ScriptedHandler {
        outcome: HandlerOutcome,
    }

    #[async_trait]
    impl crate::handler::TaskHandler for ScriptedHandler {
        fn task_type(&self) -> &str {
            "personal_tax"
        }
        fn agent_name(&self) -> &str {
            "scripted_agent"
        }
        async fn handle(
            &self,
            _task: &Task,
            _context: &AgentContext,
            _env: &HandlerEnv,
        ) -> CoreResult<HandlerOutcome> {
            Ok(self.outcome.clone())
        }
    }

    async fn dispatcher(outcome: HandlerOutcome) -> (Dispatcher<FileTaskStore, FileEscalationStore>, Arc<FileTaskStore>) {
        let tmp = tempfile::TempDir::new().unwrap();
        let tasks = Arc::new(FileTaskStore::new(tmp.path().join("tasks")).await.unwrap());
        let escalations = Arc::new(FileEscalationStore::new(tmp.path().join("escalations")).await.unwrap());
        let artifacts: Arc<dyn ArtifactStore> =
            Arc::new(FileArtifactStore::new(tmp.path().join("artifacts")).await.unwrap());
        let agent_log = Arc::new(orbit_store::AgentLog::new(tmp.path().join("logs")));
        std::mem::forget(tmp);

        let sm = Arc::new(StateMachine::new(tasks.clone(), escalations));
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(ScriptedHandler { outcome }));

        let progress = Arc::new(ProgressBus::new(Arc::new(InMemoryKv::new())));
        let dispatcher = Dispatcher::new(
            tasks.clone(),
            sm,
            Arc::new(registry),
            Arc::new(StaticContextBuilder),
            progress,
            artifacts,
            agent_log,
            DispatchConfig::default(),
        );
        (dispatcher, tasks)
    }

    #[tokio::test]
    async fn completed_outcome_drives_task_to_completed() {
        let (dispatcher, tasks) = dispatcher(HandlerOutcome::Completed).await;
        let task = Task::new(Uuid::new_v4(), "personal_tax", Some(2024));
        let id = task.id;
        tasks.create(task).await.unwrap();

        let processed = dispatcher.dispatch_once().await.unwrap();
        assert_eq!(processed, Some(id));

        let final_task = tasks.get(id).await.unwrap().unwrap();
        assert_eq!(final_task.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn failed_outcome_drives_task_to_failed_with_reason() {
        let (dispatcher, tasks) = dispatcher(HandlerOutcome::Failed {
            reason: "low_confidence".into(),
        })
        .await;
        let task = Task::new(Uuid::new_v4(), "personal_tax", Some(2024));
        let id = task.id;
        tasks.create(task).await.unwrap();

        dispatcher.dispatch_once().await.unwrap();

        let final_task = tasks.get(id).await.unwrap().unwrap();
        assert_eq!(final_task.status, TaskStatus::Failed);
        assert_eq!(
            final_task.metadata.get("reason").and_then(|v| v.as_str()),
            Some("low_confidence")
        );
    }

    #[tokio::test]
    async fn escalated_outcome_drives_task_to_escalated() {
        let (dispatcher, tasks) = dispatcher(HandlerOutcome::Escalated {
            reason: "low_confidence:W2".into(),
            context: json!({ "form": "W2" }),
            blocking: true,
        })
        .await;
        let task = Task::new(Uuid::new_v4(), "personal_tax", Some(2024));
        let id = task.id;
        tasks.create(task).await.unwrap();

        dispatcher.dispatch_once().await.unwrap();

        let final_task = tasks.get(id).await.unwrap().unwrap();
        assert_eq!(final_task.status, TaskStatus::Escalated);
    }

    #[tokio::test]
    async fn unregistered_task_type_fails_with_no_handler() {
        let (dispatcher, tasks) = dispatcher(HandlerOutcome::Completed).await;
        let task = Task::new(Uuid::new_v4(), "business_tax", Some(2024));
        let id = task.id;
        tasks.create(task).await.unwrap();

        dispatcher.dispatch_once().await.unwrap();

        let final_task = tasks.get(id).await.unwrap().unwrap();
        assert_eq!(final_task.status, TaskStatus::Failed);
        assert_eq!(
            final_task.metadata.get("reason").and_then(|v| v.as_str()),
            Some("no_handler")
        );
    }

    #[tokio::test]
    async fn empty_queue_returns_none() {
        let (dispatcher, _tasks) = dispatcher(HandlerOutcome::Completed).await;
        assert_eq!(dispatcher.dispatch_once().await.unwrap(), None);
    }
}

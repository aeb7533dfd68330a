//! The `orbit` binary: wires every `orbit-*` crate into a running
//! gateway plus its background dispatch and supervisor loops, in
//! security → storage → skills → agent → gateway order.

mod config;

use crate::config::Config;
use clap::{Parser, Subcommand};
use orbit_dispatch::{ContextBuilder, DispatchConfig, Dispatcher, HandlerRegistry, Supervisor, SupervisorConfig};
use orbit_feedback::FeedbackCapture;
use orbit_gateway::{AppState, GatewayServer, RateLimiter};
use orbit_gateway::middleware::AuthConfig;
use orbit_kv::InMemoryKv;
use orbit_progress::ProgressBus;
use orbit_skills::SkillEngine;
use orbit_state::StateMachine;
use orbit_store::{
    FileArtifactStore, FileDocumentStore, FileEscalationStore, FileFeedbackStore,
    FileProfileLogStore, FileSkillStore, FileTaskStore, ProfileService,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "orbit", about = "Orbit task orchestration core")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway, the dispatch loop, and the retry/liveness supervisor.
    Serve {
        /// Bind host (overrides `ORBIT_HOST`).
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides `ORBIT_PORT`).
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Create the on-disk store layout under the configured data directory.
    Migrate,
    /// Skill management.
    Skill {
        #[command(subcommand)]
        action: SkillAction,
    },
}

#[derive(Subcommand)]
enum SkillAction {
    /// Dry-run validate a skill YAML document without persisting it.
    Validate {
        /// Path to the skill YAML file.
        path: std::path::PathBuf,
    },
    /// List every skill version in the store.
    List,
}

struct Services {
    tasks: Arc<FileTaskStore>,
    escalations: Arc<FileEscalationStore>,
    artifacts: Arc<FileArtifactStore>,
    documents: Arc<FileDocumentStore>,
    skills_store: Arc<FileSkillStore>,
    feedback_store: Arc<FileFeedbackStore>,
    profile: Arc<ProfileService<FileProfileLogStore>>,
}

impl Services {
    async fn open(config: &Config) -> anyhow::Result<Self> {
        let dir = &config.data_dir;
        Ok(Self {
            tasks: Arc::new(FileTaskStore::new(dir.join("tasks")).await?),
            escalations: Arc::new(FileEscalationStore::new(dir.join("escalations")).await?),
            artifacts: Arc::new(FileArtifactStore::new(dir.join("artifacts")).await?),
            documents: Arc::new(FileDocumentStore::new(dir.join("documents")).await?),
            skills_store: Arc::new(FileSkillStore::new(dir.join("skills")).await?),
            feedback_store: Arc::new(FileFeedbackStore::new(dir.join("feedback")).await?),
            profile: Arc::new(ProfileService::new(
                FileProfileLogStore::new(dir.join("profile")).await?,
            )),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    if config.mock_llm {
        info!("MOCK_LLM enabled: handlers should use deterministic stubs");
    }

    match cli.command {
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::Migrate => migrate(config).await,
        Commands::Skill { action } => skill(config, action).await,
    }
}

async fn migrate(config: Config) -> anyhow::Result<()> {
    let services = Services::open(&config).await?;
    // Touching every store's constructor above already created its
    // directory; `AgentLog` has no store trait to open against.
    tokio::fs::create_dir_all(config.data_dir.join("agent_log")).await?;
    drop(services);
    info!(data_dir = %config.data_dir.display(), "store layout ready");
    println!("Store layout ready under {}", config.data_dir.display());
    Ok(())
}

async fn skill(config: Config, action: SkillAction) -> anyhow::Result<()> {
    match action {
        SkillAction::Validate { path } => {
            let yaml = tokio::fs::read_to_string(&path).await?;
            match SkillEngine::<FileSkillStore>::validate(&yaml) {
                Ok(skill) => {
                    println!("valid: {} v{} (effective {})", skill.name, skill.version, skill.effective_date);
                }
                Err(errors) => {
                    println!("invalid: {} error(s)", errors.len());
                    for err in errors {
                        println!("  - {err}");
                    }
                    std::process::exit(1);
                }
            }
        }
        SkillAction::List => {
            let services = Services::open(&config).await?;
            let skills = services.skills_store.all().await?;
            if skills.is_empty() {
                println!("No skills in store.");
            } else {
                for skill in &skills {
                    println!("{} v{} (effective {})", skill.name, skill.version, skill.effective_date);
                }
                println!("\nTotal: {} version(s)", skills.len());
            }
        }
    }
    Ok(())
}

async fn serve(config: Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| config.host.clone());
    let port = port.unwrap_or(config.port);

    let services = Services::open(&config).await?;
    let kv = Arc::new(InMemoryKv::new());
    let progress = Arc::new(ProgressBus::new(kv.clone()));
    let state_machine = Arc::new(StateMachine::new(services.tasks.clone(), services.escalations.clone()));
    let feedback = Arc::new(FeedbackCapture::new(services.feedback_store.clone()));
    let skill_engine = Arc::new(SkillEngine::new(services.skills_store.clone()));
    let agent_log = Arc::new(orbit_store::AgentLog::new(config.data_dir.join("agent_log")));

    // `task_type → skill names` is a deployment-specific declaration the
    // operator supplies; none are wired until a handler registers one.
    let context_builder: Arc<dyn orbit_dispatch::BuildContext> = Arc::new(ContextBuilder::new(
        services.profile.clone(),
        services.documents.clone(),
        skill_engine,
        services.artifacts.clone(),
        services.tasks.clone(),
        HashMap::new(),
    ));

    let dispatch_config = DispatchConfig {
        handler_timeout: config.handler_timeout,
        lease_batch: config.lease_batch,
    };
    let dispatcher = Arc::new(Dispatcher::new(
        services.tasks.clone(),
        state_machine.clone(),
        Arc::new(HandlerRegistry::new()),
        context_builder,
        progress.clone(),
        services.artifacts.clone(),
        agent_log.clone(),
        dispatch_config,
    ));

    let supervisor_config = SupervisorConfig {
        max_retries: config.max_retries,
        base_backoff: config.base_backoff,
        backoff_factor: config.backoff_factor,
        backoff_cap: config.backoff_cap,
        heartbeat_interval: config.heartbeat_interval,
        stale_multiple: config.stale_multiple,
    };
    let supervisor = Arc::new(Supervisor::new(
        services.tasks.clone(),
        state_machine.clone(),
        supervisor_config,
    ));

    let dispatcher_handle = dispatcher.clone();
    tokio::spawn(async move {
        dispatcher_handle.run_forever(std::time::Duration::from_secs(5)).await;
    });
    let supervisor_handle = supervisor.clone();
    tokio::spawn(async move {
        supervisor_handle.run_forever(std::time::Duration::from_secs(10)).await;
    });

    let app_state = Arc::new(AppState {
        tasks: services.tasks,
        escalations: services.escalations,
        state_machine,
        progress,
        feedback,
        agent_log,
        agent_log_dir: config.data_dir.join("agent_log"),
    });

    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_burst, config.rate_limit_rps));
    let auth = AuthConfig::new(config.api_keys.clone());
    if auth.is_enabled() {
        info!(keys = config.api_keys.len(), "API key auth enabled");
    }

    let app = GatewayServer::build_with_middleware(app_state, Some(rate_limiter), auth);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "orbit gateway listening");
    axum::serve(listener, app).await?;

    dispatcher.shutdown();
    supervisor.shutdown();
    Ok(())
}

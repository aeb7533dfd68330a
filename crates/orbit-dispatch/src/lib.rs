//! The Dispatcher (C9) and Context Builder (C6): task routing, the
//! retry/liveness supervisor, and per-task context assembly over the
//! State Machine, Skill Engine, Profile Service, and stores.

/// Context assembly: `{profile view, documents, skills, prior year artifact}`.
pub mod context;
/// The Dispatcher: lease, assign, start, invoke, map to a transition.
pub mod dispatcher;
/// The handler contract every `task_type` implementation satisfies.
pub mod handler;
/// `task_type → handler` lookup table.
pub mod registry;
/// Retry backoff and liveness (stale `in_progress`) sweeps.
pub mod supervisor;

pub use context::{AgentContext, BuildContext, ContextBuilder};
pub use dispatcher::{DispatchConfig, Dispatcher};
pub use handler::{HandlerEnv, HandlerOutcome, TaskHandler};
pub use registry::HandlerRegistry;
pub use supervisor::{Supervisor, SupervisorConfig};

use thiserror::Error;

/// A convenience `Result` alias using [`OrbitError`].
pub type OrbitResult<T> = Result<T, OrbitError>;

/// Unified error taxonomy for the Orbit orchestration core.
///
/// Each variant corresponds to one of the error kinds named in the core's
/// error-handling design, not to a single subsystem — several components
/// raise the same kind (e.g. both the Skill Engine and Hybrid Search raise
/// [`OrbitError::Validation`]).
#[derive(Error, Debug)]
pub enum OrbitError {
    /// The State Machine rejected a transition. Surfaced as HTTP 409 to API
    /// callers; the core never retries this automatically.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A circuit breaker refused to run the operation because it is open.
    #[error("circuit open: {breaker}")]
    CircuitOpen {
        /// Name of the breaker that refused the call.
        breaker: String,
    },

    /// A timeout, 5xx, or connection drop talking to an upstream dependency
    /// (LLM, storage). Counted as a breaker failure.
    #[error("transient upstream error: {0}")]
    TransientUpstream(String),

    /// Malformed skill YAML, empty feedback tags, dimension mismatch, and
    /// similar structurally-invalid input. Never triggers a status
    /// transition.
    #[error("validation error: {0}")]
    Validation(String),

    /// The referenced resource does not exist (unknown task, absent skill,
    /// missing prior-year artifact). Callers decide the right HTTP status;
    /// an absent skill is non-fatal, an unknown task is a 404.
    #[error("missing resource: {0}")]
    MissingResource(String),

    /// An operation that would violate an append-only or uniqueness
    /// invariant (overwriting a profile entry, deleting feedback, reusing a
    /// `(skill_name, effective_date)` pair). Rejected unconditionally.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    /// A JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrbitError {
    /// Stable reason string surfaced to dashboards and preparer notes.
    ///
    /// Unlike `Display`, this never includes interpolated detail — it is the
    /// taxonomy kind alone, suitable as a `Task.metadata["reason"]` value.
    pub fn reason(&self) -> &'static str {
        match self {
            OrbitError::InvalidTransition(_) => "invalid_transition",
            OrbitError::CircuitOpen { .. } => "circuit_open",
            OrbitError::TransientUpstream(_) => "transient_upstream",
            OrbitError::Validation(_) => "validation_error",
            OrbitError::MissingResource(_) => "missing_resource",
            OrbitError::IntegrityViolation(_) => "integrity_violation",
            OrbitError::Json(_) | OrbitError::Io(_) => "internal_error",
        }
    }
}

//! The KV/Coordinator (C2): fast shared state for circuit-breaker
//! counters, per-task progress snapshots, and the progress pub/sub
//! channel, plus the Circuit Breaker (C3) built on top of it.
//!
//! Production deployments back [`Kv`] with Redis or an equivalent;
//! [`InMemoryKv`] is the in-process implementation this workspace ships,
//! linearizable by construction so it satisfies every atomicity
//! requirement the breaker and progress bus place on the trait.

/// The `Kv` trait and its in-process implementation.
pub mod kv;
/// Named, KV-backed circuit breakers guarding unreliable dependencies.
pub mod circuit_breaker;

pub use circuit_breaker::{BreakerConfig, CircuitBreaker};
pub use kv::{InMemoryKv, Kv};

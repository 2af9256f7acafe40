//! rudder - a client-side request router for replicated backends
//!
//! This crate balances opaque calls across a fixed set of backend replicas:
//! - Pluggable selection policies (round-robin, health-aware, load-aware)
//! - Passive health tracking with threshold-based exclusion
//! - Cool-down based recovery, lazily on selection and via a periodic sweeper
//! - Prometheus metrics

pub mod backend;
pub mod balancer;
pub mod config;
pub mod health;
pub mod invoker;
pub mod metrics;
pub mod policy;
pub mod util;

pub use backend::{BackendHandle, BackendTarget};
pub use balancer::{BackendStatus, Balancer, InvokeError};
pub use config::{BalancerConfig, Config};
pub use invoker::{invoker_fn, BoxError, Invoker};
pub use policy::PolicyKind;

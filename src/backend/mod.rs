//! Backend handles: address, invoker, and per-backend routing state.

mod handle;

pub use handle::{BackendHandle, BackendTarget};

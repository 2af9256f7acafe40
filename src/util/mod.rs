//! Utility functions and helpers.

mod logging;
mod request_id;
mod shutdown;

pub use logging::init_logging;
pub use request_id::InvocationId;
pub use shutdown::ShutdownSignal;

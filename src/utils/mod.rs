//! Shared utility modules

pub mod logging;
pub mod signal;
pub mod time;

pub use logging::init_logging;
pub use signal::{create_shutdown_receiver, wait_for_shutdown_signal};
pub use time::current_timestamp;

//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! SIGINT / SIGTERM (shutdown.rs)
//!     → Shutdown::trigger
//!         → admin server stops accepting, drains
//!         → event logger exits
//! ```

pub mod shutdown;

pub use shutdown::{wait_for_signal, Shutdown};

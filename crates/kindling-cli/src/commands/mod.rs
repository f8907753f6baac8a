//! CLI command implementations.

pub mod layout;
pub mod scan;
pub mod slots;
pub mod watch;

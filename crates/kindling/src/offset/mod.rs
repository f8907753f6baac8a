mod layout;
pub mod scanner;
mod signature;

pub use layout::*;
pub use scanner::{resolve_signature, scan, scan_module};
pub use signature::*;

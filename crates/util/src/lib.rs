//! Small helpers shared by the wpsprobe crates: path handling, timestamp
//! parsing and HTTP response helpers.

pub mod date_handling;
pub mod http;
pub mod path_processing;

pub use date_handling::parse_creation_time;
pub use path_processing::{LocalPathError, expand_tilde, local_path_for_url};

pub mod common;
pub mod completions;
pub mod enqueue;
pub mod flush;
pub mod list;
pub mod maintenance;
pub mod status;

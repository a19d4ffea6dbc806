pub mod common;
pub mod completions;
pub mod drain;
pub mod enqueue;
pub mod list;
pub mod maintenance;
pub mod run;
pub mod status;

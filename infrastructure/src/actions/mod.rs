//! Action executors for the externally-implemented actions

mod shell;

pub use shell::LocalShellExecutor;

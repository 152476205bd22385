mod execution;
mod workdir;

pub use execution::{Execution, ExecutionError, TaskRequest};

//! Narrow interfaces to the services around a run, with local implementations.

mod blob_store;
mod result_sink;
mod script_runner;

pub use blob_store::{BlobStore, BlobStoreError, DirectoryBlobStore};
pub use result_sink::{OutboxResultSink, ResultSink, ResultSinkError, RunReport};
pub use script_runner::{ScriptOutcome, ScriptRunner, ScriptRunnerError, ShellScriptRunner};

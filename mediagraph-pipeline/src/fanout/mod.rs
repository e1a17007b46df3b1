//! Fan-out stages.
//!
//! A fan-out replicates every frame to each of its children, running each
//! child on its own worker thread:
//!
//! - [`SyncParallel`] hands a clone to every branch and blocks until all of
//!   them finish it.
//! - [`AsyncParallel`] queues clones per branch and returns, unless the
//!   session runs in sync mode.
//!
//! With fewer than two children neither creates threads; frames go straight
//! to the child on the caller's thread.

mod async_parallel;
mod sync_parallel;

pub use async_parallel::AsyncParallel;
pub use sync_parallel::SyncParallel;

use crate::{PipelineError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Process-wide branch id.
pub fn next_branch_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Start a named worker thread for a branch.
fn spawn_branch<F>(id: u64, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    let handle = thread::Builder::new()
        .name(format!("mediagraph-branch-{}", id))
        .spawn(move || {
            debug!(branch = id, "branch worker started");
            body();
            debug!(branch = id, "branch worker exiting");
        })?;
    Ok(handle)
}

/// Wrap a child failure with the branch it happened on.
fn branch_failed(branch: u64, source: PipelineError) -> PipelineError {
    PipelineError::BranchFailed {
        branch,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_ids_are_unique() {
        let a = next_branch_id();
        let b = next_branch_id();
        assert!(b > a);
    }

    #[test]
    fn test_spawned_thread_is_named() {
        let id = next_branch_id();
        let handle = spawn_branch(id, || {}).unwrap();
        assert_eq!(handle.thread().name(), Some(format!("mediagraph-branch-{}", id).as_str()));
        handle.join().unwrap();
    }
}

//! Queued fan-out.
//!
//! Every branch has a FIFO [`WorkQueue`] and a worker that drains it in
//! batches. `execute` only enqueues, unless the session runs in sync mode,
//! where it additionally waits until each branch has caught up. `flush`
//! queues an exit sentinel behind the pending work and joins the workers, so
//! a child always sees its last frame before its flush.

use super::{branch_failed, next_branch_id, spawn_branch};
use crate::config::DispatchMode;
use crate::stage::{Downstream, Stage, StageContext, StageKind};
use crate::{PipelineError, Result};
use mediagraph_core::{Frame, TimeBase, WorkQueue};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error};

enum BranchItem {
    Frame(Frame, TimeBase),
    /// Flush the child and stop.
    Exit,
    /// Stop without flushing; used when the stage is dropped unflushed.
    Abandon,
}

#[derive(Default)]
struct Progress {
    processed: u64,
    failure: Option<PipelineError>,
}

#[derive(Default)]
struct BranchShared {
    queue: WorkQueue<BranchItem>,
    progress: Mutex<Progress>,
    advanced: Condvar,
}

impl BranchShared {
    fn record(&self, counted: bool, result: Result<()>) {
        let mut progress = self.progress.lock();
        if counted {
            progress.processed += 1;
        }
        if let Err(e) = result {
            progress.failure.get_or_insert(e);
        }
        self.advanced.notify_all();
    }
}

fn run_worker(id: u64, shared: &BranchShared, mut child: Box<dyn Stage>) {
    // After a failure the remaining frames are skipped but still counted, so
    // a sync-mode caller waiting on progress is released.
    let mut failed = false;
    loop {
        for item in shared.queue.wait_drain() {
            match item {
                BranchItem::Frame(frame, time_base) => {
                    let result = if failed { Ok(()) } else { child.execute(frame, time_base) };
                    if let Err(e) = &result {
                        error!(branch = id, error = %e, "branch failed");
                        failed = true;
                    }
                    shared.record(true, result);
                }
                BranchItem::Exit => {
                    let result = if failed { Ok(()) } else { child.flush() };
                    shared.record(false, result);
                    return;
                }
                BranchItem::Abandon => return,
            }
        }
    }
}

struct AsyncBranch {
    id: u64,
    shared: Arc<BranchShared>,
    submitted: u64,
    handle: Option<JoinHandle<()>>,
}

impl AsyncBranch {
    fn start(child: Box<dyn Stage>) -> Result<Self> {
        let id = next_branch_id();
        let shared = Arc::new(BranchShared::default());
        let handle = {
            let shared = shared.clone();
            spawn_branch(id, move || run_worker(id, &shared, child))?
        };
        Ok(Self {
            id,
            shared,
            submitted: 0,
            handle: Some(handle),
        })
    }

    fn submit(&mut self, frame: Frame, time_base: TimeBase) {
        self.submitted += 1;
        self.shared.queue.push(BranchItem::Frame(frame, time_base));
    }

    /// Block until the worker has processed everything submitted.
    fn wait_idle(&self) {
        let mut progress = self.shared.progress.lock();
        while progress.processed < self.submitted {
            self.shared.advanced.wait(&mut progress);
        }
    }

    fn take_failure(&self) -> Option<PipelineError> {
        self.shared
            .progress
            .lock()
            .failure
            .take()
            .map(|source| branch_failed(self.id, source))
    }

    /// Queue the exit sentinel behind everything already submitted.
    fn send_exit(&self) {
        self.shared.queue.push(BranchItem::Exit);
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AsyncBranch {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.shared.queue.push(BranchItem::Abandon);
            let _ = handle.join();
        }
    }
}

fn first_failure(branches: &[AsyncBranch]) -> Result<()> {
    let mut failures = branches.iter().filter_map(AsyncBranch::take_failure);
    match failures.next() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

enum Dispatch {
    Uninitialized,
    PassThrough(Downstream),
    Queued {
        branches: Vec<AsyncBranch>,
        mode: DispatchMode,
    },
    Finished,
}

/// Fan-out that queues work per branch.
pub struct AsyncParallel {
    dispatch: Dispatch,
}

impl AsyncParallel {
    /// Registry name.
    pub const NAME: &'static str = "async_parallel";

    pub fn new() -> Self {
        Self {
            dispatch: Dispatch::Uninitialized,
        }
    }

    /// Number of live worker threads.
    pub fn worker_count(&self) -> usize {
        match &self.dispatch {
            Dispatch::Queued { branches, .. } => branches.len(),
            _ => 0,
        }
    }
}

impl Default for AsyncParallel {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for AsyncParallel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Fanout
    }

    fn init(&mut self, ctx: StageContext) -> Result<()> {
        if ctx.downstream.len() < 2 {
            debug!(children = ctx.downstream.len(), "async fan-out in pass-through mode");
            self.dispatch = Dispatch::PassThrough(ctx.downstream);
            return Ok(());
        }
        let branches = ctx
            .downstream
            .into_children()
            .into_iter()
            .map(AsyncBranch::start)
            .collect::<Result<Vec<_>>>()?;
        debug!(branches = branches.len(), mode = %ctx.mode, "async fan-out started");
        self.dispatch = Dispatch::Queued {
            branches,
            mode: ctx.mode,
        };
        Ok(())
    }

    fn execute(&mut self, frame: Frame, time_base: TimeBase) -> Result<()> {
        match &mut self.dispatch {
            Dispatch::Uninitialized => Err(PipelineError::NotInitialized(Self::NAME.into())),
            Dispatch::Finished => Err(PipelineError::config("async fan-out received a frame after flush")),
            Dispatch::PassThrough(downstream) => downstream.send(frame, time_base),
            Dispatch::Queued { branches, mode } => {
                first_failure(branches)?;

                if let Some((last, rest)) = branches.split_last_mut() {
                    for branch in rest {
                        branch.submit(frame.clone(), time_base);
                    }
                    last.submit(frame, time_base);
                }

                if mode.is_sync() {
                    for branch in branches.iter() {
                        branch.wait_idle();
                    }
                    first_failure(branches)?;
                }
                Ok(())
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.dispatch, Dispatch::Finished) {
            Dispatch::Uninitialized => {
                self.dispatch = Dispatch::Uninitialized;
                Err(PipelineError::NotInitialized(Self::NAME.into()))
            }
            Dispatch::PassThrough(mut downstream) => {
                let result = downstream.flush();
                self.dispatch = Dispatch::PassThrough(downstream);
                result
            }
            Dispatch::Queued { mut branches, .. } => {
                for branch in branches.iter() {
                    branch.send_exit();
                }
                for branch in branches.iter_mut() {
                    branch.join();
                }
                debug!(branches = branches.len(), "async fan-out joined");
                first_failure(&branches)
            }
            Dispatch::Finished => Ok(()),
        }
    }
}

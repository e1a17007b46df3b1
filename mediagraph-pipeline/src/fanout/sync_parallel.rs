//! Blocking fan-out.
//!
//! Each branch owns a worker thread parked on a trigger condition. `execute`
//! hands every worker its clone, then waits on each completion condition, so
//! the caller stays in lock step with the slowest branch.

use super::{branch_failed, next_branch_id, spawn_branch};
use crate::stage::{Downstream, Stage, StageContext, StageKind};
use crate::{PipelineError, Result};
use mediagraph_core::{Frame, TimeBase};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::debug;

#[derive(Default)]
struct Slot {
    job: Option<(Frame, TimeBase)>,
    done: bool,
    failure: Option<PipelineError>,
    shutdown: bool,
}

#[derive(Default)]
struct Gate {
    slot: Mutex<Slot>,
    trigger: Condvar,
    complete: Condvar,
}

type SharedStage = Arc<Mutex<Box<dyn Stage>>>;

struct SyncBranch {
    id: u64,
    gate: Arc<Gate>,
    child: SharedStage,
    handle: Option<JoinHandle<()>>,
}

impl SyncBranch {
    fn start(child: Box<dyn Stage>) -> Result<Self> {
        let id = next_branch_id();
        let gate = Arc::new(Gate::default());
        let child: SharedStage = Arc::new(Mutex::new(child));
        let handle = {
            let gate = gate.clone();
            let child = child.clone();
            spawn_branch(id, move || run_worker(&gate, &child))?
        };
        Ok(Self {
            id,
            gate,
            child,
            handle: Some(handle),
        })
    }

    fn dispatch(&self, frame: Frame, time_base: TimeBase) {
        let mut slot = self.gate.slot.lock();
        slot.job = Some((frame, time_base));
        slot.done = false;
        self.gate.trigger.notify_one();
    }

    fn wait(&self) -> Result<()> {
        let mut slot = self.gate.slot.lock();
        while !slot.done {
            self.gate.complete.wait(&mut slot);
        }
        match slot.failure.take() {
            Some(source) => Err(branch_failed(self.id, source)),
            None => Ok(()),
        }
    }
}

impl Drop for SyncBranch {
    fn drop(&mut self) {
        self.gate.slot.lock().shutdown = true;
        self.gate.trigger.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker(gate: &Gate, child: &Mutex<Box<dyn Stage>>) {
    loop {
        let (frame, time_base) = {
            let mut slot = gate.slot.lock();
            loop {
                if slot.shutdown {
                    return;
                }
                if let Some(job) = slot.job.take() {
                    break job;
                }
                gate.trigger.wait(&mut slot);
            }
        };

        let result = child.lock().execute(frame, time_base);

        let mut slot = gate.slot.lock();
        slot.failure = result.err();
        slot.done = true;
        gate.complete.notify_one();
    }
}

enum Dispatch {
    Uninitialized,
    PassThrough(Downstream),
    Parallel(Vec<SyncBranch>),
}

/// Fan-out that blocks until every branch has processed the frame.
pub struct SyncParallel {
    dispatch: Dispatch,
}

impl SyncParallel {
    /// Registry name.
    pub const NAME: &'static str = "parallel";

    pub fn new() -> Self {
        Self {
            dispatch: Dispatch::Uninitialized,
        }
    }

    /// Number of worker threads, zero in pass-through mode.
    pub fn worker_count(&self) -> usize {
        match &self.dispatch {
            Dispatch::Parallel(branches) => branches.len(),
            _ => 0,
        }
    }
}

impl Default for SyncParallel {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for SyncParallel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Fanout
    }

    fn init(&mut self, ctx: StageContext) -> Result<()> {
        if ctx.downstream.len() < 2 {
            debug!(children = ctx.downstream.len(), "parallel fan-out in pass-through mode");
            self.dispatch = Dispatch::PassThrough(ctx.downstream);
            return Ok(());
        }
        let branches = ctx
            .downstream
            .into_children()
            .into_iter()
            .map(SyncBranch::start)
            .collect::<Result<Vec<_>>>()?;
        debug!(branches = branches.len(), "parallel fan-out started");
        self.dispatch = Dispatch::Parallel(branches);
        Ok(())
    }

    fn execute(&mut self, frame: Frame, time_base: TimeBase) -> Result<()> {
        match &mut self.dispatch {
            Dispatch::Uninitialized => Err(PipelineError::NotInitialized(Self::NAME.into())),
            Dispatch::PassThrough(downstream) => downstream.send(frame, time_base),
            Dispatch::Parallel(branches) => {
                if let Some((last, rest)) = branches.split_last() {
                    for branch in rest {
                        branch.dispatch(frame.clone(), time_base);
                    }
                    last.dispatch(frame, time_base);
                }
                // Wait for every branch even after a failure so none is left mid-frame.
                let mut first_failure = None;
                for branch in branches.iter() {
                    if let Err(e) = branch.wait() {
                        first_failure.get_or_insert(e);
                    }
                }
                first_failure.map_or(Ok(()), Err)
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        match &mut self.dispatch {
            Dispatch::Uninitialized => Err(PipelineError::NotInitialized(Self::NAME.into())),
            Dispatch::PassThrough(downstream) => downstream.flush(),
            Dispatch::Parallel(branches) => {
                // Workers are idle between execute calls, so the child lock is free.
                for branch in branches.iter() {
                    branch
                        .child
                        .lock()
                        .flush()
                        .map_err(|e| branch_failed(branch.id, e))?;
                }
                Ok(())
            }
        }
    }
}

//! Fan-out integration tests.
//!
//! Drives `parallel` and `async_parallel` with mock children to verify
//! per-branch ordering, frame independence, latency and flush behaviour.

use mediagraph_codec::{BuiltinCodecs, CodecOptions};
use mediagraph_core::{AudioBuffer, ChannelLayout, Frame, SampleFormat, TimeBase};
use mediagraph_pipeline::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

// =============================================================================
// Mock Implementations
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Frame(i64),
    Flush,
}

/// Shared view of what a mock child did.
#[derive(Clone, Default)]
struct Journal {
    events: Arc<Mutex<Vec<Event>>>,
    threads: Arc<Mutex<Vec<ThreadId>>>,
    first_samples: Arc<Mutex<Vec<f32>>>,
}

impl Journal {
    fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    fn threads(&self) -> Vec<ThreadId> {
        self.threads.lock().clone()
    }

    fn first_samples(&self) -> Vec<f32> {
        self.first_samples.lock().clone()
    }
}

/// Child stage that records every call and can misbehave on request.
struct MockChild {
    journal: Journal,
    delay: Duration,
    flush_delay: Duration,
    /// Overwrite the frame it received, to prove copies are independent.
    scribble: bool,
    fail_at: Option<i64>,
}

impl MockChild {
    fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            delay: Duration::ZERO,
            flush_delay: Duration::ZERO,
            scribble: false,
            fail_at: None,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with_flush_delay(mut self, delay: Duration) -> Self {
        self.flush_delay = delay;
        self
    }

    fn scribbling(mut self) -> Self {
        self.scribble = true;
        self
    }

    fn failing_at(mut self, pts: i64) -> Self {
        self.fail_at = Some(pts);
        self
    }

    fn boxed(self) -> Box<dyn Stage> {
        Box::new(self)
    }
}

impl Stage for MockChild {
    fn name(&self) -> &str {
        "mock child"
    }

    fn kind(&self) -> StageKind {
        StageKind::Sink
    }

    fn init(&mut self, _ctx: StageContext) -> Result<()> {
        Ok(())
    }

    fn execute(&mut self, mut frame: Frame, _time_base: TimeBase) -> Result<()> {
        thread::sleep(self.delay);
        self.journal.threads.lock().push(thread::current().id());
        if self.fail_at == Some(frame.pts) {
            return Err(PipelineError::InvalidConfig(format!("mock failure at {}", frame.pts)));
        }
        if let Some(audio) = frame.as_audio_mut() {
            self.journal.first_samples.lock().push(audio.sample(0, 0));
            if self.scribble {
                audio.set_sample(0, 0, 1.0);
            }
        }
        self.journal.events.lock().push(Event::Frame(frame.pts));
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        thread::sleep(self.flush_delay);
        self.journal.events.lock().push(Event::Flush);
        Ok(())
    }
}

fn context(children: Vec<Box<dyn Stage>>, mode: DispatchMode) -> StageContext {
    StageContext {
        downstream: Downstream::new(children),
        codec_options: CodecOptions::new(),
        output: SharedOutput::new(MemoryChannel::new()),
        mode,
        codecs: Arc::new(BuiltinCodecs::new()),
    }
}

fn frame(pts: i64) -> Frame {
    Frame::audio(AudioBuffer::new(SampleFormat::F32, ChannelLayout::Mono, 48000, 16), pts)
}

fn frames_and_flush(pts: &[i64]) -> Vec<Event> {
    pts.iter()
        .map(|p| Event::Frame(*p))
        .chain(std::iter::once(Event::Flush))
        .collect()
}

// =============================================================================
// AsyncParallel Tests
// =============================================================================

#[test]
fn test_async_branches_see_every_frame_in_order() {
    let (a, b) = (Journal::default(), Journal::default());
    let mut fanout = AsyncParallel::new();
    fanout
        .init(context(
            vec![MockChild::new(&a).scribbling().boxed(), MockChild::new(&b).boxed()],
            DispatchMode::Async,
        ))
        .unwrap();
    assert_eq!(fanout.worker_count(), 2);

    for pts in [1, 2, 3] {
        fanout.execute(frame(pts), TimeBase::MPEG).unwrap();
    }
    fanout.flush().unwrap();

    assert_eq!(a.events(), frames_and_flush(&[1, 2, 3]));
    assert_eq!(b.events(), frames_and_flush(&[1, 2, 3]));
    // Branch a scribbled on its copies; b never sees it.
    assert_eq!(b.first_samples(), vec![0.0, 0.0, 0.0]);
}

#[test]
fn test_async_flush_waits_for_queued_frames() {
    let journal = Journal::default();
    let other = Journal::default();
    let mut fanout = AsyncParallel::new();
    fanout
        .init(context(
            vec![
                MockChild::new(&journal).with_delay(Duration::from_millis(30)).boxed(),
                MockChild::new(&other).boxed(),
            ],
            DispatchMode::Async,
        ))
        .unwrap();

    let start = Instant::now();
    fanout.execute(frame(1), TimeBase::MPEG).unwrap();
    fanout.execute(frame(2), TimeBase::MPEG).unwrap();
    // Queuing does not wait for the slow branch.
    assert!(start.elapsed() < Duration::from_millis(30));

    fanout.flush().unwrap();
    assert_eq!(journal.events(), frames_and_flush(&[1, 2]));
    assert!(fanout.execute(frame(3), TimeBase::MPEG).is_err());
}

#[test]
fn test_async_flush_releases_every_branch_before_joining() {
    let journals: Vec<Journal> = (0..3).map(|_| Journal::default()).collect();
    let mut fanout = AsyncParallel::new();
    fanout
        .init(context(
            journals
                .iter()
                .map(|j| MockChild::new(j).with_flush_delay(Duration::from_millis(150)).boxed())
                .collect(),
            DispatchMode::Async,
        ))
        .unwrap();

    fanout.execute(frame(1), TimeBase::MPEG).unwrap();
    let start = Instant::now();
    fanout.flush().unwrap();
    let elapsed = start.elapsed();

    // Child flushes overlap instead of running one branch after another.
    assert!(elapsed >= Duration::from_millis(150));
    assert!(elapsed < Duration::from_millis(400), "flush took {:?}", elapsed);
    for journal in &journals {
        assert_eq!(journal.events(), frames_and_flush(&[1]));
    }
}

#[test]
fn test_async_in_sync_mode_waits_per_frame() {
    let (a, b) = (Journal::default(), Journal::default());
    let mut fanout = AsyncParallel::new();
    fanout
        .init(context(
            vec![
                MockChild::new(&a).with_delay(Duration::from_millis(10)).boxed(),
                MockChild::new(&b).boxed(),
            ],
            DispatchMode::Sync,
        ))
        .unwrap();

    fanout.execute(frame(7), TimeBase::MPEG).unwrap();
    assert_eq!(a.events(), vec![Event::Frame(7)]);
    assert_eq!(b.events(), vec![Event::Frame(7)]);
    fanout.flush().unwrap();
}

#[test]
fn test_async_failure_surfaces() {
    let (a, b) = (Journal::default(), Journal::default());
    let mut fanout = AsyncParallel::new();
    fanout
        .init(context(
            vec![MockChild::new(&a).failing_at(2).boxed(), MockChild::new(&b).boxed()],
            DispatchMode::Async,
        ))
        .unwrap();

    fanout.execute(frame(1), TimeBase::MPEG).unwrap();
    let _ = fanout.execute(frame(2), TimeBase::MPEG);
    let _ = fanout.execute(frame(3), TimeBase::MPEG);
    match fanout.flush() {
        Err(PipelineError::BranchFailed { source, .. }) => {
            assert!(matches!(*source, PipelineError::InvalidConfig(_)));
        }
        // The failure may already have been reported by a later execute.
        Ok(()) => {}
        Err(other) => panic!("unexpected error {}", other),
    }
    let events = b.events();
    assert_eq!(&events[..2], &[Event::Frame(1), Event::Frame(2)]);
    assert_eq!(events.last(), Some(&Event::Flush));
}

// =============================================================================
// SyncParallel Tests
// =============================================================================

#[test]
fn test_sync_latency_is_slowest_branch() {
    let journals: Vec<Journal> = (0..3).map(|_| Journal::default()).collect();
    let children = journals
        .iter()
        .map(|j| MockChild::new(j).with_delay(Duration::from_millis(150)).boxed())
        .collect();
    let mut fanout = SyncParallel::new();
    fanout.init(context(children, DispatchMode::Sync)).unwrap();
    assert_eq!(fanout.worker_count(), 3);

    let start = Instant::now();
    fanout.execute(frame(1), TimeBase::MPEG).unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(150));
    assert!(elapsed < Duration::from_millis(400), "branches ran serially: {:?}", elapsed);
    for journal in &journals {
        assert_eq!(journal.events(), vec![Event::Frame(1)]);
    }
}

#[test]
fn test_sync_branches_run_on_their_own_threads() {
    let (a, b) = (Journal::default(), Journal::default());
    let mut fanout = SyncParallel::new();
    fanout
        .init(context(
            vec![MockChild::new(&a).boxed(), MockChild::new(&b).boxed()],
            DispatchMode::Sync,
        ))
        .unwrap();
    fanout.execute(frame(1), TimeBase::MPEG).unwrap();
    fanout.execute(frame(2), TimeBase::MPEG).unwrap();
    fanout.flush().unwrap();

    let (ta, tb) = (a.threads(), b.threads());
    assert_eq!(ta[0], ta[1]);
    assert_ne!(ta[0], tb[0]);
    assert_ne!(ta[0], thread::current().id());
    assert_eq!(a.events(), frames_and_flush(&[1, 2]));
}

#[test]
fn test_sync_failure_reported_on_same_call() {
    let (a, b) = (Journal::default(), Journal::default());
    let mut fanout = SyncParallel::new();
    fanout
        .init(context(
            vec![MockChild::new(&a).boxed(), MockChild::new(&b).failing_at(1).boxed()],
            DispatchMode::Sync,
        ))
        .unwrap();
    let err = fanout.execute(frame(1), TimeBase::MPEG).unwrap_err();
    assert!(matches!(err, PipelineError::BranchFailed { .. }));
    // The healthy branch still finished the frame.
    assert_eq!(a.events(), vec![Event::Frame(1)]);
}

// =============================================================================
// Degree-1 Tests
// =============================================================================

#[test]
fn test_single_child_stays_on_caller_thread() {
    let caller = thread::current().id();
    let sync_journal = Journal::default();
    let async_journal = Journal::default();

    let mut sync_fanout = SyncParallel::new();
    sync_fanout
        .init(context(vec![MockChild::new(&sync_journal).boxed()], DispatchMode::Sync))
        .unwrap();
    let mut async_fanout = AsyncParallel::new();
    async_fanout
        .init(context(vec![MockChild::new(&async_journal).boxed()], DispatchMode::Async))
        .unwrap();
    assert_eq!(sync_fanout.worker_count(), 0);
    assert_eq!(async_fanout.worker_count(), 0);

    sync_fanout.execute(frame(1), TimeBase::MPEG).unwrap();
    async_fanout.execute(frame(1), TimeBase::MPEG).unwrap();
    // Pass-through runs inline, so the frame is already there.
    assert_eq!(async_journal.events(), vec![Event::Frame(1)]);

    assert_eq!(sync_journal.threads(), vec![caller]);
    assert_eq!(async_journal.threads(), vec![caller]);
}

#[test]
fn test_uninitialized_fanout_rejects_frames() {
    let mut fanout = SyncParallel::new();
    assert!(matches!(
        fanout.execute(frame(0), TimeBase::MPEG),
        Err(PipelineError::NotInitialized(_))
    ));
}

// =============================================================================
// GraphBuilder Tests
// =============================================================================

#[test]
fn test_builder_depth_fanout_and_typed_option() {
    let built = Arc::new(AtomicUsize::new(0));
    let mut registry = StageRegistry::builtin();
    let counter = built.clone();
    registry.register("mock child", StageKind::Sink, move |options| {
        let _label = options.int("label", 0)?;
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(MockChild::new(&Journal::default()).boxed())
    });

    let spec = GraphSpec::new("raw audio input")
        .with_option("sample_rate", 48000)
        .with_child(
            GraphSpec::new("parallel")
                .with_child(GraphSpec::new("mock child").with_option("label", 1))
                .with_child(GraphSpec::new("mock child").with_option("label", 2))
                .with_child(GraphSpec::new("mock child").with_option("label", 3)),
        );
    let builder = GraphBuilder::new(
        &registry,
        Arc::new(BuiltinCodecs::new()),
        SharedOutput::new(MemoryChannel::new()),
        DispatchMode::Sync,
    );
    let graph = builder.build(&spec).unwrap();
    let topology = graph.topology();

    assert_eq!(built.load(Ordering::SeqCst), 3);
    assert_eq!(topology.depth(), 3);
    assert_eq!(topology.node_count(), 5);
    let fanout = topology.find("parallel").unwrap();
    assert_eq!(fanout.kind, StageKind::Fanout);
    assert_eq!(fanout.children.len(), 3);
    assert_eq!(fanout.children[2].options["label"], OptionValue::Int(3));
}

#[test]
fn test_builder_uneven_tree() {
    let mut registry = StageRegistry::builtin();
    registry.register("mock child", StageKind::Sink, |_options| {
        Ok(MockChild::new(&Journal::default()).boxed())
    });

    // root -> parallel -> [mock, silence detect -> mock]
    let spec = GraphSpec::new("raw audio input").with_child(
        GraphSpec::new("parallel")
            .with_child(GraphSpec::new("mock child"))
            .with_child(GraphSpec::new("silence detect").with_child(GraphSpec::new("mock child"))),
    );
    let builder = GraphBuilder::new(
        &registry,
        Arc::new(BuiltinCodecs::new()),
        SharedOutput::new(MemoryChannel::new()),
        DispatchMode::Sync,
    );
    let graph = builder.build(&spec).unwrap();
    let topology = graph.topology();

    assert_eq!(topology.depth(), 4);
    assert_eq!(topology.node_count(), 5);
    assert_eq!(topology.children.len(), 1);
    let fanout = &topology.children[0];
    assert_eq!(fanout.kind, StageKind::Fanout);
    assert_eq!(fanout.children.len(), 2);
    assert_eq!(fanout.children[0].name, "mock child");
    assert!(fanout.children[0].children.is_empty());
    assert_eq!(fanout.children[1].name, "silence detect");
    assert_eq!(fanout.children[1].kind, StageKind::Transform);
    assert_eq!(fanout.children[1].children.len(), 1);
}

#[test]
fn test_builder_rejects_bad_integer() {
    let registry = StageRegistry::builtin();
    let spec = GraphSpec::new("raw audio input").with_option("sample_rate", "fast");
    let builder = GraphBuilder::new(
        &registry,
        Arc::new(BuiltinCodecs::new()),
        SharedOutput::new(MemoryChannel::new()),
        DispatchMode::Sync,
    );
    match builder.build(&spec) {
        Err(PipelineError::InvalidOption { key, .. }) => assert_eq!(key, "sample_rate"),
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("bad option accepted"),
    }
}

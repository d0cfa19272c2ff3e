//! Integration tests for pipeline wiring and scheduling

mod common;

use common::mock_helpers::{Collector, CountingSource};
use common::wait_until;
use dataflow_rs::filters::{Passthrough, SignalSource};
use dataflow_rs::pipeline::PipelineError;
use dataflow_rs::{Filter, FilterState, Pipeline, PipelineEvent, WorkerId};

#[test]
fn test_linear_pipeline_delivers_in_order() {
    let mut pipeline = Pipeline::new();
    let src = pipeline
        .add(Filter::new("count", CountingSource::new(100)).unwrap())
        .unwrap();
    let pass = pipeline
        .add(Filter::new("pass", Passthrough::new()).unwrap())
        .unwrap();
    let (collector, received) = Collector::new(1);
    let sink = pipeline.add(Filter::new("sink", collector).unwrap()).unwrap();
    pipeline.connect(src, 0, pass, 0).unwrap();
    pipeline.connect(pass, 0, sink, 0).unwrap();

    pipeline.run().unwrap();
    assert!(wait_until(|| received.lock().len() == 100));
    pipeline.halt();

    let values: Vec<u32> = received.lock().iter().map(|&(_, v)| v).collect();
    assert_eq!(values, (0..100).collect::<Vec<_>>());
    for id in [src, pass, sink] {
        assert_eq!(
            pipeline.filter(id).unwrap().lock().state(),
            FilterState::Closed
        );
    }
}

#[test]
fn test_fan_out_every_consumer_gets_everything() {
    let mut pipeline = Pipeline::new();
    let src = pipeline
        .add(Filter::new("count", CountingSource::new(50)).unwrap())
        .unwrap();
    let (a, seen_a) = Collector::new(1);
    let (b, seen_b) = Collector::new(1);
    let a = pipeline.add(Filter::new("a", a).unwrap()).unwrap();
    let b = pipeline.add(Filter::new("b", b).unwrap()).unwrap();
    pipeline.connect(src, 0, a, 0).unwrap();
    pipeline.connect(src, 0, b, 0).unwrap();

    // Producer and one consumer share a thread; the other runs alone.
    pipeline.assign_task(WorkerId(0), src).unwrap();
    pipeline.assign_task(WorkerId(0), a).unwrap();
    pipeline.assign_task(WorkerId(1), b).unwrap();

    pipeline.run().unwrap();
    assert!(wait_until(|| {
        seen_a.lock().len() == 50 && seen_b.lock().len() == 50
    }));
    pipeline.halt();

    let expected: Vec<(usize, u32)> = (0..50).map(|v| (0, v)).collect();
    assert_eq!(*seen_a.lock(), expected);
    assert_eq!(*seen_b.lock(), expected);
}

#[test]
fn test_fan_in_keeps_per_source_order() {
    let mut pipeline = Pipeline::new();
    let s1 = pipeline
        .add(Filter::new("s1", CountingSource::new(30)).unwrap())
        .unwrap();
    let s2 = pipeline
        .add(Filter::new("s2", CountingSource::new(20)).unwrap())
        .unwrap();
    let (collector, received) = Collector::new(2);
    let sink = pipeline.add(Filter::new("sink", collector).unwrap()).unwrap();
    pipeline.connect(s1, 0, sink, 0).unwrap();
    pipeline.connect(s2, 0, sink, 1).unwrap();

    pipeline.run().unwrap();
    assert!(wait_until(|| received.lock().len() == 50));
    pipeline.halt();

    let received = received.lock();
    let from = |port| -> Vec<u32> {
        received
            .iter()
            .filter(|&&(p, _)| p == port)
            .map(|&(_, v)| v)
            .collect()
    };
    assert_eq!(from(0), (0..30).collect::<Vec<_>>());
    assert_eq!(from(1), (0..20).collect::<Vec<_>>());
}

#[test]
fn test_cycle_is_rejected() {
    let mut pipeline = Pipeline::new();
    let a = pipeline
        .add(Filter::new("a", Passthrough::new()).unwrap())
        .unwrap();
    let b = pipeline
        .add(Filter::new("b", Passthrough::new()).unwrap())
        .unwrap();
    pipeline.connect(a, 0, b, 0).unwrap();
    assert!(matches!(
        pipeline.connect(b, 0, a, 0),
        Err(PipelineError::CycleDetected)
    ));
}

#[test]
fn test_failed_run_leaves_everything_closed() {
    let mut pipeline = Pipeline::new();
    let src = pipeline
        .add(Filter::new("sig", SignalSource::new()).unwrap())
        .unwrap();
    let (collector, _) = Collector::new(2);
    let sink = pipeline.add(Filter::new("sink", collector).unwrap()).unwrap();
    // Passthrough requires a source but gets none.
    let orphan = pipeline
        .add(Filter::new("orphan", Passthrough::new()).unwrap())
        .unwrap();
    pipeline.connect(src, 0, sink, 0).unwrap();

    let err = pipeline.run().unwrap_err();
    assert!(matches!(err, PipelineError::Transition { ref filter, .. } if filter == "orphan"));
    assert!(!pipeline.is_running());
    for id in [src, sink, orphan] {
        assert_eq!(
            pipeline.filter(id).unwrap().lock().state(),
            FilterState::Closed
        );
    }

    // Without the orphan the same wiring runs.
    let mut pipeline = Pipeline::new();
    let src = pipeline
        .add(Filter::new("sig", SignalSource::new()).unwrap())
        .unwrap();
    let (collector, received) = Collector::new(1);
    let sink = pipeline.add(Filter::new("sink", collector).unwrap()).unwrap();
    pipeline.connect(src, 0, sink, 0).unwrap();
    pipeline.run().unwrap();
    assert!(wait_until(|| !received.lock().is_empty()));
}

#[test]
fn test_restart_after_halt() {
    let mut pipeline = Pipeline::new();
    let src = pipeline
        .add(Filter::new("count", CountingSource::new(10)).unwrap())
        .unwrap();
    let (collector, received) = Collector::new(1);
    let sink = pipeline.add(Filter::new("sink", collector).unwrap()).unwrap();
    pipeline.connect(src, 0, sink, 0).unwrap();

    pipeline.run().unwrap();
    assert!(wait_until(|| received.lock().len() == 10));
    pipeline.halt();

    // Reset rewinds the counter, so a second run delivers 0..10 again.
    pipeline.run().unwrap();
    assert!(wait_until(|| received.lock().len() == 20));
    pipeline.halt();
    assert_eq!(received.lock()[10], (0, 0));
}

#[test]
fn test_worker_events() {
    let mut pipeline = Pipeline::new();
    let src = pipeline
        .add(Filter::new("count", CountingSource::new(5)).unwrap())
        .unwrap();
    let (collector, received) = Collector::new(1);
    let sink = pipeline.add(Filter::new("sink", collector).unwrap()).unwrap();
    pipeline.connect(src, 0, sink, 0).unwrap();
    pipeline.assign_task(WorkerId(4), src).unwrap();
    pipeline.assign_task(WorkerId(4), sink).unwrap();
    let events = pipeline.events();

    pipeline.run().unwrap();
    assert!(wait_until(|| received.lock().len() == 5));
    pipeline.halt();

    let events: Vec<_> = events.try_iter().collect();
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::WorkerStarted { worker: WorkerId(4), filters } if filters.len() == 2
    )));
    let stopped = events.iter().find_map(|e| match e {
        PipelineEvent::WorkerStopped { stats, .. } => Some(stats.clone()),
        _ => None,
    });
    assert!(stopped.unwrap().progress_jobs >= 10);
}

#[test]
fn test_settings_snapshot_covers_all_filters() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::new();
    pipeline
        .add(Filter::new("sig", SignalSource::new()).unwrap())
        .unwrap();
    pipeline
        .add(Filter::new("pass", Passthrough::new()).unwrap())
        .unwrap();
    pipeline
        .filter_by_name("sig")
        .unwrap()
        .lock()
        .set_setting("frequency", 0.5)
        .unwrap();

    let path = dir.path().join("settings.json");
    pipeline.persist_settings(&path).unwrap();

    let mut other = Pipeline::new();
    other
        .add(Filter::new("sig", SignalSource::new()).unwrap())
        .unwrap();
    assert!(other.restore_settings(&path).unwrap() > 0);
    assert_eq!(
        other
            .filter_by_name("sig")
            .unwrap()
            .lock()
            .setting::<f64>("frequency"),
        Some(0.5)
    );
}

#[test]
fn test_unassigned_filter_still_runs() {
    let mut pipeline = Pipeline::new();
    let src = pipeline
        .add(Filter::new("count", CountingSource::new(30)).unwrap())
        .unwrap();
    let (collector, received) = Collector::new(1);
    let sink = pipeline.add(Filter::new("sink", collector).unwrap()).unwrap();
    pipeline.connect(src, 0, sink, 0).unwrap();
    pipeline.assign_task(WorkerId(2), src).unwrap();
    assert_eq!(pipeline.unassigned_filters(), vec![sink]);

    pipeline.run().unwrap();
    assert!(wait_until(|| received.lock().len() == 30));
    pipeline.halt();
}

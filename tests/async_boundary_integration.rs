//! Integration tests for async boundaries and the wait barrier

mod common;

use common::builders::StageBuilder;
use common::{test_timeout, EventLog};
use pype_rs::pipeline::nodes::CollectorSink;
use pype_rs::pipeline::{BoundaryState, ErrorKind, PipelineBuilder, PipelineError};
use pype_rs::RuntimeConfig;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_write_returns_before_downstream_runs() {
    let log = EventLog::new();
    let mut b = PipelineBuilder::<i64>::new();
    let src = b.add_passthrough("src");
    let worker = b.add_async("worker");
    let slow = b.add_stage(
        StageBuilder::new("slow", &log)
            .delay(Duration::from_millis(200))
            .sink()
            .build(),
    );
    b.chain([src, worker, slow]).unwrap();
    let pipeline = b.build().unwrap();

    let start = Instant::now();
    pipeline.write(src, 1).unwrap();
    assert!(start.elapsed() < Duration::from_millis(150));
    assert_eq!(log.len(), 0);

    pipeline.wait(src).unwrap();
    let events = log.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].thread.as_deref(), Some("pype-worker"));
    pipeline.shutdown();
}

#[test]
fn test_fifo_order_per_boundary() {
    let log = EventLog::new();
    let mut b = PipelineBuilder::<i64>::new();
    let worker = b.add_async("worker");
    let first = b.add_stage(StageBuilder::new("first", &log).build());
    let second = b.add_stage(StageBuilder::new("second", &log).sink().build());
    b.chain([worker, first, second]).unwrap();
    let pipeline = b.build().unwrap();

    for i in 0..100 {
        pipeline.write(worker, i).unwrap();
    }
    pipeline.wait(worker).unwrap();

    assert_eq!(log.values_for("second"), (0..100).collect::<Vec<_>>());
    // Item i's cascade finishes before item i + 1 starts.
    let nodes = log.nodes();
    for pair in nodes.chunks(2) {
        assert_eq!(pair, &["first", "second"]);
    }
    pipeline.shutdown();
}

#[test]
fn test_wait_is_idempotent() {
    let log = EventLog::new();
    let mut b = PipelineBuilder::<i64>::new();
    let src = b.add_passthrough("src");
    let worker = b.add_async("worker");
    let sink = b.add_stage(
        StageBuilder::new("sink", &log)
            .delay(Duration::from_millis(20))
            .sink()
            .build(),
    );
    b.chain([src, worker, sink]).unwrap();
    let pipeline = b.build().unwrap();

    for i in 0..5 {
        pipeline.write(src, i).unwrap();
    }
    pipeline.wait(src).unwrap();
    assert_eq!(log.len(), 5);

    let start = Instant::now();
    pipeline.wait(src).unwrap();
    pipeline.wait(src).unwrap();
    assert!(start.elapsed() < Duration::from_millis(50));
    pipeline.shutdown();
}

#[test]
fn test_wait_without_boundaries_returns_immediately() {
    let mut b = PipelineBuilder::<i64>::new();
    let src = b.add_passthrough("src");
    let worker = b.add_async("worker");
    let upstream = b.add_passthrough("upstream");
    b.chain([upstream, src]).unwrap();
    b.connect(worker, upstream).unwrap();
    let pipeline = b.build().unwrap();

    // The boundary is upstream of src, not downstream.
    assert!(pipeline.wait_timeout(src, Duration::ZERO).unwrap());
    pipeline.shutdown();
}

#[test]
fn test_wait_timeout_max_means_no_deadline() {
    let log = EventLog::new();
    let mut b = PipelineBuilder::<i64>::new();
    let src = b.add_passthrough("src");
    let worker = b.add_async("worker");
    let sink = b.add_stage(
        StageBuilder::new("sink", &log)
            .delay(Duration::from_millis(10))
            .sink()
            .build(),
    );
    b.chain([src, worker, sink]).unwrap();
    let pipeline = b.build().unwrap();

    // Idle pipeline, then one with work still queued.
    assert!(pipeline.wait_timeout(src, Duration::MAX).unwrap());
    for i in 0..3 {
        pipeline.write(src, i).unwrap();
    }
    assert!(pipeline.wait_timeout(src, Duration::MAX).unwrap());
    assert_eq!(log.len(), 3);
    pipeline.shutdown();
}

#[test]
fn test_nested_boundaries_are_awaited_transitively() {
    let log = EventLog::new();
    let mut b = PipelineBuilder::<i64>::new();
    let src = b.add_passthrough("src");
    let outer = b.add_async("outer");
    let stage = b.add_stage(
        StageBuilder::new("stage", &log)
            .delay(Duration::from_millis(30))
            .build(),
    );
    let inner = b.add_async("inner");
    let sink = b.add_stage(
        StageBuilder::new("sink", &log)
            .delay(Duration::from_millis(60))
            .sink()
            .build(),
    );
    b.chain([src, outer, stage, inner, sink]).unwrap();
    let pipeline = b.build().unwrap();

    for i in 0..3 {
        pipeline.write(src, i).unwrap();
    }
    pipeline.wait(src).unwrap();

    assert_eq!(log.values_for("stage"), vec![0, 1, 2]);
    assert_eq!(log.values_for("sink"), vec![0, 1, 2]);
    let sink_threads: Vec<_> = log
        .events()
        .into_iter()
        .filter(|e| e.node == "sink")
        .map(|e| e.thread)
        .collect();
    assert!(sink_threads
        .iter()
        .all(|t| t.as_deref() == Some("pype-inner")));
    pipeline.shutdown();
}

#[test]
fn test_wait_only_covers_reachable_boundaries() {
    let log = EventLog::new();
    let mut b = PipelineBuilder::<i64>::new();
    let slow_src = b.add_passthrough("slow_src");
    let slow_async = b.add_async("slow_async");
    let slow = b.add_stage(
        StageBuilder::new("slow", &log)
            .delay(Duration::from_millis(300))
            .sink()
            .build(),
    );
    let fast_src = b.add_passthrough("fast_src");
    let fast_async = b.add_async("fast_async");
    let fast = b.add_stage(StageBuilder::new("fast", &log).sink().build());
    b.chain([slow_src, slow_async, slow]).unwrap();
    b.chain([fast_src, fast_async, fast]).unwrap();
    let pipeline = b.build().unwrap();

    pipeline.write(slow_src, 1).unwrap();
    pipeline.write(fast_src, 2).unwrap();

    assert!(pipeline.wait_timeout(fast_src, test_timeout()).unwrap());
    assert_eq!(log.values_for("fast"), vec![2]);
    assert!(!pipeline
        .wait_timeout(slow_src, Duration::from_millis(10))
        .unwrap());

    pipeline.wait_all();
    assert_eq!(log.values_for("slow"), vec![1]);
    pipeline.shutdown();
}

#[test]
fn test_failure_is_reported_and_worker_continues() {
    let log = EventLog::new();
    let mut b = PipelineBuilder::<i64>::new();
    let src = b.add_passthrough("src");
    let worker = b.add_async("worker");
    let gate = b.add_stage(StageBuilder::new("gate", &log).fail_on(2).build());
    let sink = b.add_stage(StageBuilder::new("sink", &log).sink().build());
    b.chain([src, worker, gate, sink]).unwrap();
    let pipeline = b.build().unwrap();

    for i in 1..=3 {
        // Enqueueing never sees downstream failures.
        pipeline.write(src, i).unwrap();
    }
    pipeline.wait(src).unwrap();

    assert_eq!(log.values_for("sink"), vec![1, 3]);

    let failures = pipeline.drain_failures();
    assert_eq!(failures.len(), 1);
    let failure = &failures[0];
    assert_eq!(failure.boundary, worker);
    assert_eq!(failure.boundary_name, "worker");
    assert_eq!(failure.seq, 1);
    assert_eq!(failure.error.kind(), ErrorKind::Transform);
    assert!(matches!(
        &failure.error,
        PipelineError::Node { node_id, .. } if *node_id == gate
    ));

    let stats = pipeline.boundary_stats(worker).unwrap();
    assert_eq!(stats.enqueued, 3);
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.state, BoundaryState::Idle);
    pipeline.shutdown();
}

#[test]
fn test_panic_is_caught_on_worker() {
    let log = EventLog::new();
    let mut b = PipelineBuilder::<i64>::new();
    let worker = b.add_async("worker");
    let fragile = b.add_stage(StageBuilder::new("fragile", &log).panic_on(5).sink().build());
    b.connect(worker, fragile).unwrap();
    let pipeline = b.build().unwrap();
    let failures = pipeline.failures();

    pipeline.write(worker, 5).unwrap();
    pipeline.write(worker, 6).unwrap();
    pipeline.wait(worker).unwrap();

    let failure = failures.recv_timeout(test_timeout()).unwrap();
    match failure.error {
        PipelineError::Panicked { message, .. } => {
            assert_eq!(message, "fragile panicked on 5");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(log.values_for("fragile"), vec![6]);
    assert_eq!(pipeline.boundary_stats(worker).unwrap().failed, 1);
    pipeline.shutdown();
}

#[test]
fn test_nested_failure_names_inner_boundary() {
    let log = EventLog::new();
    let mut b = PipelineBuilder::<i64>::new();
    let outer = b.add_async("outer");
    let inner = b.add_async("inner");
    let gate = b.add_stage(StageBuilder::new("gate", &log).fail_on(0).sink().build());
    b.chain([outer, inner, gate]).unwrap();
    let pipeline = b.build().unwrap();

    pipeline.write(outer, 0).unwrap();
    pipeline.wait(outer).unwrap();

    let failures = pipeline.drain_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].boundary, inner);
    assert_eq!(pipeline.boundary_stats(outer).unwrap().processed, 1);
    pipeline.shutdown();
}

#[test]
fn test_shutdown_drains_queue_then_rejects_writes() {
    let log = EventLog::new();
    let mut b = PipelineBuilder::<i64>::new();
    let src = b.add_passthrough("src");
    let worker = b.add_async("worker");
    let sink = b.add_stage(
        StageBuilder::new("sink", &log)
            .delay(Duration::from_millis(10))
            .sink()
            .build(),
    );
    b.chain([src, worker, sink]).unwrap();
    let pipeline = b.build().unwrap();

    for i in 0..5 {
        pipeline.write(src, i).unwrap();
    }
    pipeline.shutdown();
    assert_eq!(log.values_for("sink"), vec![0, 1, 2, 3, 4]);

    let err = pipeline.write(src, 99).unwrap_err();
    assert!(matches!(err, PipelineError::BoundaryClosed(id) if id == worker));
    assert_eq!(err.kind(), ErrorKind::Runtime);
    // Nothing pending, so wait still returns.
    pipeline.wait(src).unwrap();
}

#[test]
fn test_boundary_state_transitions() {
    let log = EventLog::new();
    let mut b = PipelineBuilder::<i64>::new();
    let worker = b.add_async("worker");
    let sink = b.add_stage(
        StageBuilder::new("sink", &log)
            .delay(Duration::from_millis(100))
            .sink()
            .build(),
    );
    b.connect(worker, sink).unwrap();
    let pipeline = b.build().unwrap();

    let stats = pipeline.boundary_stats(worker).unwrap();
    assert_eq!(stats.state, BoundaryState::Idle);
    assert!(!stats.worker_started);
    assert!(pipeline.boundary_stats(sink).is_none());

    pipeline.write(worker, 1).unwrap();
    assert_eq!(pipeline.boundary_state(worker), Some(BoundaryState::Draining));
    assert!(pipeline.boundary_stats(worker).unwrap().worker_started);

    pipeline.wait(worker).unwrap();
    assert_eq!(pipeline.boundary_state(worker), Some(BoundaryState::Idle));
    pipeline.shutdown();
}

#[test]
fn test_concurrent_producers() {
    let (sink, items) = CollectorSink::new("sink");
    let mut b = PipelineBuilder::<i64>::new();
    let src = b.add_passthrough("src");
    let worker = b.add_async("worker");
    let sink = b.add_stage(sink);
    b.chain([src, worker, sink]).unwrap();
    let pipeline = b.build().unwrap();

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let handle = pipeline.node(src).unwrap();
            thread::spawn(move || {
                for i in 0..250 {
                    handle.write(p * 1000 + i).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    pipeline.wait(src).unwrap();

    let mut seen = items.take();
    assert_eq!(seen.len(), 1000);
    // Each producer's items keep their relative order.
    for p in 0..4 {
        let mine: Vec<i64> = seen.iter().copied().filter(|v| v / 1000 == p).collect();
        assert_eq!(mine, (0..250).map(|i| p * 1000 + i).collect::<Vec<_>>());
    }
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 1000);
    pipeline.shutdown();
}

#[test]
fn test_split_into_parallel_boundaries() {
    let (left, left_items) = CollectorSink::new("left");
    let (right, right_items) = CollectorSink::new("right");
    let mut b = PipelineBuilder::<serde_json::Value>::new();
    let split = b.add_split("split");
    let left_async = b.add_async("left_async");
    let right_async = b.add_async("right_async");
    let left = b.add_stage(left);
    let right = b.add_stage(right);
    let fan = b.connect(split, [left_async, right_async]).unwrap();
    b.connect(fan, [left, right]).unwrap();
    let pipeline = b.build().unwrap();

    for i in 0..10 {
        pipeline
            .write(split, serde_json::json!([i, -i]))
            .unwrap();
    }
    pipeline.wait(split).unwrap();

    assert_eq!(left_items.len(), 10);
    assert_eq!(right_items.items()[9], serde_json::json!(-9));
    pipeline.shutdown();
}

#[test]
fn test_worker_thread_name_from_config() {
    let log = EventLog::new();
    let config = RuntimeConfig {
        worker_name_prefix: "dsp".to_string(),
        ..RuntimeConfig::default()
    };
    let mut b = PipelineBuilder::<i64>::with_config(config);
    let worker = b.add_async("fft");
    let sink = b.add_stage(StageBuilder::new("sink", &log).sink().build());
    b.connect(worker, sink).unwrap();
    let pipeline = b.build().unwrap();

    pipeline.write(worker, 1).unwrap();
    pipeline.wait(worker).unwrap();
    assert_eq!(log.events()[0].thread.as_deref(), Some("dsp-fft"));
    pipeline.shutdown();
}

#[test]
fn test_failure_channel_overflow_drops_reports() {
    let log = EventLog::new();
    let config = RuntimeConfig {
        failure_channel_capacity: 2,
        ..RuntimeConfig::default()
    };
    let mut b = PipelineBuilder::<i64>::with_config(config);
    let worker = b.add_async("worker");
    let gate = b.add_stage(StageBuilder::new("gate", &log).fail_on(0).build());
    b.connect(worker, gate).unwrap();
    let pipeline = b.build().unwrap();

    for _ in 0..5 {
        pipeline.write(worker, 0).unwrap();
    }
    pipeline.wait(worker).unwrap();

    assert_eq!(pipeline.drain_failures().len(), 2);
    assert_eq!(pipeline.boundary_stats(worker).unwrap().failed, 5);
    pipeline.shutdown();
}

// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Multi-source merge tests.

mod common;

use common::{drain, event_times, MemorySource};
use roboplay::{
    IterableSource, IteratorResult, MessageIteratorArgs, MultiSource, PlaybackError, Severity,
    WorkerSource,
};

fn topics(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn scenario_sources() -> Vec<Box<dyn IterableSource>> {
    vec![
        MemorySource::new("A")
            .topic("a", "A")
            .events("a", &[0, 2, 7])
            .range(0, 10)
            .boxed(),
        MemorySource::new("B")
            .topic("b", "B")
            .events("b", &[5, 9, 12])
            .range(5, 15)
            .boxed(),
    ]
}

#[test]
fn test_two_source_scenario() {
    let mut multi = MultiSource::new(scenario_sources());
    let init = multi.initialize().unwrap();
    assert_eq!(init.start, 0);
    assert_eq!(init.end, 15);
    assert!(init.problems.is_empty());

    let items = drain(
        multi
            .message_iterator(MessageIteratorArgs::new(topics(&["a", "b"]), 0, 15))
            .unwrap(),
    );
    assert_eq!(event_times(&items), vec![0, 2, 5, 7, 9, 12]);
    let order: Vec<&str> = items
        .iter()
        .filter_map(|i| i.event().map(|e| e.topic.as_str()))
        .collect();
    assert_eq!(order, vec!["a", "a", "b", "a", "b", "b"]);
}

#[test]
fn test_window_is_intersected_per_source() {
    let mut multi = MultiSource::new(scenario_sources());
    multi.initialize().unwrap();
    let items = drain(
        multi
            .message_iterator(MessageIteratorArgs::new(topics(&["a", "b"]), 6, 11))
            .unwrap(),
    );
    assert_eq!(event_times(&items), vec![7, 9]);
}

#[test]
fn test_shared_topic_with_same_schema() {
    let mut multi = MultiSource::new(vec![
        MemorySource::new("one")
            .topic("imu", "sensor_msgs/Imu")
            .events("imu", &[1])
            .boxed(),
        MemorySource::new("two")
            .topic("imu", "sensor_msgs/Imu")
            .events("imu", &[2])
            .boxed(),
    ]);
    let init = multi.initialize().unwrap();
    assert_eq!(init.topics.len(), 1);
    assert!(init.problems.is_empty());
}

#[test]
fn test_shared_topic_with_different_schema() {
    let mut multi = MultiSource::new(vec![
        MemorySource::new("one")
            .topic("imu", "sensor_msgs/Imu")
            .events("imu", &[1])
            .boxed(),
        MemorySource::new("two")
            .topic("imu", "custom_msgs/Imu")
            .events("imu", &[2])
            .boxed(),
    ]);
    let init = multi.initialize().unwrap();
    assert_eq!(init.problems.len(), 1);
    assert_eq!(init.problems[0].severity, Severity::Warn);
    assert!(init.problems[0].message.contains("\"imu\""));
}

#[test]
fn test_conflicting_datatype_reported_once() {
    let mut multi = MultiSource::new(vec![
        MemorySource::new("one").datatype("Pose", &["x", "y"]).boxed(),
        MemorySource::new("two").datatype("Pose", &["x", "y", "z"]).boxed(),
        MemorySource::new("three").datatype("Pose", &["x", "y", "z"]).boxed(),
    ]);
    let init = multi.initialize().unwrap();
    let messages: Vec<&str> = init.problems.iter().map(|p| p.message.as_str()).collect();
    assert_eq!(messages, vec!["Different datatypes found for schema \"Pose\""]);
    assert_eq!(init.datatypes["Pose"].definitions.len(), 2);
}

#[test]
fn test_initialize_twice_is_identical() {
    let mut multi = MultiSource::new(vec![
        MemorySource::new("one")
            .topic("imu", "A")
            .datatype("Pose", &["x"])
            .events("imu", &[1, 4])
            .boxed(),
        MemorySource::new("two")
            .topic("imu", "B")
            .datatype("Pose", &["y"])
            .events("imu", &[2, 8])
            .boxed(),
    ]);
    let first = multi.initialize().unwrap();
    let second = multi.initialize().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.problems.len(), 2);
}

#[test]
fn test_merge_keeps_every_event_once() {
    // Deterministic pseudo-random times per source
    let mut seed: u64 = 0x2545_f491;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        seed % 1_000
    };

    let mut sources = Vec::new();
    let mut total = 0;
    for index in 0..5 {
        let topic = format!("t{index}");
        let mut times: Vec<u64> = (0..40).map(|_| next()).collect();
        times.sort_unstable();
        total += times.len();
        sources.push(
            MemorySource::new(&format!("s{index}"))
                .topic(&topic, "T")
                .events(&topic, &times)
                .range(0, 1_000)
                .boxed(),
        );
    }

    let mut multi = MultiSource::new(sources);
    let init = multi.initialize().unwrap();
    let items = drain(
        multi
            .message_iterator(MessageIteratorArgs::new(init.topic_names(), 0, 1_000))
            .unwrap(),
    );

    let times = event_times(&items);
    assert_eq!(times.len(), total);
    assert!(times.windows(2).all(|w| w[0] <= w[1]));

    for index in 0..5 {
        let topic = format!("t{index}");
        let count = items
            .iter()
            .filter(|i| i.event().is_some_and(|e| e.topic == topic))
            .count();
        assert_eq!(count, 40, "events lost or duplicated on {topic}");
    }
}

#[test]
fn test_one_failed_source_is_a_problem() {
    let mut multi = MultiSource::new(vec![
        MemorySource::new("good.mcap")
            .topic("a", "A")
            .events("a", &[1, 2])
            .boxed(),
        MemorySource::new("broken.mcap")
            .failing_init("invalid magic")
            .boxed(),
    ]);
    let init = multi.initialize().unwrap();
    assert_eq!(multi.active_source_count(), 1);
    assert_eq!(init.problems.len(), 1);
    assert_eq!(init.problems[0].severity, Severity::Error);
    assert_eq!(
        init.problems[0].message,
        "Failed to initialize source \"broken.mcap\": invalid magic"
    );
}

#[test]
fn test_every_source_failing_is_fatal() {
    let mut multi = MultiSource::new(vec![
        MemorySource::new("x").failing_init("bad").boxed(),
        MemorySource::new("y").failing_init("worse").boxed(),
    ]);
    let err = multi.initialize().unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, PlaybackError::AllSourcesFailed { ref errors } if errors.len() == 2));
}

#[test]
fn test_corrupt_message_does_not_stop_merge() {
    let mut multi = MultiSource::new(vec![
        MemorySource::new("A")
            .topic("a", "A")
            .events("a", &[1, 3, 5])
            .corrupt("a", 2)
            .boxed(),
        MemorySource::new("B")
            .topic("b", "B")
            .events("b", &[2, 4])
            .boxed(),
    ]);
    multi.initialize().unwrap();
    let items = drain(
        multi
            .message_iterator(MessageIteratorArgs::new(topics(&["a", "b"]), 0, 10))
            .unwrap(),
    );
    assert_eq!(event_times(&items), vec![1, 2, 3, 4, 5]);
    let problems: Vec<_> = items
        .iter()
        .filter_map(|i| match i {
            IteratorResult::Problem(p) => Some(p),
            IteratorResult::Event(_) => None,
        })
        .collect();
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].severity, Severity::Error);
}

#[test]
fn test_failed_stream_drops_only_that_source() {
    let mut multi = MultiSource::new(vec![
        MemorySource::new("A")
            .topic("a", "A")
            .events("a", &[1, 3, 5])
            .boxed(),
        MemorySource::new("B")
            .topic("b", "B")
            .events("b", &[2, 4, 6])
            .failing_after(1)
            .boxed(),
    ]);
    multi.initialize().unwrap();
    let items = drain(
        multi
            .message_iterator(MessageIteratorArgs::new(topics(&["a", "b"]), 0, 10))
            .unwrap(),
    );
    assert_eq!(event_times(&items), vec![1, 2, 3, 5]);
    assert_eq!(multi.active_source_count(), 1);

    // The dropped source stays out of later passes
    let items = drain(
        multi
            .message_iterator(MessageIteratorArgs::new(topics(&["a", "b"]), 0, 10))
            .unwrap(),
    );
    assert_eq!(event_times(&items), vec![1, 3, 5]);
}

#[test]
fn test_workers_merge_like_inline_sources() {
    let workers: Vec<Box<dyn IterableSource>> = scenario_sources()
        .into_iter()
        .map(|s| Box::new(WorkerSource::spawn(s, 2).unwrap()) as Box<dyn IterableSource>)
        .collect();
    let mut multi = MultiSource::new(workers);
    let init = multi.initialize().unwrap();
    assert_eq!((init.start, init.end), (0, 15));

    let items = drain(
        multi
            .message_iterator(MessageIteratorArgs::new(topics(&["a", "b"]), 0, 15))
            .unwrap(),
    );
    assert_eq!(event_times(&items), vec![0, 2, 5, 7, 9, 12]);
    multi.dispose();
}

// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! MCAP source tests over generated files.

mod common;

use std::path::{Path, PathBuf};

use common::{drain, event_times, temp_dir, write_mcap, ChannelSpec, MessageSpec};
use roboplay::io::formats::mcap::McapSource;
use roboplay::io::metadata::SourceLocation;
use roboplay::io::FileFormat;
use roboplay::{
    open_source, BackfillArgs, IterableSource, IteratorResult, MessageIteratorArgs, Payload,
    PlaybackEngine, PlayerConfig, PlayerState, Severity, SourceDescriptor,
};

fn channels() -> Vec<ChannelSpec> {
    vec![
        ChannelSpec::json("/imu", "Imu", &["x", "y"]),
        ChannelSpec::ros1("/status", "std_msgs/String", "string data\n"),
    ]
}

fn sample_messages() -> Vec<MessageSpec> {
    vec![
        MessageSpec::json(0, 1),
        MessageSpec::raw(1, 2, b"ok"),
        MessageSpec::json(0, 3),
        MessageSpec::raw(1, 4, b"ok"),
        MessageSpec::json(0, 5),
        MessageSpec::raw(1, 6, b"ok"),
    ]
}

fn write_sample(dir: &Path) -> PathBuf {
    let path = dir.join("sample.mcap");
    write_mcap(&path, &channels(), &sample_messages(), Some(2));
    path
}

fn open(path: &Path) -> McapSource {
    McapSource::new(SourceLocation::Path(path.to_path_buf()))
}

fn both_topics() -> Vec<String> {
    vec!["/imu".to_string(), "/status".to_string()]
}

#[test]
fn test_initialize_reads_summary() {
    let (dir, _guard) = temp_dir("mcap_init");
    let path = write_sample(&dir);

    let mut source = open(&path);
    let init = source.initialize().unwrap();

    assert_eq!(init.start, 1);
    assert_eq!(init.end, 6);
    assert_eq!(init.profile.as_deref(), Some("ros1"));
    assert_eq!(init.topic_names(), both_topics());
    assert_eq!(init.topic("/imu").unwrap().schema_name, "Imu");
    assert_eq!(init.topic("/imu").unwrap().message_count, Some(3));
    assert!(init.datatypes.contains_key("Imu"));
    assert!(init.datatypes.contains_key("std_msgs/String"));
    assert!(init.datatypes["Imu"].field("x").is_some());
    assert!(init.problems.is_empty());
}

#[test]
fn test_iterates_window_across_chunks() {
    let (dir, _guard) = temp_dir("mcap_window");
    let path = write_sample(&dir);

    let mut source = open(&path);
    source.initialize().unwrap();
    let items = drain(
        source
            .message_iterator(MessageIteratorArgs::new(both_topics(), 2, 5))
            .unwrap(),
    );
    assert_eq!(event_times(&items), vec![2, 3, 4, 5]);

    let imu = items[1].event().unwrap();
    assert_eq!(imu.topic, "/imu");
    match &imu.payload {
        Payload::Json(value) => assert_eq!(value["x"].as_u64(), Some(3)),
        other => panic!("expected JSON payload, got {other:?}"),
    }
    let status = items[0].event().unwrap();
    assert_eq!(status.payload, Payload::Raw(b"ok".to_vec()));
    assert_eq!(status.size_in_bytes, 2);
}

#[test]
fn test_reverse_and_topic_filter() {
    let (dir, _guard) = temp_dir("mcap_reverse");
    let path = write_sample(&dir);

    let mut source = open(&path);
    source.initialize().unwrap();
    let items = drain(
        source
            .message_iterator(MessageIteratorArgs::new(vec!["/imu".into()], 0, 10).reversed())
            .unwrap(),
    );
    assert_eq!(event_times(&items), vec![5, 3, 1]);
}

#[test]
fn test_overlapping_chunks_stay_ordered() {
    let (dir, _guard) = temp_dir("mcap_overlap");
    let path = dir.join("overlap.mcap");
    let messages = vec![
        MessageSpec::json(0, 1),
        MessageSpec::json(0, 10),
        MessageSpec::json(0, 5),
        MessageSpec::json(0, 6),
        MessageSpec::json(0, 2),
        MessageSpec::json(0, 12),
    ];
    write_mcap(&path, &channels()[..1], &messages, Some(2));

    let mut source = open(&path);
    let init = source.initialize().unwrap();
    assert_eq!((init.start, init.end), (1, 12));

    let forward = drain(
        source
            .message_iterator(MessageIteratorArgs::new(vec!["/imu".into()], 0, 20))
            .unwrap(),
    );
    assert_eq!(event_times(&forward), vec![1, 2, 5, 6, 10, 12]);

    let backward = drain(
        source
            .message_iterator(MessageIteratorArgs::new(vec!["/imu".into()], 0, 20).reversed())
            .unwrap(),
    );
    assert_eq!(event_times(&backward), vec![12, 10, 6, 5, 2, 1]);
}

#[test]
fn test_corrupt_message_is_skipped_with_one_problem() {
    let (dir, _guard) = temp_dir("mcap_corrupt");
    let path = dir.join("corrupt.mcap");
    let messages = vec![
        MessageSpec::json(0, 1),
        MessageSpec::corrupt(0, 2),
        MessageSpec::json(0, 3),
        MessageSpec::json(0, 4),
    ];
    write_mcap(&path, &channels()[..1], &messages, None);

    let mut source = open(&path);
    source.initialize().unwrap();
    let items = drain(
        source
            .message_iterator(MessageIteratorArgs::new(vec!["/imu".into()], 0, 10))
            .unwrap(),
    );

    assert_eq!(event_times(&items), vec![1, 3, 4]);
    let problems: Vec<_> = items
        .iter()
        .filter_map(|i| match i {
            IteratorResult::Problem(p) => Some(p),
            IteratorResult::Event(_) => None,
        })
        .collect();
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].severity, Severity::Error);
    assert!(problems[0].message.contains("/imu"));
}

#[test]
fn test_backfill_finds_latest_per_topic() {
    let (dir, _guard) = temp_dir("mcap_backfill");
    let path = write_sample(&dir);

    let mut source = open(&path);
    source.initialize().unwrap();
    let found = source
        .backfill_messages(BackfillArgs {
            topics: both_topics(),
            time: 4,
        })
        .unwrap();
    assert_eq!(found["/imu"].receive_time, 3);
    assert_eq!(found["/status"].receive_time, 4);

    let none = source
        .backfill_messages(BackfillArgs {
            topics: both_topics(),
            time: 0,
        })
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_in_memory_bytes() {
    let (dir, _guard) = temp_dir("mcap_bytes");
    let path = write_sample(&dir);
    let bytes = std::fs::read(&path).unwrap();

    let mut source = McapSource::from_bytes("memory.mcap", bytes);
    let init = source.initialize().unwrap();
    assert_eq!(init.topics.len(), 2);

    source.dispose();
    source.dispose();
    assert!(source
        .message_iterator(MessageIteratorArgs::new(both_topics(), 0, 10))
        .is_err());
}

#[test]
fn test_garbage_file_fails_to_initialize() {
    let (dir, _guard) = temp_dir("mcap_garbage");
    let path = dir.join("garbage.mcap");
    std::fs::write(&path, b"definitely not an mcap file").unwrap();

    let mut source = open(&path);
    assert!(source.initialize().is_err());
}

fn put_string(body: &mut Vec<u8>, value: &str) {
    body.extend_from_slice(&(value.len() as u32).to_le_bytes());
    body.extend_from_slice(value.as_bytes());
}

fn put_record(out: &mut Vec<u8>, opcode: u8, body: &[u8]) {
    out.push(opcode);
    out.extend_from_slice(&(body.len() as u64).to_le_bytes());
    out.extend_from_slice(body);
}

fn channel_record(id: u16, schema_id: u16, topic: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&id.to_le_bytes());
    body.extend_from_slice(&schema_id.to_le_bytes());
    put_string(&mut body, topic);
    put_string(&mut body, "json");
    body.extend_from_slice(&0u32.to_le_bytes());
    body
}

fn message_record(channel: u16, log_time: u64) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&channel.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(&log_time.to_le_bytes());
    body.extend_from_slice(&log_time.to_le_bytes());
    body.extend_from_slice(format!("{{\"x\": {log_time}}}").as_bytes());
    body
}

/// Unchunked file without a summary where channel 1 names schema 7,
/// which is never written. Channel 2 is intact.
fn file_with_unknown_schema() -> Vec<u8> {
    let mut out = mcap::MAGIC.to_vec();

    let mut header = Vec::new();
    put_string(&mut header, "");
    put_string(&mut header, "handwritten");
    put_record(&mut out, 0x01, &header);

    let schema_data = br#"{"type":"object","properties":{"x":{"type":"number"}}}"#;
    let mut schema = Vec::new();
    schema.extend_from_slice(&1u16.to_le_bytes());
    put_string(&mut schema, "Imu");
    put_string(&mut schema, "jsonschema");
    schema.extend_from_slice(&(schema_data.len() as u32).to_le_bytes());
    schema.extend_from_slice(schema_data);
    put_record(&mut out, 0x03, &schema);

    put_record(&mut out, 0x04, &channel_record(1, 7, "/lost"));
    put_record(&mut out, 0x04, &channel_record(2, 1, "/imu"));
    put_record(&mut out, 0x05, &message_record(1, 1));
    put_record(&mut out, 0x05, &message_record(2, 2));
    put_record(&mut out, 0x05, &message_record(2, 3));
    put_record(&mut out, 0x05, &message_record(1, 4));

    put_record(&mut out, 0x0F, &0u32.to_le_bytes());
    let mut footer = Vec::new();
    footer.extend_from_slice(&0u64.to_le_bytes());
    footer.extend_from_slice(&0u64.to_le_bytes());
    footer.extend_from_slice(&0u32.to_le_bytes());
    put_record(&mut out, 0x02, &footer);

    out.extend_from_slice(mcap::MAGIC);
    out
}

#[test]
fn test_channel_with_unknown_schema_is_skipped() {
    let mut source = McapSource::from_bytes("orphan.mcap", file_with_unknown_schema());
    let init = source.initialize().unwrap();

    assert_eq!(init.topic_names(), vec!["/imu".to_string()]);
    assert_eq!((init.start, init.end), (2, 3));
    assert_eq!(init.topic("/imu").unwrap().message_count, Some(2));
    assert!(init.datatypes["Imu"].field("x").is_some());
    assert_eq!(init.problems.len(), 1);
    assert_eq!(init.problems[0].severity, Severity::Error);
    assert!(init.problems[0].message.contains("\"/lost\""));

    let items = drain(
        source
            .message_iterator(MessageIteratorArgs::new(
                vec!["/imu".into(), "/lost".into()],
                0,
                10,
            ))
            .unwrap(),
    );
    assert_eq!(event_times(&items), vec![2, 3]);
    assert!(items.iter().all(|i| matches!(i, IteratorResult::Event(_))));

    let found = source
        .backfill_messages(BackfillArgs {
            topics: vec!["/imu".into()],
            time: 10,
        })
        .unwrap();
    assert_eq!(found["/imu"].receive_time, 3);
}

#[test]
fn test_factory_detects_mcap() {
    let (dir, _guard) = temp_dir("mcap_factory");
    let path = write_sample(&dir);

    let sources = open_source(&SourceDescriptor::File(path)).unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].format(), FileFormat::Mcap);
}

#[test]
fn test_engine_plays_files_through_workers() {
    let (dir, _guard) = temp_dir("mcap_engine");
    let first = write_sample(&dir);
    let second = dir.join("second.mcap");
    write_mcap(
        &second,
        &[ChannelSpec::json("/gps", "Gps", &["lat"])],
        &[MessageSpec::json(0, 3), MessageSpec::json(0, 8)],
        None,
    );

    let config = PlayerConfig::default()
        .with_workers(true)
        .with_worker_batch_size(2)
        .with_backfill(false);
    let mut engine =
        PlaybackEngine::open(&SourceDescriptor::Files(vec![first, second]), config).unwrap();
    engine.start().unwrap();
    assert_eq!(engine.range().unwrap().end, 8);
    engine.play().unwrap();

    let mut times = Vec::new();
    let mut topics = Vec::new();
    while let Some(frame) = engine.next_frame().unwrap() {
        for event in &frame.events {
            times.push(event.receive_time);
            topics.push(event.topic.clone());
        }
        if frame.state != PlayerState::Playing {
            break;
        }
    }

    assert_eq!(times, vec![1, 2, 3, 3, 4, 5, 6, 8]);
    // Equal times follow registration order
    assert_eq!(topics[2], "/imu");
    assert_eq!(topics[3], "/gps");
    engine.close();
}

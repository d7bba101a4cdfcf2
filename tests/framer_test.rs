mod common;

use bytes::BytesMut;
use common::{Event, Recorder};
use fastcgi_codec::{Framer, IoSink, Parser, ProtocolStatus, Role, Settings};

fn framer() -> Framer {
    common::setup();
    Framer::new(Settings::default())
}

#[test]
fn begin_request_wire_form() {
    let mut out = BytesMut::new();
    framer()
        .begin_request(&mut out, 1, Role::Responder, 0)
        .unwrap();
    assert_eq!(&out[..], &[
        0x01, 0x01, 0x00, 0x01, 0x00, 0x08, 0x00, 0x00, // header
        0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // body
    ]);
}

#[test]
fn abort_request_wire_form() {
    let mut out = BytesMut::new();
    framer().abort_request(&mut out, 1).unwrap();
    assert_eq!(&out[..], &[0x01, 0x02, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
}

#[test]
fn end_request_wire_form() {
    let mut out = BytesMut::new();
    framer()
        .end_request(&mut out, 1, 42, ProtocolStatus::RequestComplete)
        .unwrap();
    assert_eq!(&out[..], &[
        0x01, 0x03, 0x00, 0x01, 0x00, 0x08, 0x00, 0x00, // header
        0x00, 0x00, 0x00, 0x2a, 0x00, 0x00, 0x00, 0x00, // body
    ]);
}

#[test]
fn records_are_padded_to_eight_bytes() {
    let mut out = BytesMut::new();
    framer().stdout(&mut out, 1, b"hello, world!").unwrap();
    // 13 content bytes round up to 16.
    assert_eq!(out.len(), 8 + 13 + 3);
    assert_eq!(out[6], 3);
    assert_eq!(&out[8 + 13..], &[0, 0, 0]);
}

#[test]
fn empty_payload_is_the_close_record() {
    let mut out = BytesMut::new();
    framer().stdin(&mut out, 1, &[]).unwrap();
    assert_eq!(&out[..], &[0x01, 0x05, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
}

#[test]
fn management_records_use_request_id_zero() {
    let mut out = BytesMut::new();
    framer().query(&mut out, &[0x01, 0x00, b'x']).unwrap();
    assert_eq!(&out[..4], &[0x01, 0x09, 0x00, 0x00]);

    let mut out = BytesMut::new();
    framer().reply(&mut out, &[0x01, 0x00, b'x']).unwrap();
    assert_eq!(&out[..4], &[0x01, 0x0a, 0x00, 0x00]);
}

#[test]
fn oversized_payload_is_split() {
    let payload = vec![0x5a; 65536];
    let mut out = BytesMut::new();
    framer().stdout(&mut out, 1, &payload).unwrap();

    // First record carries 65535 bytes with one padding byte.
    assert_eq!(&out[..8], &[0x01, 0x06, 0x00, 0x01, 0xff, 0xff, 0x01, 0x00]);
    let second = 8 + 65535 + 1;
    assert_eq!(&out[second..second + 8], &[
        0x01, 0x06, 0x00, 0x01, 0x00, 0x01, 0x07, 0x00
    ]);
    assert_eq!(out.len(), second + 8 + 1 + 7);
}

#[test]
fn split_roundtrip_reassembles() {
    common::setup();
    let payload: Vec<u8> = (0..100_000u32).map(|i| i as u8).collect();
    let mut out = BytesMut::new();
    framer().stdout(&mut out, 1, &payload).unwrap();

    let mut parser = Parser::new(Settings::default());
    let mut recorder = Recorder::new();
    let consumed = parser.feed(&out, &mut recorder);
    assert_eq!(consumed, out.len());

    let records: Vec<u16> = recorder
        .events
        .iter()
        .filter_map(|event| match event {
            Event::Record { content_length, .. } => Some(*content_length),
            _ => None,
        })
        .collect();
    assert_eq!(records, vec![65535, 34465]);

    let stdout: Vec<u8> = recorder
        .events
        .iter()
        .filter_map(|event| match event {
            Event::Stdout(data) => Some(data.clone()),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(stdout, payload);
}

#[test]
fn two_records_roundtrip_in_order() {
    common::setup();
    let framer = framer();
    let mut out = BytesMut::new();
    framer.stdout(&mut out, 1, b"first").unwrap();
    framer.stderr(&mut out, 1, b"second").unwrap();
    framer.end_request(&mut out, 1, 0, ProtocolStatus::RequestComplete).unwrap();

    let mut parser = Parser::new(Settings::default());
    let mut recorder = Recorder::new();
    parser.feed(&out, &mut recorder);
    let meaningful: Vec<&Event> = recorder
        .events
        .iter()
        .filter(|event| !matches!(event, Event::Record { .. } | Event::RecordEnd))
        .collect();
    assert_eq!(meaningful, vec![
        &Event::Stdout(b"first".to_vec()),
        &Event::Stderr(b"second".to_vec()),
        &Event::EndRequest {
            app_status: 0,
            protocol_status: ProtocolStatus::RequestComplete,
        },
    ]);
}

#[test]
fn io_sink_writes_through() {
    let mut sink = IoSink(Vec::new());
    framer().abort_request(&mut sink, 3).unwrap();
    assert_eq!(&sink.0[..], &[0x01, 0x02, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00]);
}

#[test]
fn triple_split_emits_three_records() {
    let payload = vec![0; 2 * 65535 + 1];
    let mut out = BytesMut::new();
    framer().data(&mut out, 9, &payload).unwrap();

    let mut parser = Parser::new(Settings::default());
    let mut recorder = Recorder::new();
    parser.feed(&out, &mut recorder);
    let records = recorder
        .events
        .iter()
        .filter(|event| matches!(event, Event::Record { .. }))
        .count();
    assert_eq!(records, 3);
}

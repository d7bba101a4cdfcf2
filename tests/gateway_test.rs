mod common;

use bytes::BytesMut;
use common::{Event, Recorder};
use fastcgi_codec::{
    Framer, Gateway, GatewayHandler, Parser, ProtocolStatus, Response, Role, Settings, pairs,
};

#[derive(Default)]
struct ClientHandler {
    wire: Vec<u8>,
    replies: Vec<(Vec<u8>, Vec<u8>)>,
    stdout_chunks: usize,
    stdout_ends: Vec<(u16, Vec<u8>)>,
    stderr_chunks: usize,
    stderr_ends: Vec<(u16, Vec<u8>)>,
    completed: Vec<(u16, u32, ProtocolStatus)>,
}

impl GatewayHandler for ClientHandler {
    fn send(&mut self, data: &[u8]) {
        self.wire.extend_from_slice(data);
    }

    fn reply(&mut self, name: &[u8], value: &[u8]) {
        self.replies.push((name.to_vec(), value.to_vec()));
    }

    fn stdout_chunk(&mut self, _response: &mut Response) {
        self.stdout_chunks += 1;
    }

    fn stdout_end(&mut self, response: &mut Response) {
        self.stdout_ends
            .push((response.id(), response.stdout().to_vec()));
    }

    fn stderr_chunk(&mut self, _response: &mut Response) {
        self.stderr_chunks += 1;
    }

    fn stderr_end(&mut self, response: &mut Response) {
        let stderr = response.take_stderr();
        assert!(response.stderr().is_empty());
        self.stderr_ends.push((response.id(), stderr.to_vec()));
    }

    fn request_complete(&mut self, response: &mut Response) {
        assert!(response.is_complete());
        self.completed
            .push((response.id(), response.app_status(), response.protocol_status()));
    }
}

#[test]
fn outbound_request_wire_sequence() {
    common::setup();
    let mut gateway = Gateway::new(ClientHandler::default());
    gateway.open_request(1, Role::Responder);
    gateway.send_header(1, b"REQUEST_METHOD", b"GET");
    gateway.close_headers(1);
    gateway.send_body(1, b"payload");
    gateway.close_body(1);

    let mut parser = Parser::new(Settings::default());
    let mut recorder = Recorder::new();
    let wire = &gateway.handler().wire;
    let consumed = parser.feed(wire, &mut recorder);
    assert_eq!(consumed, wire.len());

    let mut expected_params = BytesMut::new();
    pairs::encode_pair(&mut expected_params, b"REQUEST_METHOD", b"GET");

    let meaningful: Vec<&Event> = recorder
        .events
        .iter()
        .filter(|event| !matches!(event, Event::Record { .. } | Event::RecordEnd))
        .collect();
    assert_eq!(meaningful, vec![
        &Event::BeginRequest {
            role: Role::Responder,
            flags: 0,
        },
        &Event::Headers(expected_params.to_vec()),
        &Event::HeadersEnd,
        &Event::Stdin(b"payload".to_vec()),
        &Event::StdinEnd,
    ]);
}

#[test]
fn operations_on_unused_ids_are_ignored() {
    common::setup();
    let mut gateway = Gateway::new(ClientHandler::default());
    gateway.send_header(9, b"REQUEST_METHOD", b"GET");
    gateway.close_headers(9);
    gateway.send_body(9, b"payload");
    gateway.close_body(9);
    gateway.abort_request(9);
    assert!(gateway.handler().wire.is_empty());
}

#[test]
fn inbound_response_aggregation() {
    common::setup();
    let framer = Framer::new(Settings::default());
    let mut wire = BytesMut::new();
    framer.stdout(&mut wire, 1, b"Status: 200 OK\r\n\r\n").unwrap();
    framer.stdout(&mut wire, 1, b"body").unwrap();
    framer.stdout(&mut wire, 1, &[]).unwrap();
    framer.stderr(&mut wire, 1, b"warning").unwrap();
    framer.stderr(&mut wire, 1, &[]).unwrap();
    framer
        .end_request(&mut wire, 1, 7, ProtocolStatus::RequestComplete)
        .unwrap();

    let mut gateway = Gateway::new(ClientHandler::default());
    let consumed = gateway.feed(&wire);
    assert_eq!(consumed, wire.len());

    let handler = gateway.handler();
    assert_eq!(handler.stdout_chunks, 2);
    assert_eq!(handler.stdout_ends, vec![(
        1,
        b"Status: 200 OK\r\n\r\nbody".to_vec(),
    )]);
    assert_eq!(handler.stderr_chunks, 1);
    assert_eq!(handler.stderr_ends, vec![(1, b"warning".to_vec())]);
    assert_eq!(handler.completed, vec![(1, 7, ProtocolStatus::RequestComplete)]);

    // The binding is released: contents cleared, buffers retained.
    let response = gateway.response(1).expect("response state retained");
    assert!(response.stdout().is_empty());
    assert!(!response.is_complete());
}

#[test]
fn query_and_reply_roundtrip() {
    common::setup();
    let mut gateway = Gateway::new(ClientHandler::default());
    gateway.query(b"FCGI_MPXS_CONNS");

    let mut parser = Parser::new(Settings::default());
    let mut recorder = Recorder::new();
    parser.feed(&gateway.handler().wire, &mut recorder);
    assert!(recorder.events.contains(&Event::QueryName(b"FCGI_MPXS_CONNS".to_vec())));

    let framer = Framer::new(Settings::default());
    let mut payload = BytesMut::new();
    pairs::encode_pair(&mut payload, b"FCGI_MPXS_CONNS", b"1");
    let mut reply = BytesMut::new();
    framer.reply(&mut reply, &payload).unwrap();
    gateway.feed(&reply);

    assert_eq!(gateway.handler().replies, vec![(
        b"FCGI_MPXS_CONNS".to_vec(),
        b"1".to_vec(),
    )]);
}

#[test]
fn abort_request_emits_record() {
    common::setup();
    let mut gateway = Gateway::new(ClientHandler::default());
    gateway.open_request(3, Role::Responder);
    gateway.abort_request(3);

    let mut parser = Parser::new(Settings::default());
    let mut recorder = Recorder::new();
    parser.feed(&gateway.handler().wire, &mut recorder);
    assert!(recorder.events.contains(&Event::AbortRequest));
}

#[test]
fn filter_data_stream() {
    common::setup();
    let mut gateway = Gateway::new(ClientHandler::default());
    gateway.open_request(4, Role::Filter);
    gateway.send_data(4, b"file contents");
    gateway.close_data(4);

    let mut parser = Parser::new(Settings::default());
    let mut recorder = Recorder::new();
    parser.feed(&gateway.handler().wire, &mut recorder);
    assert!(recorder.events.contains(&Event::BeginRequest {
        role: Role::Filter,
        flags: 0,
    }));
    assert!(recorder.events.contains(&Event::Data(b"file contents".to_vec())));
    assert!(recorder.events.contains(&Event::DataEnd));
}

#[test]
fn unseen_id_creates_response_state() {
    common::setup();
    let framer = Framer::new(Settings::default());
    let mut wire = BytesMut::new();
    framer.stdout(&mut wire, 11, b"unsolicited").unwrap();

    let mut gateway = Gateway::new(ClientHandler::default());
    gateway.feed(&wire);
    let response = gateway.response(11).expect("state created on first reference");
    assert_eq!(response.stdout(), b"unsolicited");
}

#![allow(dead_code)]

use fastcgi_codec::{Events, ProtocolStatus, Role};
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

static START: Once = Once::new();

/// Setup function that is only run once, even if called multiple times.
pub fn setup() {
    START.call_once(|| {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default subscriber failed");
    });
}

/// Parser events captured for assertions.
///
/// Adjacent chunks of the same byte stream are coalesced so the captured
/// sequence does not depend on how the input was sliced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Record {
        version: u8,
        request_id: u16,
        content_length: u16,
    },
    RecordEnd,
    BeginRequest {
        role: Role,
        flags: u8,
    },
    AbortRequest,
    EndRequest {
        app_status: u32,
        protocol_status: ProtocolStatus,
    },
    Headers(Vec<u8>),
    HeadersEnd,
    Stdin(Vec<u8>),
    StdinEnd,
    Stdout(Vec<u8>),
    StdoutEnd,
    Stderr(Vec<u8>),
    StderrEnd,
    Data(Vec<u8>),
    DataEnd,
    QueryName(Vec<u8>),
    QueryValue(Vec<u8>),
    QueryEnd,
    ReplyName(Vec<u8>),
    ReplyValue(Vec<u8>),
    ReplyEnd,
}

#[derive(Debug, Default)]
pub struct Recorder {
    pub events: Vec<Event>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_bytes(&mut self, event: Event) {
        use Event::*;
        if let Some(last) = self.events.last_mut() {
            match (last, &event) {
                (Headers(buf), Headers(data))
                | (Stdin(buf), Stdin(data))
                | (Stdout(buf), Stdout(data))
                | (Stderr(buf), Stderr(data))
                | (Data(buf), Data(data))
                | (QueryName(buf), QueryName(data))
                | (QueryValue(buf), QueryValue(data))
                | (ReplyName(buf), ReplyName(data))
                | (ReplyValue(buf), ReplyValue(data)) => {
                    buf.extend_from_slice(data);
                    return;
                }
                _ => {}
            }
        }
        self.events.push(event);
    }
}

impl Events for Recorder {
    fn on_record(&mut self, version: u8, request_id: u16, content_length: u16) {
        self.events.push(Event::Record {
            version,
            request_id,
            content_length,
        });
    }

    fn on_record_end(&mut self) {
        self.events.push(Event::RecordEnd);
    }

    fn on_begin_request(&mut self, role: Role, flags: u8) {
        self.events.push(Event::BeginRequest { role, flags });
    }

    fn on_abort_request(&mut self) {
        self.events.push(Event::AbortRequest);
    }

    fn on_end_request(&mut self, app_status: u32, protocol_status: ProtocolStatus) {
        self.events.push(Event::EndRequest {
            app_status,
            protocol_status,
        });
    }

    fn on_headers(&mut self, data: &[u8]) {
        self.push_bytes(Event::Headers(data.to_vec()));
    }

    fn on_headers_end(&mut self) {
        self.events.push(Event::HeadersEnd);
    }

    fn on_stdin(&mut self, data: &[u8]) {
        self.push_bytes(Event::Stdin(data.to_vec()));
    }

    fn on_stdin_end(&mut self) {
        self.events.push(Event::StdinEnd);
    }

    fn on_stdout(&mut self, data: &[u8]) {
        self.push_bytes(Event::Stdout(data.to_vec()));
    }

    fn on_stdout_end(&mut self) {
        self.events.push(Event::StdoutEnd);
    }

    fn on_stderr(&mut self, data: &[u8]) {
        self.push_bytes(Event::Stderr(data.to_vec()));
    }

    fn on_stderr_end(&mut self) {
        self.events.push(Event::StderrEnd);
    }

    fn on_data(&mut self, data: &[u8]) {
        self.push_bytes(Event::Data(data.to_vec()));
    }

    fn on_data_end(&mut self) {
        self.events.push(Event::DataEnd);
    }

    fn on_query_name(&mut self, data: &[u8]) {
        self.push_bytes(Event::QueryName(data.to_vec()));
    }

    fn on_query_value(&mut self, data: &[u8]) {
        self.push_bytes(Event::QueryValue(data.to_vec()));
    }

    fn on_query_end(&mut self) {
        self.events.push(Event::QueryEnd);
    }

    fn on_reply_name(&mut self, data: &[u8]) {
        self.push_bytes(Event::ReplyName(data.to_vec()));
    }

    fn on_reply_value(&mut self, data: &[u8]) {
        self.push_bytes(Event::ReplyValue(data.to_vec()));
    }

    fn on_reply_end(&mut self) {
        self.events.push(Event::ReplyEnd);
    }
}

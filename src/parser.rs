// Copyright 2022 jmjoy
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Incremental parser for inbound FastCGI traffic.
//!
//! The parser is a finite state machine fed arbitrary slices of the record
//! stream. It buffers nothing but an eight-byte staging area for record
//! headers and fixed-size bodies; payload bytes are forwarded to the
//! consumer as borrowed sub-slices of the fed input, in order, exactly
//! once. Errors latch the parser in a terminal state until [`Parser::reset`]
//! is called.

use crate::{
    error::ParseError,
    meta::{HEADER_LEN, Header, ProtocolStatus, RecordType, Role, Settings, VERSION_1},
    pairs::{PairEvents, PairParser},
};
use tracing::{debug, warn};

/// Consumer interface for the record parser.
///
/// One method per protocol event; all methods have no-op defaults so a
/// consumer implements only the records it cares about. Byte-carrying
/// events may fire several times per record when feed boundaries split a
/// payload; a zero-length stream record surfaces as a single `*_end`
/// event.
pub trait Events {
    /// A record header was recognized.
    fn on_record(&mut self, version: u8, request_id: u16, content_length: u16) {
        let _ = (version, request_id, content_length);
    }

    /// The current record, padding included, was fully consumed.
    fn on_record_end(&mut self) {}

    /// A begin-request body arrived.
    fn on_begin_request(&mut self, role: Role, flags: u8) {
        let _ = (role, flags);
    }

    /// An abort-request record arrived.
    fn on_abort_request(&mut self) {}

    /// An end-request body arrived.
    fn on_end_request(&mut self, app_status: u32, protocol_status: ProtocolStatus) {
        let _ = (app_status, protocol_status);
    }

    /// A chunk of the params stream arrived.
    fn on_headers(&mut self, data: &[u8]) {
        let _ = data;
    }

    /// The params stream ended.
    fn on_headers_end(&mut self) {}

    /// A chunk of the stdin stream arrived.
    fn on_stdin(&mut self, data: &[u8]) {
        let _ = data;
    }

    /// The stdin stream ended.
    fn on_stdin_end(&mut self) {}

    /// A chunk of the stdout stream arrived.
    fn on_stdout(&mut self, data: &[u8]) {
        let _ = data;
    }

    /// The stdout stream ended.
    fn on_stdout_end(&mut self) {}

    /// A chunk of the stderr stream arrived.
    fn on_stderr(&mut self, data: &[u8]) {
        let _ = data;
    }

    /// The stderr stream ended.
    fn on_stderr_end(&mut self) {}

    /// A chunk of the data stream arrived.
    fn on_data(&mut self, data: &[u8]) {
        let _ = data;
    }

    /// The data stream ended.
    fn on_data_end(&mut self) {}

    /// A chunk of a get-values name arrived.
    fn on_query_name(&mut self, data: &[u8]) {
        let _ = data;
    }

    /// A chunk of a get-values value arrived.
    fn on_query_value(&mut self, data: &[u8]) {
        let _ = data;
    }

    /// A get-values pair is complete.
    fn on_query_end(&mut self) {}

    /// A chunk of a get-values-result name arrived.
    fn on_reply_name(&mut self, data: &[u8]) {
        let _ = data;
    }

    /// A chunk of a get-values-result value arrived.
    fn on_reply_value(&mut self, data: &[u8]) {
        let _ = data;
    }

    /// A get-values-result pair is complete.
    fn on_reply_end(&mut self) {}
}

/// Observable states of the record parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Between records, accumulating a header
    Idle,
    /// Inside the content of a record of the given type
    Record(RecordType),
    /// Discarding trailing padding
    Padding,
    /// Terminal state after a protocol violation
    Failed,
}

/// Routes management pair events to the query or reply side of [`Events`].
struct ManagementEvents<'a, E> {
    events: &'a mut E,
    reply: bool,
}

impl<E: Events> PairEvents for ManagementEvents<'_, E> {
    fn on_name(&mut self, data: &[u8]) {
        if self.reply {
            self.events.on_reply_name(data);
        } else {
            self.events.on_query_name(data);
        }
    }

    fn on_value(&mut self, data: &[u8]) {
        if self.reply {
            self.events.on_reply_value(data);
        } else {
            self.events.on_query_value(data);
        }
    }

    fn on_pair(&mut self) {
        if self.reply {
            self.events.on_reply_end();
        } else {
            self.events.on_query_end();
        }
    }
}

/// Incremental push parser for FastCGI records.
#[derive(Debug)]
pub struct Parser {
    state: ParserState,
    error: Option<ParseError>,
    settings: Settings,
    /// Staging area for record headers and fixed-size bodies.
    staging: [u8; HEADER_LEN],
    /// Number of valid bytes in the staging area.
    staged: usize,
    /// Content bytes left to forward in the current record.
    remaining: usize,
    /// Padding bytes left to discard before the next record.
    padding: usize,
    /// Decoder for management name-value payloads. Its state survives
    /// record boundaries so pairs may span records.
    pairs: PairParser,
}

impl Parser {
    /// Creates a parser in the idle state.
    pub fn new(settings: Settings) -> Self {
        Self {
            state: ParserState::Idle,
            error: None,
            settings,
            staging: [0; HEADER_LEN],
            staged: 0,
            remaining: 0,
            padding: 0,
            pairs: PairParser::new(),
        }
    }

    /// Clears errors and resets the parser to the idle state.
    pub fn reset(&mut self) {
        self.state = ParserState::Idle;
        self.error = None;
        self.staged = 0;
        self.remaining = 0;
        self.padding = 0;
        self.pairs.reset();
    }

    /// Current state of the parser.
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// The latched error, if the parser has failed.
    pub fn error(&self) -> Option<ParseError> {
        self.error
    }

    /// The settings the parser was created with.
    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Feeds bytes to the parser, forwarding events through `events`.
    ///
    /// Returns the number of bytes consumed, which equals `data.len()`
    /// unless the parser has failed. The caller should inspect
    /// [`Parser::state`] after each call; once failed, `feed` consumes
    /// nothing until [`Parser::reset`].
    pub fn feed<E: Events>(&mut self, data: &[u8], events: &mut E) -> usize {
        let mut used = 0;
        // A slice may span several records; each turn of the loop walks the
        // header, body and padding stages of at most one record.
        while used < data.len() && self.state != ParserState::Failed {
            if self.state == ParserState::Idle {
                used += self.parse_header(&data[used..], events);
            }
            if let ParserState::Record(rtype) = self.state {
                used += self.parse_body(rtype, &data[used..], events);
            }
            if self.state == ParserState::Padding {
                used += self.skip_padding(&data[used..], events);
            }
        }
        used
    }

    /// Copies input into the staging area, up to its eight-byte capacity.
    fn stage(&mut self, data: &[u8]) -> usize {
        let take = (HEADER_LEN - self.staged).min(data.len());
        self.staging[self.staged..self.staged + take].copy_from_slice(&data[..take]);
        self.staged += take;
        take
    }

    fn parse_header<E: Events>(&mut self, data: &[u8], events: &mut E) -> usize {
        let used = self.stage(data);
        if self.staged < HEADER_LEN {
            return used;
        }
        let header = Header::parse(&self.staging);
        self.staged = 0;

        let Some(rtype) = RecordType::from_u8(header.rtype) else {
            self.fail(ParseError::UnknownRecordType { code: header.rtype });
            return used;
        };
        if header.version != VERSION_1 {
            warn!(version = header.version, "record version mismatch");
        }
        let expected = match rtype {
            RecordType::BeginRequest | RecordType::EndRequest => Some(8),
            RecordType::AbortRequest => Some(0),
            _ => None,
        };
        if let Some(expected) = expected
            && header.content_length != expected
        {
            self.fail(ParseError::FixedLengthMismatch {
                code: header.rtype,
                content_length: header.content_length,
            });
            return used;
        }

        debug!(
            ?rtype,
            request_id = header.request_id,
            content_length = header.content_length,
            "record header"
        );
        events.on_record(header.version, header.request_id, header.content_length);

        self.remaining = header.content_length as usize;
        self.padding = header.padding_length as usize;

        if rtype == RecordType::AbortRequest {
            events.on_abort_request();
            self.state = ParserState::Padding;
        } else if self.remaining == 0 {
            // A zero-length stream record is the end-of-stream marker.
            if rtype.is_stream() {
                self.emit_stream_end(rtype, events);
            }
            self.state = ParserState::Padding;
        } else {
            self.state = ParserState::Record(rtype);
        }
        used
    }

    fn parse_body<E: Events>(&mut self, rtype: RecordType, data: &[u8], events: &mut E) -> usize {
        match rtype {
            RecordType::BeginRequest => self.parse_begin_request(data, events),
            RecordType::EndRequest => self.parse_end_request(data, events),
            // Abort-request bodies are empty and resolved at the header.
            RecordType::AbortRequest => {
                self.state = ParserState::Padding;
                0
            }
            RecordType::Params => self.forward(data, events, Events::on_headers),
            RecordType::Stdin => self.forward(data, events, Events::on_stdin),
            RecordType::Stdout => self.forward(data, events, Events::on_stdout),
            RecordType::Stderr => self.forward(data, events, Events::on_stderr),
            RecordType::Data => self.forward(data, events, Events::on_data),
            RecordType::GetValues => self.forward_pairs(data, events, false),
            RecordType::GetValuesResult => self.forward_pairs(data, events, true),
        }
    }

    fn parse_begin_request<E: Events>(&mut self, data: &[u8], events: &mut E) -> usize {
        let used = self.stage(data);
        self.remaining -= used;
        if self.staged == HEADER_LEN {
            let role = u16::from_be_bytes([self.staging[0], self.staging[1]]);
            let flags = self.staging[2];
            self.staged = 0;
            events.on_begin_request(Role::from_u16(role), flags);
            self.state = ParserState::Padding;
        }
        used
    }

    fn parse_end_request<E: Events>(&mut self, data: &[u8], events: &mut E) -> usize {
        let used = self.stage(data);
        self.remaining -= used;
        if self.staged == HEADER_LEN {
            let app_status = u32::from_be_bytes([
                self.staging[0],
                self.staging[1],
                self.staging[2],
                self.staging[3],
            ]);
            let protocol_status = ProtocolStatus::from_u8(self.staging[4]);
            self.staged = 0;
            events.on_end_request(app_status, protocol_status);
            self.state = ParserState::Padding;
        }
        used
    }

    /// Forwards stream content as a sub-slice of the caller's input.
    fn forward<E: Events>(
        &mut self,
        data: &[u8],
        events: &mut E,
        accept: fn(&mut E, &[u8]),
    ) -> usize {
        let take = self.remaining.min(data.len());
        if take > 0 {
            accept(events, &data[..take]);
            self.remaining -= take;
        }
        if self.remaining == 0 {
            self.state = ParserState::Padding;
        }
        take
    }

    /// Runs management payload bytes through the embedded pair decoder.
    fn forward_pairs<E: Events>(&mut self, data: &[u8], events: &mut E, reply: bool) -> usize {
        let take = self.remaining.min(data.len());
        if take > 0 {
            let mut route = ManagementEvents { events, reply };
            self.pairs.feed(&data[..take], &mut route);
            self.remaining -= take;
        }
        if self.remaining == 0 {
            self.state = ParserState::Padding;
        }
        take
    }

    fn skip_padding<E: Events>(&mut self, data: &[u8], events: &mut E) -> usize {
        let take = self.padding.min(data.len());
        self.padding -= take;
        if self.padding == 0 {
            events.on_record_end();
            self.state = ParserState::Idle;
        }
        take
    }

    fn emit_stream_end<E: Events>(&mut self, rtype: RecordType, events: &mut E) {
        match rtype {
            RecordType::Params => events.on_headers_end(),
            RecordType::Stdin => events.on_stdin_end(),
            RecordType::Stdout => events.on_stdout_end(),
            RecordType::Stderr => events.on_stderr_end(),
            RecordType::Data => events.on_data_end(),
            _ => {}
        }
    }

    fn fail(&mut self, error: ParseError) {
        debug!(%error, "parser failed");
        self.error = Some(error);
        self.state = ParserState::Failed;
    }
}

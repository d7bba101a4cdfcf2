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

//! Application-side session for a FastCGI connection.
//!
//! The session owns the inbound parser and a table of in-progress
//! requests keyed by request id. Parser events are routed to the request
//! selected by the current record; notifications reach user code through
//! an [`ApplicationHandler`]. Hooks receive a [`Responder`] bound to the
//! selected request, through which stdout, stderr and the end-request
//! record are framed; the resulting bytes are forwarded to
//! [`ApplicationHandler::send`] when the hook returns.

use crate::{
    error::ParseError,
    framer::{Framer, unfailing},
    meta::{ProtocolStatus, Role, Settings},
    pairs,
    parser::{Events, Parser, ParserState},
    request::Request,
};
use bytes::BytesMut;
use std::collections::HashMap;
use tracing::debug;

/// Notifications surfaced to user code by an [`Application`] session.
pub trait ApplicationHandler {
    /// Outbound bytes ready for the transport.
    fn send(&mut self, data: &[u8]);

    /// A management get-values pair arrived.
    fn query(&mut self, name: &[u8], value: &[u8], management: &mut Management<'_>) {
        let _ = (name, value, management);
    }

    /// All params of the request were received.
    fn headers_complete(&mut self, request: &mut Request, responder: &mut Responder<'_>) {
        let _ = (request, responder);
    }

    /// Body bytes were appended to the request.
    fn body_chunk(&mut self, request: &mut Request, responder: &mut Responder<'_>) {
        let _ = (request, responder);
    }

    /// The stdin stream of the request reached end of file.
    fn body_complete(&mut self, request: &mut Request, responder: &mut Responder<'_>) {
        let _ = (request, responder);
    }

    /// The gateway aborted the request; user code decides whether to end
    /// it early.
    fn abort(&mut self, request: &mut Request, responder: &mut Responder<'_>) {
        let _ = (request, responder);
    }
}

/// Outbound handle bound to the request a hook was invoked for.
pub struct Responder<'a> {
    request_id: u16,
    framer: &'a Framer,
    out: &'a mut BytesMut,
    finished: &'a mut bool,
}

impl Responder<'_> {
    /// The id of the request this handle responds to.
    pub fn request_id(&self) -> u16 {
        self.request_id
    }

    /// Sends a management reply pair (get-values-result).
    pub fn reply(&mut self, name: &[u8], value: &[u8]) {
        frame_reply(self.framer, self.out, name, value);
    }

    /// Sends stdout bytes; empty slices are ignored, the empty record is
    /// the close form.
    pub fn write_stdout(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        unfailing(self.framer.stdout(self.out, self.request_id, data));
    }

    /// Closes the stdout stream with an empty record.
    pub fn close_stdout(&mut self) {
        unfailing(self.framer.stdout(self.out, self.request_id, &[]));
    }

    /// Sends stderr bytes; empty slices are ignored.
    pub fn write_stderr(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        unfailing(self.framer.stderr(self.out, self.request_id, data));
    }

    /// Closes the stderr stream with an empty record.
    pub fn close_stderr(&mut self) {
        unfailing(self.framer.stderr(self.out, self.request_id, &[]));
    }

    /// Ends the request; the session clears the request state and unbinds
    /// the selection once the hook returns.
    pub fn end_request(&mut self, app_status: u32, protocol_status: ProtocolStatus) {
        unfailing(
            self.framer
                .end_request(self.out, self.request_id, app_status, protocol_status),
        );
        *self.finished = true;
    }
}

/// Outbound handle for replying to management queries.
pub struct Management<'a> {
    framer: &'a Framer,
    out: &'a mut BytesMut,
}

impl Management<'_> {
    /// Sends a management reply pair (get-values-result).
    pub fn reply(&mut self, name: &[u8], value: &[u8]) {
        frame_reply(self.framer, self.out, name, value);
    }
}

fn frame_reply(framer: &Framer, out: &mut BytesMut, name: &[u8], value: &[u8]) {
    let mut payload = BytesMut::new();
    pairs::encode_pair(&mut payload, name, value);
    unfailing(framer.reply(out, &payload));
}

/// Session state behind the parser; implements the parser's event
/// interface so `feed` can borrow the parser and the state disjointly.
struct Core<H> {
    framer: Framer,
    requests: HashMap<u16, Request>,
    selection: Option<u16>,
    handler: H,
    /// Scratch the framer writes into; drained to the handler.
    out: BytesMut,
    /// Staging for the name of the management pair being decoded.
    query_name: BytesMut,
    /// Staging for the value of the management pair being decoded.
    query_value: BytesMut,
}

impl<H: ApplicationHandler> Core<H> {
    fn selected(&mut self) -> Option<&mut Request> {
        self.selection.and_then(|id| self.requests.get_mut(&id))
    }

    /// Invokes a request-directed hook with a responder bound to the
    /// selected request, then forwards any framed bytes to the handler.
    fn dispatch(&mut self, hook: fn(&mut H, &mut Request, &mut Responder<'_>)) {
        let Some(id) = self.selection else {
            return;
        };
        let Some(request) = self.requests.get_mut(&id) else {
            return;
        };
        let mut finished = false;
        let mut responder = Responder {
            request_id: id,
            framer: &self.framer,
            out: &mut self.out,
            finished: &mut finished,
        };
        hook(&mut self.handler, request, &mut responder);
        if finished {
            request.clear();
            self.selection = None;
        }
        self.flush();
    }

    /// Hands accumulated outbound bytes to the handler.
    fn flush(&mut self) {
        if !self.out.is_empty() {
            let out = self.out.split();
            self.handler.send(&out);
        }
    }

    fn reply(&mut self, name: &[u8], value: &[u8]) {
        frame_reply(&self.framer, &mut self.out, name, value);
    }

    fn write_stdout(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if let Some(id) = self.selection {
            unfailing(self.framer.stdout(&mut self.out, id, data));
        }
    }

    fn close_stdout(&mut self) {
        if let Some(id) = self.selection {
            unfailing(self.framer.stdout(&mut self.out, id, &[]));
        }
    }

    fn write_stderr(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if let Some(id) = self.selection {
            unfailing(self.framer.stderr(&mut self.out, id, data));
        }
    }

    fn close_stderr(&mut self) {
        if let Some(id) = self.selection {
            unfailing(self.framer.stderr(&mut self.out, id, &[]));
        }
    }

    fn end_request(&mut self, app_status: u32, protocol_status: ProtocolStatus) {
        let Some(id) = self.selection else {
            return;
        };
        unfailing(
            self.framer
                .end_request(&mut self.out, id, app_status, protocol_status),
        );
        if let Some(request) = self.requests.get_mut(&id) {
            request.clear();
        }
        self.selection = None;
    }
}

impl<H: ApplicationHandler> Events for Core<H> {
    fn on_record(&mut self, _version: u8, request_id: u16, _content_length: u16) {
        // Management records are not bound to a request.
        if request_id == 0 {
            self.selection = None;
            return;
        }
        if !self.requests.contains_key(&request_id) {
            debug!(request_id, "new request");
            self.requests.insert(request_id, Request::new(request_id));
        }
        self.selection = Some(request_id);
    }

    fn on_record_end(&mut self) {
        self.selection = None;
    }

    fn on_begin_request(&mut self, role: Role, flags: u8) {
        debug!(?role, flags, "begin request");
        if let Some(request) = self.selected() {
            request.set_role(role);
        }
    }

    fn on_abort_request(&mut self) {
        self.dispatch(H::abort);
    }

    fn on_headers(&mut self, data: &[u8]) {
        if let Some(request) = self.selected() {
            request.headers_mut().feed(data);
        }
    }

    fn on_headers_end(&mut self) {
        if let Some(request) = self.selected() {
            request.set_prepared();
        }
        self.dispatch(H::headers_complete);
    }

    fn on_stdin(&mut self, data: &[u8]) {
        if let Some(request) = self.selected() {
            request.body_mut().extend_from_slice(data);
        }
        self.dispatch(H::body_chunk);
    }

    fn on_stdin_end(&mut self) {
        if let Some(request) = self.selected() {
            request.set_complete();
        }
        self.dispatch(H::body_complete);
    }

    fn on_query_name(&mut self, data: &[u8]) {
        self.query_name.extend_from_slice(data);
    }

    fn on_query_value(&mut self, data: &[u8]) {
        self.query_value.extend_from_slice(data);
    }

    fn on_query_end(&mut self) {
        let mut management = Management {
            framer: &self.framer,
            out: &mut self.out,
        };
        self.handler
            .query(&self.query_name, &self.query_value, &mut management);
        self.query_name.clear();
        self.query_value.clear();
        self.flush();
    }
}

/// Stateful aggregator turning inbound records into request lifecycles,
/// from the application's point of view.
pub struct Application<H> {
    parser: Parser,
    core: Core<H>,
}

impl<H: ApplicationHandler> Application<H> {
    /// Creates a session with default settings.
    pub fn new(handler: H) -> Self {
        Self::with_settings(Settings::default(), handler)
    }

    /// Creates a session with the given settings.
    pub fn with_settings(settings: Settings, handler: H) -> Self {
        Self {
            parser: Parser::new(settings),
            core: Core {
                framer: Framer::new(settings),
                requests: HashMap::new(),
                selection: None,
                handler,
                out: BytesMut::new(),
                query_name: BytesMut::new(),
                query_value: BytesMut::new(),
            },
        }
    }

    /// Feeds inbound transport bytes to the session.
    ///
    /// Returns the number of bytes consumed; see [`Parser::feed`] for the
    /// failure semantics.
    pub fn feed(&mut self, data: &[u8]) -> usize {
        self.parser.feed(data, &mut self.core)
    }

    /// Current state of the embedded parser.
    pub fn state(&self) -> ParserState {
        self.parser.state()
    }

    /// The latched parse error, if the embedded parser has failed.
    pub fn error(&self) -> Option<ParseError> {
        self.parser.error()
    }

    /// Resets the embedded parser; request state is kept.
    pub fn reset(&mut self) {
        self.parser.reset();
    }

    /// Looks up a request by id.
    pub fn request(&self, id: u16) -> Option<&Request> {
        self.core.requests.get(&id)
    }

    /// Re-binds the selection to a known request id so the
    /// selection-directed operations below can be used outside hooks.
    pub fn select(&mut self, id: u16) -> bool {
        if self.core.requests.contains_key(&id) {
            self.core.selection = Some(id);
            true
        } else {
            false
        }
    }

    /// Sends a management reply pair (get-values-result).
    pub fn reply(&mut self, name: &[u8], value: &[u8]) {
        self.core.reply(name, value);
        self.core.flush();
    }

    /// Sends stdout bytes to the selected request.
    pub fn write_stdout(&mut self, data: &[u8]) {
        self.core.write_stdout(data);
        self.core.flush();
    }

    /// Closes the stdout stream of the selected request.
    pub fn close_stdout(&mut self) {
        self.core.close_stdout();
        self.core.flush();
    }

    /// Sends stderr bytes to the selected request.
    pub fn write_stderr(&mut self, data: &[u8]) {
        self.core.write_stderr(data);
        self.core.flush();
    }

    /// Closes the stderr stream of the selected request.
    pub fn close_stderr(&mut self) {
        self.core.close_stderr();
        self.core.flush();
    }

    /// Ends the selected request, clears its buffers and unbinds the
    /// selection.
    pub fn end_request(&mut self, app_status: u32, protocol_status: ProtocolStatus) {
        self.core.end_request(app_status, protocol_status);
        self.core.flush();
    }

    /// The handler the session notifies.
    pub fn handler(&self) -> &H {
        &self.core.handler
    }

    /// Mutable access to the handler.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.core.handler
    }

    /// Consumes the session, returning the handler.
    pub fn into_handler(self) -> H {
        self.core.handler
    }
}

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

//! Gateway-side session for a FastCGI connection.
//!
//! Symmetric to the application session: the gateway opens requests and
//! streams params, stdin and data to the application, and aggregates the
//! stdout, stderr and end-request records coming back into [`Response`]
//! state, keyed by request id. Hooks on the [`GatewayHandler`] are
//! notifications; outbound traffic is driven through the session's
//! id-directed operations.

use crate::{
    error::ParseError,
    framer::{Framer, unfailing},
    meta::{ProtocolStatus, Role, Settings},
    pairs,
    parser::{Events, Parser, ParserState},
    response::Response,
};
use bytes::BytesMut;
use std::collections::HashMap;
use tracing::debug;

/// Notifications surfaced to user code by a [`Gateway`] session.
pub trait GatewayHandler {
    /// Outbound bytes ready for the transport.
    fn send(&mut self, data: &[u8]);

    /// A management get-values-result pair arrived.
    fn reply(&mut self, name: &[u8], value: &[u8]) {
        let _ = (name, value);
    }

    /// Stdout bytes were appended to the response.
    fn stdout_chunk(&mut self, response: &mut Response) {
        let _ = response;
    }

    /// The stdout stream of the response reached end of file.
    fn stdout_end(&mut self, response: &mut Response) {
        let _ = response;
    }

    /// Stderr bytes were appended to the response.
    fn stderr_chunk(&mut self, response: &mut Response) {
        let _ = response;
    }

    /// The stderr stream of the response reached end of file.
    fn stderr_end(&mut self, response: &mut Response) {
        let _ = response;
    }

    /// An end-request record arrived; the response state is cleared when
    /// this hook returns and the request id binding is released.
    fn request_complete(&mut self, response: &mut Response) {
        let _ = response;
    }
}

/// Session state behind the parser; implements the parser's event
/// interface so `feed` can borrow the parser and the state disjointly.
struct Core<H> {
    framer: Framer,
    responses: HashMap<u16, Response>,
    selection: Option<u16>,
    handler: H,
    /// Scratch the framer writes into; drained to the handler.
    out: BytesMut,
    /// Staging for the name of the management pair being decoded.
    reply_name: BytesMut,
    /// Staging for the value of the management pair being decoded.
    reply_value: BytesMut,
}

impl<H: GatewayHandler> Core<H> {
    fn selected(&mut self) -> Option<&mut Response> {
        self.selection.and_then(|id| self.responses.get_mut(&id))
    }

    fn dispatch(&mut self, hook: fn(&mut H, &mut Response)) {
        let Some(id) = self.selection else {
            return;
        };
        let Some(response) = self.responses.get_mut(&id) else {
            return;
        };
        hook(&mut self.handler, response);
    }

    /// Hands accumulated outbound bytes to the handler.
    fn flush(&mut self) {
        if !self.out.is_empty() {
            let out = self.out.split();
            self.handler.send(&out);
        }
    }
}

impl<H: GatewayHandler> Events for Core<H> {
    fn on_record(&mut self, _version: u8, request_id: u16, _content_length: u16) {
        // Management records are not bound to a request.
        if request_id == 0 {
            self.selection = None;
            return;
        }
        if !self.responses.contains_key(&request_id) {
            debug!(request_id, "new response");
            self.responses
                .insert(request_id, Response::new(request_id));
        }
        self.selection = Some(request_id);
    }

    fn on_record_end(&mut self) {
        self.selection = None;
    }

    fn on_end_request(&mut self, app_status: u32, protocol_status: ProtocolStatus) {
        debug!(app_status, ?protocol_status, "end request");
        if let Some(response) = self.selected() {
            response.set_status(app_status, protocol_status);
            response.set_complete();
        }
        self.dispatch(H::request_complete);
        // Clear contents, keep the buffers; the id binding is released.
        if let Some(response) = self.selected() {
            response.clear();
        }
    }

    fn on_stdout(&mut self, data: &[u8]) {
        if let Some(response) = self.selected() {
            response.stdout_mut().extend_from_slice(data);
        }
        self.dispatch(H::stdout_chunk);
    }

    fn on_stdout_end(&mut self) {
        self.dispatch(H::stdout_end);
    }

    fn on_stderr(&mut self, data: &[u8]) {
        if let Some(response) = self.selected() {
            response.stderr_mut().extend_from_slice(data);
        }
        self.dispatch(H::stderr_chunk);
    }

    fn on_stderr_end(&mut self) {
        self.dispatch(H::stderr_end);
    }

    fn on_reply_name(&mut self, data: &[u8]) {
        self.reply_name.extend_from_slice(data);
    }

    fn on_reply_value(&mut self, data: &[u8]) {
        self.reply_value.extend_from_slice(data);
    }

    fn on_reply_end(&mut self) {
        self.handler.reply(&self.reply_name, &self.reply_value);
        self.reply_name.clear();
        self.reply_value.clear();
    }
}

/// Stateful aggregator turning inbound records into response lifecycles,
/// from the gateway's point of view.
pub struct Gateway<H> {
    parser: Parser,
    core: Core<H>,
}

impl<H: GatewayHandler> Gateway<H> {
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
                responses: HashMap::new(),
                selection: None,
                handler,
                out: BytesMut::new(),
                reply_name: BytesMut::new(),
                reply_value: BytesMut::new(),
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

    /// Resets the embedded parser; response state is kept.
    pub fn reset(&mut self) {
        self.parser.reset();
    }

    /// Looks up a response by id.
    pub fn response(&self, id: u16) -> Option<&Response> {
        self.core.responses.get(&id)
    }

    /// Sends a management query (get-values) for a single name.
    pub fn query(&mut self, name: &[u8]) {
        let mut payload = BytesMut::new();
        pairs::encode_pair(&mut payload, name, &[]);
        unfailing(self.core.framer.query(&mut self.core.out, &payload));
        self.core.flush();
    }

    /// Opens a request: emits begin-request and registers response state.
    pub fn open_request(&mut self, id: u16, role: Role) {
        debug!(id, ?role, "open request");
        unfailing(self.core.framer.begin_request(&mut self.core.out, id, role, 0));
        self.core
            .responses
            .entry(id)
            .or_insert_with(|| Response::new(id));
        self.core.flush();
    }

    /// Aborts an open request.
    pub fn abort_request(&mut self, id: u16) {
        if !self.core.responses.contains_key(&id) {
            debug!(id, "abort for unused request id");
            return;
        }
        unfailing(self.core.framer.abort_request(&mut self.core.out, id));
        self.core.flush();
    }

    /// Sends one header pair on the params stream of an open request.
    pub fn send_header(&mut self, id: u16, name: &[u8], value: &[u8]) {
        if !self.core.responses.contains_key(&id) {
            debug!(id, "header for unused request id");
            return;
        }
        let mut payload = BytesMut::new();
        pairs::encode_pair(&mut payload, name, value);
        unfailing(self.core.framer.params(&mut self.core.out, id, &payload));
        self.core.flush();
    }

    /// Closes the params stream with an empty record.
    pub fn close_headers(&mut self, id: u16) {
        if !self.core.responses.contains_key(&id) {
            return;
        }
        unfailing(self.core.framer.params(&mut self.core.out, id, &[]));
        self.core.flush();
    }

    /// Sends body bytes on the stdin stream; empty slices are ignored,
    /// the empty record is the close form.
    pub fn send_body(&mut self, id: u16, data: &[u8]) {
        if data.is_empty() || !self.core.responses.contains_key(&id) {
            return;
        }
        unfailing(self.core.framer.stdin(&mut self.core.out, id, data));
        self.core.flush();
    }

    /// Closes the stdin stream with an empty record.
    pub fn close_body(&mut self, id: u16) {
        if !self.core.responses.contains_key(&id) {
            return;
        }
        unfailing(self.core.framer.stdin(&mut self.core.out, id, &[]));
        self.core.flush();
    }

    /// Sends filter input on the data stream; empty slices are ignored.
    pub fn send_data(&mut self, id: u16, data: &[u8]) {
        if data.is_empty() || !self.core.responses.contains_key(&id) {
            return;
        }
        unfailing(self.core.framer.data(&mut self.core.out, id, data));
        self.core.flush();
    }

    /// Closes the data stream with an empty record.
    pub fn close_data(&mut self, id: u16) {
        if !self.core.responses.contains_key(&id) {
            return;
        }
        unfailing(self.core.framer.data(&mut self.core.out, id, &[]));
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

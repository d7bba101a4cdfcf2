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

//! Per-request state aggregated by the application session.

use crate::{headers::Headers, meta::Role};
use bytes::{Bytes, BytesMut};

/// An inbound request as seen by the application side of the connection.
///
/// Header bytes are decoded incrementally into [`Headers`]; stdin bytes
/// accumulate in the body buffer. `prepared` flips when the params stream
/// ends, `complete` when the stdin stream ends.
#[derive(Debug)]
pub struct Request {
    id: u16,
    role: Role,
    headers: Headers,
    body: BytesMut,
    prepared: bool,
    complete: bool,
}

impl Request {
    pub(crate) fn new(id: u16) -> Self {
        Self {
            id,
            role: Role::Unknown,
            headers: Headers::new(),
            body: BytesMut::new(),
            prepared: false,
            complete: false,
        }
    }

    /// The request id binding this request to its records.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// The role announced by the begin-request record.
    pub fn role(&self) -> Role {
        self.role
    }

    pub(crate) fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    /// The headers received so far.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub(crate) fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// The body bytes received so far.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn body_mut(&mut self) -> &mut BytesMut {
        &mut self.body
    }

    /// Takes the accumulated body, leaving the buffer empty.
    pub fn take_body(&mut self) -> Bytes {
        self.body.split().freeze()
    }

    /// Whether all header bytes were received.
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub(crate) fn set_prepared(&mut self) {
        self.prepared = true;
    }

    /// Whether the stdin stream reached end of file.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub(crate) fn set_complete(&mut self) {
        self.complete = true;
    }

    /// Clears contents while keeping buffers for reuse.
    pub(crate) fn clear(&mut self) {
        self.role = Role::Unknown;
        self.headers.clear();
        self.body.clear();
        self.prepared = false;
        self.complete = false;
    }
}

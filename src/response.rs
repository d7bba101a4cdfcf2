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

//! Per-request state aggregated by the gateway session.

use crate::meta::ProtocolStatus;
use bytes::{Bytes, BytesMut};

/// An in-progress response as seen by the gateway side of the connection.
#[derive(Debug)]
pub struct Response {
    id: u16,
    stdout: BytesMut,
    stderr: BytesMut,
    app_status: u32,
    protocol_status: ProtocolStatus,
    complete: bool,
}

impl Response {
    pub(crate) fn new(id: u16) -> Self {
        Self {
            id,
            stdout: BytesMut::new(),
            stderr: BytesMut::new(),
            app_status: 0,
            protocol_status: ProtocolStatus::RequestComplete,
            complete: false,
        }
    }

    /// The request id binding this response to its records.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// The stdout bytes received so far.
    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    pub(crate) fn stdout_mut(&mut self) -> &mut BytesMut {
        &mut self.stdout
    }

    /// Takes the accumulated stdout, leaving the buffer empty.
    pub fn take_stdout(&mut self) -> Bytes {
        self.stdout.split().freeze()
    }

    /// The stderr bytes received so far.
    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    pub(crate) fn stderr_mut(&mut self) -> &mut BytesMut {
        &mut self.stderr
    }

    /// Takes the accumulated stderr, leaving the buffer empty.
    pub fn take_stderr(&mut self) -> Bytes {
        self.stderr.split().freeze()
    }

    /// The application status from the end-request record.
    pub fn app_status(&self) -> u32 {
        self.app_status
    }

    /// The protocol status from the end-request record.
    pub fn protocol_status(&self) -> ProtocolStatus {
        self.protocol_status
    }

    pub(crate) fn set_status(&mut self, app_status: u32, protocol_status: ProtocolStatus) {
        self.app_status = app_status;
        self.protocol_status = protocol_status;
    }

    /// Whether an end-request record arrived for this response.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub(crate) fn set_complete(&mut self) {
        self.complete = true;
    }

    /// Clears contents while keeping buffers for reuse.
    pub(crate) fn clear(&mut self) {
        self.stdout.clear();
        self.stderr.clear();
        self.app_status = 0;
        self.protocol_status = ProtocolStatus::RequestComplete;
        self.complete = false;
    }
}

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

//! Framer for outbound FastCGI traffic.
//!
//! The framer turns `(record type, request id, payload)` triples into
//! well-formed records on a [`RecordSink`]. Payloads larger than one record
//! can carry are split into consecutive records of the same type and id;
//! an empty payload emits a single zero-length record, which for stream
//! types is the close marker. The framer holds no state of its own and is
//! infallible given an infallible sink.

use crate::meta::{Header, MAX_CONTENT_LENGTH, ProtocolStatus, RecordType, Role, Settings};
use bytes::BytesMut;
use std::{convert::Infallible, io};
use tracing::debug;

/// Byte sink the framer writes records to.
///
/// `write` must accept the whole slice; retrying short writes is the
/// sink's concern. `flush` is called at most once per record.
pub trait RecordSink {
    /// Error surfaced by the sink.
    type Error;

    /// Writes the whole slice to the sink.
    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Flushes buffered bytes, if the sink buffers.
    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl RecordSink for BytesMut {
    type Error = Infallible;

    fn write(&mut self, data: &[u8]) -> Result<(), Infallible> {
        self.extend_from_slice(data);
        Ok(())
    }
}

impl RecordSink for Vec<u8> {
    type Error = Infallible;

    fn write(&mut self, data: &[u8]) -> Result<(), Infallible> {
        self.extend_from_slice(data);
        Ok(())
    }
}

/// Unwraps a result whose error type is uninhabited.
pub(crate) fn unfailing<T>(result: Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}

/// Adapter giving a [`std::io::Write`] transport record-sink semantics.
#[derive(Debug)]
pub struct IoSink<W>(pub W);

impl<W: io::Write> RecordSink for IoSink<W> {
    type Error = io::Error;

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.0.write_all(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// Writer of well-formed FastCGI records.
#[derive(Debug)]
pub struct Framer {
    settings: Settings,
}

impl Framer {
    /// Creates a new framer.
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// The settings the framer was created with.
    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Emits a begin-request record reserving `request_id`.
    ///
    /// # Arguments
    ///
    /// * `sink` - The sink to write to
    /// * `request_id` - The request ID to reserve
    /// * `role` - The role the application should play
    /// * `flags` - Begin-request flags (bit 0 = keep connection)
    pub fn begin_request<S: RecordSink>(
        &self,
        sink: &mut S,
        request_id: u16,
        role: Role,
        flags: u8,
    ) -> Result<(), S::Error> {
        let mut body = [0; 8];
        body[..2].copy_from_slice(&(role as u16).to_be_bytes());
        body[2] = flags;
        self.send(sink, RecordType::BeginRequest, request_id, &body)
    }

    /// Emits an abort-request record for `request_id`.
    pub fn abort_request<S: RecordSink>(
        &self,
        sink: &mut S,
        request_id: u16,
    ) -> Result<(), S::Error> {
        self.send(sink, RecordType::AbortRequest, request_id, &[])
    }

    /// Emits an end-request record releasing `request_id`.
    pub fn end_request<S: RecordSink>(
        &self,
        sink: &mut S,
        request_id: u16,
        app_status: u32,
        protocol_status: ProtocolStatus,
    ) -> Result<(), S::Error> {
        let mut body = [0; 8];
        body[..4].copy_from_slice(&app_status.to_be_bytes());
        body[4] = protocol_status as u8;
        self.send(sink, RecordType::EndRequest, request_id, &body)
    }

    /// Emits params record(s); an empty payload closes the stream.
    pub fn params<S: RecordSink>(
        &self,
        sink: &mut S,
        request_id: u16,
        data: &[u8],
    ) -> Result<(), S::Error> {
        self.chunked(sink, RecordType::Params, request_id, data)
    }

    /// Emits stdin record(s); an empty payload closes the stream.
    pub fn stdin<S: RecordSink>(
        &self,
        sink: &mut S,
        request_id: u16,
        data: &[u8],
    ) -> Result<(), S::Error> {
        self.chunked(sink, RecordType::Stdin, request_id, data)
    }

    /// Emits stdout record(s); an empty payload closes the stream.
    pub fn stdout<S: RecordSink>(
        &self,
        sink: &mut S,
        request_id: u16,
        data: &[u8],
    ) -> Result<(), S::Error> {
        self.chunked(sink, RecordType::Stdout, request_id, data)
    }

    /// Emits stderr record(s); an empty payload closes the stream.
    pub fn stderr<S: RecordSink>(
        &self,
        sink: &mut S,
        request_id: u16,
        data: &[u8],
    ) -> Result<(), S::Error> {
        self.chunked(sink, RecordType::Stderr, request_id, data)
    }

    /// Emits data record(s); an empty payload closes the stream.
    pub fn data<S: RecordSink>(
        &self,
        sink: &mut S,
        request_id: u16,
        data: &[u8],
    ) -> Result<(), S::Error> {
        self.chunked(sink, RecordType::Data, request_id, data)
    }

    /// Emits a get-values record; management records carry request id 0.
    pub fn query<S: RecordSink>(&self, sink: &mut S, data: &[u8]) -> Result<(), S::Error> {
        self.chunked(sink, RecordType::GetValues, 0, data)
    }

    /// Emits a get-values-result record on request id 0.
    pub fn reply<S: RecordSink>(&self, sink: &mut S, data: &[u8]) -> Result<(), S::Error> {
        self.chunked(sink, RecordType::GetValuesResult, 0, data)
    }

    /// Splits a payload across as many records as its size requires.
    fn chunked<S: RecordSink>(
        &self,
        sink: &mut S,
        rtype: RecordType,
        request_id: u16,
        data: &[u8],
    ) -> Result<(), S::Error> {
        let mut sent = 0;
        loop {
            let take = (data.len() - sent).min(MAX_CONTENT_LENGTH);
            self.send(sink, rtype, request_id, &data[sent..sent + take])?;
            sent += take;
            if sent >= data.len() {
                return Ok(());
            }
        }
    }

    /// Writes one record: header, body, zero padding, one flush.
    fn send<S: RecordSink>(
        &self,
        sink: &mut S,
        rtype: RecordType,
        request_id: u16,
        body: &[u8],
    ) -> Result<(), S::Error> {
        let header = Header::new(rtype, request_id, body.len() as u16);
        debug!(
            ?rtype,
            request_id,
            content_length = header.content_length,
            "send record"
        );
        sink.write(&header.encode())?;
        sink.write(body)?;
        if header.padding_length > 0 {
            const PADDING: [u8; 8] = [0; 8];
            sink.write(&PADDING[..header.padding_length as usize])?;
        }
        sink.flush()
    }
}

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

//! FastCGI wire-level constants and value types.
//!
//! This module contains the fixed protocol values shared by the inbound
//! parser and the outbound framer: the protocol version, record-type and
//! status codes, and the eight-byte record header layout.

use std::fmt::{self, Display};

/// FastCGI protocol version 1
pub(crate) const VERSION_1: u8 = 1;
/// Maximum length for the content of a single record
pub(crate) const MAX_CONTENT_LENGTH: usize = 0xffff;
/// Length of a FastCGI record header in bytes
pub(crate) const HEADER_LEN: usize = 8;

/// FastCGI record types as defined in the protocol specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Begin request record type
    BeginRequest = 1,
    /// Abort request record type
    AbortRequest = 2,
    /// End request record type
    EndRequest = 3,
    /// Parameters record type
    Params = 4,
    /// Stdin record type
    Stdin = 5,
    /// Stdout record type
    Stdout = 6,
    /// Stderr record type
    Stderr = 7,
    /// Data record type
    Data = 8,
    /// Get values record type
    GetValues = 9,
    /// Get values result record type
    GetValuesResult = 10,
}

impl RecordType {
    /// Converts a u8 value to RecordType.
    ///
    /// The protocol reserves codes 1 through 10; everything else, including
    /// the code 0, is rejected.
    pub(crate) fn from_u8(u: u8) -> Option<Self> {
        match u {
            1 => Some(RecordType::BeginRequest),
            2 => Some(RecordType::AbortRequest),
            3 => Some(RecordType::EndRequest),
            4 => Some(RecordType::Params),
            5 => Some(RecordType::Stdin),
            6 => Some(RecordType::Stdout),
            7 => Some(RecordType::Stderr),
            8 => Some(RecordType::Data),
            9 => Some(RecordType::GetValues),
            10 => Some(RecordType::GetValuesResult),
            _ => None,
        }
    }

    /// Stream records are terminated by a zero-length record of the same
    /// type.
    pub(crate) fn is_stream(self) -> bool {
        matches!(
            self,
            RecordType::Params
                | RecordType::Stdin
                | RecordType::Stdout
                | RecordType::Stderr
                | RecordType::Data
        )
    }
}

impl Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        Display::fmt(&(*self as u8), f)
    }
}

/// FastCGI application roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum Role {
    /// Sentinel for a role value outside the protocol's range
    #[default]
    Unknown = 0,
    /// Responder role - handles requests and returns responses
    Responder = 1,
    /// Authorizer role - performs authorization checks
    Authorizer = 2,
    /// Filter role - filters data between web server and application
    Filter = 3,
}

impl Role {
    /// Converts a u16 value to Role.
    ///
    /// # Arguments
    ///
    /// * `u` - The numeric value to convert
    pub fn from_u16(u: u16) -> Self {
        match u {
            1 => Role::Responder,
            2 => Role::Authorizer,
            3 => Role::Filter,
            _ => Role::Unknown,
        }
    }
}

/// FastCGI protocol status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProtocolStatus {
    /// Request completed successfully
    RequestComplete = 0,
    /// This app can't multiplex connections
    CantMpxConn = 1,
    /// New request rejected; too busy
    Overloaded = 2,
    /// Role value not known
    UnknownRole = 3,
}

impl ProtocolStatus {
    /// Converts a u8 value to ProtocolStatus.
    ///
    /// # Arguments
    ///
    /// * `u` - The numeric value to convert
    pub fn from_u8(u: u8) -> Self {
        match u {
            0 => ProtocolStatus::RequestComplete,
            1 => ProtocolStatus::CantMpxConn,
            2 => ProtocolStatus::Overloaded,
            _ => ProtocolStatus::UnknownRole,
        }
    }
}

/// An eight-byte FastCGI record header.
///
/// The record type is kept as the raw wire byte; the parser validates it
/// against [`RecordType`] once the header is complete.
#[derive(Debug, Clone)]
pub(crate) struct Header {
    /// FastCGI protocol version
    pub(crate) version: u8,
    /// Raw type byte of the FastCGI record
    pub(crate) rtype: u8,
    /// Request ID for this record
    pub(crate) request_id: u16,
    /// Length of the content data
    pub(crate) content_length: u16,
    /// Length of padding data
    pub(crate) padding_length: u8,
    /// Reserved byte
    pub(crate) reserved: u8,
}

impl Header {
    /// Creates a new header with padding aligning the record body to eight
    /// bytes.
    ///
    /// # Arguments
    ///
    /// * `rtype` - The type of FastCGI record
    /// * `request_id` - The request ID
    /// * `content_length` - Length of the record content
    pub(crate) fn new(rtype: RecordType, request_id: u16, content_length: u16) -> Self {
        Self {
            version: VERSION_1,
            rtype: rtype as u8,
            request_id,
            content_length,
            padding_length: (content_length.wrapping_neg() & 7) as u8,
            reserved: 0,
        }
    }

    /// Creates a new header from a buffer.
    ///
    /// # Arguments
    ///
    /// * `buf` - The buffer containing header data
    #[inline]
    pub(crate) fn parse(buf: &[u8; HEADER_LEN]) -> Self {
        Self {
            version: buf[0],
            rtype: buf[1],
            request_id: u16::from_be_bytes([buf[2], buf[3]]),
            content_length: u16::from_be_bytes([buf[4], buf[5]]),
            padding_length: buf[6],
            reserved: buf[7],
        }
    }

    /// Converts the header to its wire representation.
    #[inline]
    pub(crate) fn encode(&self) -> [u8; HEADER_LEN] {
        let request_id = self.request_id.to_be_bytes();
        let content_length = self.content_length.to_be_bytes();
        [
            self.version,
            self.rtype,
            request_id[0],
            request_id[1],
            content_length[0],
            content_length[1],
            self.padding_length,
            self.reserved,
        ]
    }
}

/// Customizable limits for the codec.
///
/// No tunable options are defined at present; the structure is reserved for
/// future limits such as per-stream maximum sizes.
#[derive(Debug, Clone, Copy, Default)]
#[non_exhaustive]
pub struct Settings {}

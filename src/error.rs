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

//! Error types reported by the inbound parser.
//!
//! Parse errors are latched in the parser state rather than returned from
//! `feed`; once latched, `feed` consumes nothing until the parser is reset.

/// A protocol violation detected while parsing a record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The record type byte is outside the protocol's range of 1..=10.
    /// The reserved code 0 is rejected through this kind as well.
    #[error("unknown record type `{code}`")]
    UnknownRecordType {
        /// The raw type byte received
        code: u8,
    },

    /// A fixed-length record body (begin-request, end-request or
    /// abort-request) declared a content length other than its mandated
    /// size.
    #[error("record type `{code}` declared invalid content length `{content_length}`")]
    FixedLengthMismatch {
        /// The raw type byte received
        code: u8,
        /// The declared content length
        content_length: u16,
    },
}

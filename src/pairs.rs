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

//! Codec for the FastCGI name-value pair encoding.
//!
//! Params, get-values and get-values-result payloads carry a sequence of
//! pairs, each prefixed with a name size and a value size. A size occupies
//! one byte when its value fits in 0..=127; otherwise it occupies four
//! big-endian bytes with the high bit of the first byte set. The parser
//! here is incremental: a pair may span any number of feed calls and any
//! number of record payloads.

use bytes::{BufMut, BytesMut};

/// Consumer interface for the incremental pair parser.
///
/// All methods have no-op defaults; implement the ones of interest. Name
/// and value bytes arrive as borrowed sub-slices of the fed input and may
/// be delivered in several chunks per pair.
pub trait PairEvents {
    /// Both sizes of the next pair are known; useful for buffer
    /// pre-reservation.
    fn on_sizes(&mut self, name_len: usize, value_len: usize) {
        let _ = (name_len, value_len);
    }

    /// A chunk of name bytes arrived.
    fn on_name(&mut self, data: &[u8]) {
        let _ = data;
    }

    /// All name bytes of the current pair arrived.
    fn on_name_end(&mut self) {}

    /// A chunk of value bytes arrived.
    fn on_value(&mut self, data: &[u8]) {
        let _ = data;
    }

    /// All value bytes of the current pair arrived.
    fn on_value_end(&mut self) {}

    /// The current pair is complete; the parser restarts for the next one.
    fn on_pair(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairState {
    NameLength,
    ValueLength,
    Name,
    Value,
}

/// Incremental parser for a stream of name-value pairs.
#[derive(Debug)]
pub struct PairParser {
    state: PairState,
    /// Staging area for a four-byte size prefix.
    staging: [u8; 4],
    staged: usize,
    name_len: u32,
    value_len: u32,
    /// Name bytes left to forward in the current pair.
    name_left: u32,
    /// Value bytes left to forward in the current pair.
    value_left: u32,
}

impl Default for PairParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PairParser {
    /// Creates a parser positioned at the start of a pair.
    pub fn new() -> Self {
        Self {
            state: PairState::NameLength,
            staging: [0; 4],
            staged: 0,
            name_len: 0,
            value_len: 0,
            name_left: 0,
            value_left: 0,
        }
    }

    /// Resets the parser to the start of a pair.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Feeds bytes to the parser, forwarding content through `events`.
    ///
    /// Every byte of `data` is consumed; the return value equals
    /// `data.len()` and is provided for symmetry with the record parser.
    pub fn feed<E: PairEvents>(&mut self, data: &[u8], events: &mut E) -> usize {
        let mut used = 0;
        loop {
            match self.state {
                PairState::NameLength => {
                    let (n, length) = self.stage_length(&data[used..]);
                    used += n;
                    match length {
                        Some(length) => {
                            self.name_len = length;
                            self.name_left = length;
                            self.state = PairState::ValueLength;
                        }
                        None => break,
                    }
                }
                PairState::ValueLength => {
                    let (n, length) = self.stage_length(&data[used..]);
                    used += n;
                    match length {
                        Some(length) => {
                            self.value_len = length;
                            self.value_left = length;
                            events.on_sizes(self.name_len as usize, self.value_len as usize);
                            self.state = PairState::Name;
                        }
                        None => break,
                    }
                }
                PairState::Name => {
                    let take = (self.name_left as usize).min(data.len() - used);
                    if take > 0 {
                        events.on_name(&data[used..used + take]);
                        self.name_left -= take as u32;
                        used += take;
                    }
                    if self.name_left == 0 {
                        events.on_name_end();
                        self.state = PairState::Value;
                    } else {
                        break;
                    }
                }
                PairState::Value => {
                    let take = (self.value_left as usize).min(data.len() - used);
                    if take > 0 {
                        events.on_value(&data[used..used + take]);
                        self.value_left -= take as u32;
                        used += take;
                    }
                    if self.value_left == 0 {
                        events.on_value_end();
                        events.on_pair();
                        self.state = PairState::NameLength;
                    } else {
                        break;
                    }
                }
            }
        }
        used
    }

    /// Stages size-prefix bytes, returning the decoded size once complete.
    ///
    /// A first byte with the high bit clear is the whole size; otherwise
    /// three more bytes follow and the discriminator bit is masked off
    /// before the big-endian assembly.
    fn stage_length(&mut self, data: &[u8]) -> (usize, Option<u32>) {
        let mut used = 0;
        while used < data.len() {
            let byte = data[used];
            used += 1;
            if self.staged == 0 && byte < 0x80 {
                return (used, Some(u32::from(byte)));
            }
            self.staging[self.staged] = byte;
            self.staged += 1;
            if self.staged == 4 {
                let mut prefix = self.staging;
                prefix[0] &= 0x7f;
                self.staged = 0;
                return (used, Some(u32::from_be_bytes(prefix)));
            }
        }
        (used, None)
    }
}

/// Size encoding for one side of a name-value pair.
#[derive(Debug, Clone, Copy)]
pub enum PairLength {
    /// Short size (0..=127), one byte on the wire
    Short(u8),
    /// Long size, four bytes on the wire with the high bit set
    Long(u32),
}

impl PairLength {
    /// Selects the encoding for a size.
    ///
    /// # Arguments
    ///
    /// * `length` - The size to encode
    pub fn new(length: usize) -> Self {
        if length < 128 {
            PairLength::Short(length as u8)
        } else {
            PairLength::Long(length as u32 | 1 << 31)
        }
    }

    /// Appends the wire form of the size to a buffer.
    pub fn put(self, buf: &mut BytesMut) {
        match self {
            PairLength::Short(l) => buf.put_u8(l),
            PairLength::Long(l) => buf.put_u32(l),
        }
    }
}

/// Appends the wire form of one name-value pair to a buffer.
pub fn encode_pair(buf: &mut BytesMut, name: &[u8], value: &[u8]) {
    PairLength::new(name.len()).put(buf);
    PairLength::new(value.len()).put(buf);
    buf.extend_from_slice(name);
    buf.extend_from_slice(value);
}

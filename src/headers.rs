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

//! Incremental storage for request headers.
//!
//! Params payload bytes are fed straight into an embedded pair parser, so
//! a header pair may cross record and feed boundaries. Completed pairs
//! land in an insertion-ordered map; a duplicate name overwrites the
//! earlier value.

use crate::pairs::{PairEvents, PairParser};
use bytes::{Bytes, BytesMut};
use indexmap::IndexMap;

/// Accumulates decoded pairs into the mapping, reusing staging buffers.
struct Collect<'a> {
    mapping: &'a mut IndexMap<Bytes, Bytes>,
    name: &'a mut BytesMut,
    value: &'a mut BytesMut,
}

impl PairEvents for Collect<'_> {
    fn on_sizes(&mut self, name_len: usize, value_len: usize) {
        self.name.reserve(name_len);
        self.value.reserve(value_len);
    }

    fn on_name(&mut self, data: &[u8]) {
        self.name.extend_from_slice(data);
    }

    fn on_value(&mut self, data: &[u8]) {
        self.value.extend_from_slice(data);
    }

    fn on_pair(&mut self) {
        // Last value wins for duplicate names.
        self.mapping
            .insert(self.name.split().freeze(), self.value.split().freeze());
    }
}

/// Storage for the headers of one request.
#[derive(Debug, Default)]
pub struct Headers {
    mapping: IndexMap<Bytes, Bytes>,
    decoder: PairParser,
    name: BytesMut,
    value: BytesMut,
}

impl Headers {
    /// Creates an empty header table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw params payload bytes to the embedded pair decoder.
    pub fn feed(&mut self, data: &[u8]) {
        let mut collect = Collect {
            mapping: &mut self.mapping,
            name: &mut self.name,
            value: &mut self.value,
        };
        self.decoder.feed(data, &mut collect);
    }

    /// Looks up a header value by name.
    pub fn get(&self, name: &[u8]) -> Option<&[u8]> {
        self.mapping.get(name).map(|value| value.as_ref())
    }

    /// Iterates over the headers in the order they arrived.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.mapping
            .iter()
            .map(|(name, value)| (name.as_ref(), value.as_ref()))
    }

    /// Number of stored headers.
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    /// Whether no headers are stored.
    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Clears the table; capacity is retained for reuse.
    pub fn clear(&mut self) {
        self.mapping.clear();
        self.decoder.reset();
        self.name.clear();
        self.value.clear();
    }
}

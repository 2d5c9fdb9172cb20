// Copyright 2023 Strixpyrr
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

use std::cmp::min;
use std::io;

use crate::Buffer;
use crate::error::{Error, Result};
use crate::streams::{BufSink, Sink, Source};

impl Buffer {
	/// Appends a slice of bytes, spilling across segment boundaries as
	/// needed.
	pub fn write_from_slice(&mut self, bytes: &[u8]) {
		let mut rest = bytes;
		while !rest.is_empty() {
			let tail = self.writable_tail(1);
			let n = tail.push_slice(rest);
			rest = &rest[n..];
			self.grow(n);
		}
	}

	/// Fills the tail segment from a [`std::io::Read`], returning the count
	/// read or `None` at end of input. Reads at most one segment's worth.
	pub(crate) fn write_std<R: io::Read>(&mut self, reader: &mut R, byte_count: usize) -> Result<Option<usize>> {
		debug_assert!(byte_count > 0);
		let tail = self.writable_tail(1);
		let space = tail.tail_mut();
		let want = min(byte_count, space.len());
		let n = loop {
			match reader.read(&mut space[..want]) {
				Ok(n) => break n,
				Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
				Err(e) => return Err(e.into()),
			}
		};
		if n == 0 {
			return Ok(None)
		}
		tail.add(n);
		self.grow(n);
		Ok(Some(n))
	}
}

impl Sink for Buffer {
	/// Moves exactly `byte_count` bytes from the front of `source` to the
	/// back of this buffer.
	fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result {
		if byte_count > source.len() {
			return Err(Error::invalid_input("write count exceeds the buffered bytes"))
		}
		source.move_into(self, byte_count);
		Ok(())
	}
}

impl BufSink for Buffer {
	fn write_all(&mut self, source: &mut impl Source) -> Result<usize> {
		let mut total = 0;
		while let Some(n) = source.read(self, usize::MAX)? {
			if n == 0 { break }
			total += n;
		}
		Ok(total)
	}
}

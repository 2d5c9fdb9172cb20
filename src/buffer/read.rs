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
use crate::pool;
use crate::streams::{BufSource, BufStream, Sink, Source};

impl Buffer {
	/// Reads bytes into `dst`, consuming them, and returns the number read:
	/// the lesser of the slice length and the buffered count.
	pub fn read_into_slice(&mut self, dst: &mut [u8]) -> usize {
		let mut off = 0;
		while off < dst.len() {
			let Some(front) = self.segments.front_mut() else { break };
			let n = front.pop_into_slice(&mut dst[off..]);
			off += n;
			self.len -= n;
			if front.is_empty() {
				let seg = self.segments.pop_front()
					.expect("front segment exists");
				pool::recycle(seg);
			}
		}
		off
	}

	/// Drains exactly `byte_count` bytes into a [`std::io::Write`], straight
	/// from the segment data.
	pub(crate) fn read_std<W: io::Write>(&mut self, writer: &mut W, byte_count: usize) -> Result {
		if byte_count > self.len {
			return Err(Error::invalid_input("write count exceeds the buffered bytes"))
		}
		let mut remaining = byte_count;
		while remaining > 0 {
			let front = self.segments.front_mut()
				.expect("buffer length covers the drain");
			let n = min(front.len(), remaining);
			if n > 0 {
				let written = loop {
					match writer.write(&front.data()[..n]) {
						Ok(0) => return Err(Error::io(io::ErrorKind::WriteZero.into())),
						Ok(w) => break w,
						Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
						Err(e) => return Err(e.into()),
					}
				};
				front.consume(written);
				self.len -= written;
				remaining -= written;
			}
			if front.is_empty() {
				let seg = self.segments.pop_front()
					.expect("front segment exists");
				pool::recycle(seg);
			}
		}
		Ok(())
	}
}

impl Source for Buffer {
	/// Moves up to `byte_count` bytes to the back of `sink`. Returns
	/// `Ok(None)` when this buffer is empty; `Ok(Some(0))` only for a
	/// zero-byte request.
	fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>> {
		if byte_count == 0 {
			return Ok(Some(0))
		}
		if self.is_empty() {
			return Ok(None)
		}
		Ok(Some(self.move_into(sink, byte_count)))
	}
}

impl BufStream for Buffer {
	fn buf(&self) -> &Buffer { self }
	fn buf_mut(&mut self) -> &mut Buffer { self }
}

impl BufSource for Buffer {
	/// A buffer never has more bytes on the way; the request is met iff the
	/// bytes are already here.
	fn request(&mut self, byte_count: usize) -> Result<bool> {
		Ok(self.len() >= byte_count)
	}

	fn read_all(&mut self, sink: &mut impl Sink) -> Result<usize> {
		let n = self.len();
		if n > 0 {
			sink.write(self, n)?;
		}
		Ok(n)
	}
}

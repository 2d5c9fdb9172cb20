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

use std::cmp::{max, min};

use crate::{cancel, Buffer};
use crate::error::{Error, Result};
use crate::segment::SIZE;
use crate::streams::{
	BufSink, BufSource, BufStream, ReadAhead, Sink, Source, WriteBehind,
};

/// Wraps `source` in a buffered source reading on demand.
pub fn buffer_source<S: Source>(source: S) -> BufferedSource<S> {
	BufferedSource::new(source)
}

/// Wraps `sink` in a buffered sink coalescing writes into whole segments.
pub fn buffer_sink<S: Sink>(sink: S) -> BufferedSink<S> {
	BufferedSink::new(sink)
}

/// Wraps `source` in a buffered source that reads ahead of demand on a
/// background pump thread.
pub fn buffer_source_read_ahead<S>(source: S) -> BufferedSource<ReadAhead<S>>
where S: Source + Send + 'static {
	BufferedSource::new(ReadAhead::new(source))
}

/// Wraps `sink` in a buffered sink that writes behind the caller on a
/// background pump thread, with bounded buffering for backpressure.
pub fn buffer_sink_write_behind<S>(sink: S) -> BufferedSink<WriteBehind<S>>
where S: Sink + Send + 'static {
	BufferedSink::new(WriteBehind::new(sink))
}

/// A [`Source`] adapter that buffers reads from an underlying source,
/// pulling at segment granularity and exposing the full [`BufSource`]
/// surface over the buffered bytes.
pub struct BufferedSource<S: Source> {
	buffer: Buffer,
	source: S,
	closed: bool,
}

impl<S: Source> BufferedSource<S> {
	pub fn new(source: S) -> Self {
		Self {
			buffer: Buffer::new(),
			source,
			closed: false,
		}
	}

	/// Returns a source observing, without consuming, the bytes from the
	/// current position onward. Reads through the view pull from the
	/// underlying source as needed but never advance this source; the
	/// exclusive borrow keeps the two from interleaving.
	pub fn peek(&mut self) -> BufferedSource<Peek<'_, S>> {
		BufferedSource::new(Peek { origin: self, offset: 0 })
	}
}

impl<S: Source> Source for BufferedSource<S> {
	fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>> {
		if self.closed { return Err(Error::closed()) }
		if byte_count == 0 { return Ok(Some(0)) }

		if self.buffer.is_empty() {
			cancel::check()?;
			if self.source.read(&mut self.buffer, max(byte_count, SIZE))?.is_none() {
				return Ok(None)
			}
		}
		self.buffer.read(sink, byte_count)
	}

	fn close_source(&mut self) -> Result {
		if self.closed { return Ok(()) }
		self.closed = true;
		self.buffer.clear();
		self.source.close_source()
	}
}

impl<S: Source> BufStream for BufferedSource<S> {
	fn buf(&self) -> &Buffer { &self.buffer }
	fn buf_mut(&mut self) -> &mut Buffer { &mut self.buffer }
}

impl<S: Source> BufSource for BufferedSource<S> {
	/// Pulls from the underlying source, a segment's worth at a time, until
	/// `byte_count` bytes are buffered or the source is exhausted.
	fn request(&mut self, byte_count: usize) -> Result<bool> {
		if self.closed { return Err(Error::closed()) }
		while self.buffer.len() < byte_count {
			cancel::check()?;
			let want = max(byte_count - self.buffer.len(), SIZE);
			if self.source.read(&mut self.buffer, want)?.is_none() {
				return Ok(false)
			}
		}
		Ok(true)
	}
}

impl<S: Source> Drop for BufferedSource<S> {
	fn drop(&mut self) {
		let _ = self.close_source();
	}
}

/// The source behind [`BufferedSource::peek`]: copies bytes out of the
/// origin's buffer at a running offset, asking the origin to pull more when
/// the offset catches up.
pub struct Peek<'a, S: Source> {
	origin: &'a mut BufferedSource<S>,
	offset: usize,
}

impl<S: Source> Source for Peek<'_, S> {
	fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>> {
		if byte_count == 0 { return Ok(Some(0)) }

		self.origin.request(self.offset.saturating_add(byte_count))?;
		let available = self.origin.buf().len().saturating_sub(self.offset);
		if available == 0 { return Ok(None) }

		let n = min(available, byte_count);
		self.origin.buf().copy_to(sink, self.offset, n)?;
		self.offset += n;
		Ok(Some(n))
	}
}

/// A [`Sink`] adapter that buffers writes to an underlying sink, handing
/// off whole segments as they fill and exposing the full [`BufSink`]
/// surface.
pub struct BufferedSink<S: Sink> {
	buffer: Buffer,
	sink: S,
	closed: bool,
}

impl<S: Sink> BufferedSink<S> {
	pub fn new(sink: S) -> Self {
		Self {
			buffer: Buffer::new(),
			sink,
			closed: false,
		}
	}
}

impl<S: Sink> Sink for BufferedSink<S> {
	fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result {
		self.check_open()?;
		self.buffer.write(source, byte_count)?;
		self.emit_complete_segments()
	}

	fn flush(&mut self) -> Result {
		self.emit()?;
		cancel::check()?;
		self.sink.flush()
	}

	fn close_sink(&mut self) -> Result {
		if self.closed { return Ok(()) }
		self.closed = true;
		// Both get a chance to run before an error returns; the first error
		// wins, the buffer is released either way.
		let emitted = if self.buffer.is_empty() {
			Ok(())
		} else {
			let n = self.buffer.len();
			self.sink.write(&mut self.buffer, n)
		};
		let closed = self.sink.close_sink();
		self.buffer.clear();
		emitted?;
		closed
	}
}

impl<S: Sink> BufStream for BufferedSink<S> {
	fn buf(&self) -> &Buffer { &self.buffer }
	fn buf_mut(&mut self) -> &mut Buffer { &mut self.buffer }
}

impl<S: Sink> BufSink for BufferedSink<S> {
	fn check_open(&self) -> Result {
		if self.closed {
			Err(Error::closed())
		} else {
			Ok(())
		}
	}

	fn emit_complete_segments(&mut self) -> Result {
		self.check_open()?;
		let n = self.buffer.complete_segment_bytes();
		if n > 0 {
			cancel::check()?;
			self.sink.write(&mut self.buffer, n)?;
		}
		Ok(())
	}

	fn emit(&mut self) -> Result {
		self.check_open()?;
		let n = self.buffer.len();
		if n > 0 {
			cancel::check()?;
			self.sink.write(&mut self.buffer, n)?;
		}
		Ok(())
	}
}

impl<S: Sink> Drop for BufferedSink<S> {
	fn drop(&mut self) {
		if let Err(error) = self.close_sink() {
			log::debug!("buffered sink dropped with close error: {error}");
		}
	}
}

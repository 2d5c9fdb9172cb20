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

//! Bridges between this crate's streams and [`std::io`]: wrap any
//! [`Read`]/[`Write`] as a [`Source`]/[`Sink`], or carry a [`Source`]/
//! [`Sink`] into an API wanting the std traits.

use std::io::{self, Read, Write};

use crate::Buffer;
use crate::error::{Error, Result};
use crate::streams::{Sink, Source};

/// Adapts a [`Read`] into a [`Source`].
pub fn read_source<R: Read>(reader: R) -> ReadSource<R> {
	ReadSource(reader)
}

/// Adapts a [`Write`] into a [`Sink`].
pub fn write_sink<W: Write>(writer: W) -> WriteSink<W> {
	WriteSink(writer)
}

/// A [`Source`] reading from a [`std::io::Read`].
pub struct ReadSource<R: Read>(R);

impl<R: Read> Source for ReadSource<R> {
	fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>> {
		if byte_count == 0 {
			return Ok(Some(0))
		}
		sink.write_std(&mut self.0, byte_count)
	}
}

/// A [`Sink`] writing to a [`std::io::Write`].
pub struct WriteSink<W: Write>(W);

impl<W: Write> Sink for WriteSink<W> {
	fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result {
		source.read_std(&mut self.0, byte_count)
	}

	fn flush(&mut self) -> Result {
		self.0.flush().map_err(Error::from)
	}
}

/// Carries a [`Source`] into APIs wanting [`std::io::Read`].
pub trait IntoRead: Source + Sized {
	fn into_read(self) -> SourceReader<Self> {
		SourceReader(self, Buffer::new())
	}
}

impl<S: Source> IntoRead for S { }

/// Carries a [`Sink`] into APIs wanting [`std::io::Write`].
pub trait IntoWrite: Sink + Sized {
	fn into_write(self) -> SinkWriter<Self> {
		SinkWriter(self, Buffer::new())
	}
}

impl<S: Sink> IntoWrite for S { }

/// A wrapper implementing the [`Read`] trait for [`Source`].
pub struct SourceReader<S: Source>(S, Buffer);

impl<S: Source> Read for SourceReader<S> {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		if buf.is_empty() {
			return Ok(0)
		}
		if self.1.is_empty() {
			let pulled = self.0
				.read(&mut self.1, buf.len())
				.map_err(Error::into_io)?;
			if pulled.is_none() {
				return Ok(0)
			}
		}
		Ok(self.1.read_into_slice(buf))
	}
}

/// A wrapper implementing the [`Write`] trait for [`Sink`].
pub struct SinkWriter<S: Sink>(S, Buffer);

impl<S: Sink> Write for SinkWriter<S> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.1.write_from_slice(buf);
		let n = self.1.len();
		self.0
			.write(&mut self.1, n)
			.map_err(Error::into_io)?;
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		self.0.flush().map_err(Error::into_io)
	}
}

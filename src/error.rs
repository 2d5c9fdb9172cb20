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

use std::{error, io, result};

pub type Result<T = ()> = result::Result<T, Error>;

type BoxError = Box<dyn error::Error + Send + Sync>;

/// The category of a stream [`Error`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ErrorKind {
	#[error("invalid input")]
	InvalidInput,
	#[error("stream closed")]
	Closed,
	#[error("premature end-of-stream")]
	UnexpectedEof,
	#[error("operation cancelled")]
	Cancelled,
	#[error("operation timed out")]
	TimedOut,
	#[error("IO error")]
	Io,
	#[error("invalid UTF-8")]
	InvalidUtf8,
	#[error("invalid number")]
	InvalidNumber,
}

/// The error type for stream and buffer operations.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
	kind: ErrorKind,
	#[source]
	source: Option<BoxError>,
}

impl Error {
	/// Creates an error of `kind` caused by `source`.
	pub fn new(kind: ErrorKind, source: impl Into<BoxError>) -> Self {
		Self { kind, source: Some(source.into()) }
	}

	/// Creates an error of `kind` with no cause.
	pub fn bare(kind: ErrorKind) -> Self {
		Self { kind, source: None }
	}

	/// Creates a new "invalid input" error with a static message.
	pub(crate) fn invalid_input(message: &'static str) -> Self {
		Self::new(ErrorKind::InvalidInput, message)
	}

	/// Creates a new "end-of-stream" error.
	pub fn eof() -> Self { Self::bare(ErrorKind::UnexpectedEof) }

	/// Creates a new "closed" error.
	pub fn closed() -> Self { Self::bare(ErrorKind::Closed) }

	/// Creates a new "cancelled" error.
	pub fn cancelled() -> Self { Self::bare(ErrorKind::Cancelled) }

	/// Creates a new "timed out" error.
	pub fn timed_out() -> Self { Self::bare(ErrorKind::TimedOut) }

	/// Creates a new IO error.
	pub fn io(error: io::Error) -> Self {
		Self::new(ErrorKind::Io, error)
	}

	/// Creates a new "invalid number" error with a static message.
	pub(crate) fn invalid_number(message: &'static str) -> Self {
		Self::new(ErrorKind::InvalidNumber, message)
	}

	/// Returns the error category.
	pub fn kind(&self) -> ErrorKind { self.kind }

	/// Returns `true` if the error is an end-of-stream.
	pub fn is_eof(&self) -> bool { self.kind == ErrorKind::UnexpectedEof }

	/// Returns the source downcast into an IO error, if possible.
	pub fn io_source(&self) -> Option<&io::Error> {
		self.source.as_deref()?.downcast_ref()
	}

	pub(crate) fn into_io(self) -> io::Error {
		match self.kind {
			ErrorKind::UnexpectedEof =>
				io::Error::new(io::ErrorKind::UnexpectedEof, self),
			ErrorKind::TimedOut =>
				io::Error::new(io::ErrorKind::TimedOut, self),
			ErrorKind::Io => {
				let Some(src) = self.io_source() else {
					return io::Error::other(self)
				};
				io::Error::new(src.kind(), self)
			}
			_ => io::Error::other(self)
		}
	}
}

impl From<io::Error> for Error {
	fn from(value: io::Error) -> Self {
		if let io::ErrorKind::UnexpectedEof = value.kind() {
			Self::eof()
		} else {
			Self::io(value)
		}
	}
}

impl From<simdutf8::compat::Utf8Error> for Error {
	fn from(value: simdutf8::compat::Utf8Error) -> Self {
		Self::new(ErrorKind::InvalidUtf8, value)
	}
}

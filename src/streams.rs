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

//! The minimal byte-stream contracts ([`Source`], [`Sink`]) and the buffered
//! operation surface ([`BufSource`], [`BufSink`]) layered over them.
//!
//! The buffered traits carry their operations as provided methods written
//! against [`request`](BufSource::request) and the backing [`Buffer`], so a
//! raw [`Buffer`] and a [`BufferedSource`](crate::BufferedSource) pulling
//! from a live stream share one demand-driven implementation: the former's
//! `request` is a length check, the latter's reads from the underlying
//! source until the request is met.

mod read_ahead;
mod void;
mod write_behind;

pub use read_ahead::*;
pub use void::*;
pub use write_behind::*;

use std::cmp::{max, min};
use std::ops::{Bound, RangeBounds};

use arrayvec::ArrayVec;
use simdutf8::compat::from_utf8;

use crate::{Buffer, ByteString};
use crate::buffered_wrappers::{BufferedSink, BufferedSource};
use crate::error::{Error, Result};
use crate::segment::SIZE;

/// A source of bytes: "read up to `byte_count` bytes into a buffer".
pub trait Source {
	/// Reads up to `byte_count` bytes into `sink`, returning the number read.
	/// Returns `Ok(None)` iff no more bytes will ever come, and `Ok(Some(0))`
	/// only for a zero-byte request.
	fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>>;

	/// Closes the source. Closing is idempotent; a second call has no effect.
	/// Default streams also close when dropped.
	fn close_source(&mut self) -> Result { Ok(()) }
}

/// A sink of bytes: "write `byte_count` bytes from a buffer".
pub trait Sink {
	/// Consumes exactly `byte_count` bytes from `source`, failing when fewer
	/// are buffered or the underlying transport fails.
	fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result;

	/// Pushes any pending bytes through to their final target.
	fn flush(&mut self) -> Result { Ok(()) }

	/// Flushes and closes the sink. Closing is idempotent; a second call has
	/// no effect. Default streams also close when dropped.
	fn close_sink(&mut self) -> Result { self.flush() }
}

/// A stream backed by a [`Buffer`].
pub trait BufStream {
	fn buf(&self) -> &Buffer;
	fn buf_mut(&mut self) -> &mut Buffer;
}

macro_rules! gen_int_reads {
	($($be:ident $le:ident -> $ty:ident,)+) => {
		$(
		#[doc = concat!("Reads one big-endian [`", stringify!($ty), "`] from the source.")]
		fn $be(&mut self) -> Result<$ty> {
			Ok(<$ty>::from_be_bytes(self.read_array()?))
		}

		#[doc = concat!("Reads one little-endian [`", stringify!($ty), "`] from the source.")]
		fn $le(&mut self) -> Result<$ty> {
			Ok(<$ty>::from_le_bytes(self.read_array()?))
		}
		)+
	}
}

/// Typed, demand-driven reads over a buffered stream. Operations that need
/// more bytes than are buffered pull from the underlying source through
/// [`request`](Self::request); on a raw [`Buffer`] they simply stop at the
/// buffered count.
pub trait BufSource: BufStream + Source {
	/// Reads until at least `byte_count` bytes are buffered, returning
	/// whether the requested count is available. To fail with an
	/// end-of-stream error instead, use [`require`](Self::require).
	fn request(&mut self, byte_count: usize) -> Result<bool>;

	/// Reads until at least `byte_count` bytes are buffered, failing with an
	/// end-of-stream error when the source runs out first.
	fn require(&mut self, byte_count: usize) -> Result {
		if self.request(byte_count)? {
			Ok(())
		} else {
			Err(Error::eof())
		}
	}

	/// Returns `true` if the source has no more bytes to offer.
	fn is_exhausted(&mut self) -> Result<bool> {
		Ok(!self.request(1)?)
	}

	/// Removes `byte_count` bytes, pulling and discarding as needed. Fails
	/// with an end-of-stream error when fewer are available.
	fn skip(&mut self, byte_count: usize) -> Result {
		let mut remaining = byte_count;
		while remaining > 0 {
			if self.buf().is_empty() && !self.request(min(remaining, SIZE))? {
				return Err(Error::eof())
			}
			let n = min(remaining, self.buf().len());
			self.buf_mut().skip(n)?;
			remaining -= n;
		}
		Ok(())
	}

	/// Reads bytes into `dst`, returning the number read: the slice length,
	/// unless the source runs out first.
	fn read_into_slice(&mut self, dst: &mut [u8]) -> Result<usize> {
		let mut off = 0;
		while off < dst.len() {
			if self.buf().is_empty() && !self.request(dst.len() - off)? {
				break
			}
			off += self.buf_mut().read_into_slice(&mut dst[off..]);
		}
		Ok(off)
	}

	/// Fills `dst` exactly, failing with an end-of-stream error when the
	/// source cannot. No bytes are consumed on failure.
	fn read_into_slice_exact(&mut self, dst: &mut [u8]) -> Result {
		self.require(dst.len())?;
		let n = self.buf_mut().read_into_slice(dst);
		debug_assert_eq!(n, dst.len());
		Ok(())
	}

	/// Reads an exact-size array.
	fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
		let mut array = [0; N];
		self.read_into_slice_exact(&mut array)?;
		Ok(array)
	}

	/// Reads one [`u8`] from the source.
	fn read_u8(&mut self) -> Result<u8> {
		Ok(self.read_array::<1>()?[0])
	}

	/// Reads one [`i8`] from the source.
	fn read_i8(&mut self) -> Result<i8> {
		self.read_u8().map(|b| b as i8)
	}

	gen_int_reads! {
		read_i16 read_i16_le -> i16,
		read_u16 read_u16_le -> u16,
		read_i32 read_i32_le -> i32,
		read_u32 read_u32_le -> u32,
		read_i64 read_i64_le -> i64,
		read_u64 read_u64_le -> u64,
		read_isize read_isize_le -> isize,
		read_usize read_usize_le -> usize,
	}

	/// Reads a signed decimal number, consuming an optional leading `-` and
	/// digits up to the first non-digit. Fails with an "invalid number" error
	/// when no digit is present or the value overflows an [`i64`].
	fn read_decimal(&mut self) -> Result<i64> {
		self.require(1)?;
		let negative = self.buf().get(0) == Some(b'-');
		let mut pos = usize::from(negative);
		// Accumulate negated so i64::MIN parses without overflow.
		let mut value = 0i64;
		let mut digits = 0;
		loop {
			if !self.request(pos + 1)? { break }
			let b = self.buf().get(pos).expect("requested byte is buffered");
			if !b.is_ascii_digit() { break }
			value = value
				.checked_mul(10)
				.and_then(|v| v.checked_sub(i64::from(b - b'0')))
				.ok_or_else(|| Error::invalid_number("decimal overflows an i64"))?;
			digits += 1;
			pos += 1;
		}
		if digits == 0 {
			return Err(Error::invalid_number("expected a decimal digit"))
		}
		self.buf_mut().skip(pos)?;
		if negative {
			Ok(value)
		} else {
			value.checked_neg()
				.ok_or_else(|| Error::invalid_number("decimal overflows an i64"))
		}
	}

	/// Reads an unsigned hexadecimal number, consuming digits up to the first
	/// non-digit. Fails with an "invalid number" error when no digit is
	/// present or the value overflows a [`u64`].
	fn read_hex(&mut self) -> Result<u64> {
		let mut pos = 0;
		let mut value = 0u64;
		loop {
			if !self.request(pos + 1)? { break }
			let digit = match self.buf().get(pos).expect("requested byte is buffered") {
				b @ b'0'..=b'9' => b - b'0',
				b @ b'a'..=b'f' => b - b'a' + 10,
				b @ b'A'..=b'F' => b - b'A' + 10,
				_ => break,
			};
			if value >> 60 != 0 {
				return Err(Error::invalid_number("hex overflows a u64"))
			}
			value = value << 4 | u64::from(digit);
			pos += 1;
		}
		if pos == 0 {
			self.require(1)?;
			return Err(Error::invalid_number("expected a hex digit"))
		}
		self.buf_mut().skip(pos)?;
		Ok(value)
	}

	/// Reads exactly `byte_count` bytes into a vector.
	fn read_bytes(&mut self, byte_count: usize) -> Result<Vec<u8>> {
		let mut vec = vec![0; byte_count];
		self.read_into_slice_exact(&mut vec)?;
		Ok(vec)
	}

	/// Reads every remaining byte into a vector.
	fn read_all_bytes(&mut self) -> Result<Vec<u8>> {
		let mut vec = Vec::new();
		loop {
			if self.buf().is_empty() && !self.request(SIZE)? { break }
			let n = self.buf().len();
			let off = vec.len();
			vec.resize(off + n, 0);
			self.buf_mut().read_into_slice(&mut vec[off..]);
		}
		Ok(vec)
	}

	/// Reads exactly `byte_count` bytes into an immutable byte string.
	fn read_byte_string(&mut self, byte_count: usize) -> Result<ByteString> {
		self.read_bytes(byte_count).map(ByteString::from)
	}

	/// Reads every remaining byte into an immutable byte string.
	fn read_all_byte_string(&mut self) -> Result<ByteString> {
		self.read_all_bytes().map(ByteString::from)
	}

	/// Reads exactly `byte_count` bytes as UTF-8. Fails with an "invalid
	/// UTF-8" error on malformed input; no replacement is performed here.
	fn read_utf8(&mut self, byte_count: usize) -> Result<String> {
		let bytes = self.read_bytes(byte_count)?;
		from_utf8(&bytes)?;
		// Just validated.
		Ok(unsafe { String::from_utf8_unchecked(bytes) })
	}

	/// Reads every remaining byte as UTF-8 into `str`, returning the byte
	/// count read.
	fn read_all_utf8(&mut self, str: &mut String) -> Result<usize> {
		let bytes = self.read_all_bytes()?;
		str.push_str(from_utf8(&bytes)?);
		Ok(bytes.len())
	}

	/// Reads UTF-8 text into `str` up to a line terminator, returning whether
	/// the terminator was found. The terminator, `\n` with an optional
	/// preceding `\r`, is consumed but not written to the string. When the
	/// source ends without one, the remaining text is still appended.
	fn read_utf8_line(&mut self, str: &mut String) -> Result<bool> {
		let Some(term) = self.find(b'\n', ..)? else {
			self.read_all_utf8(str)?;
			return Ok(false)
		};
		let (line_len, term_len) =
			if term > 0 && self.buf().get(term - 1) == Some(b'\r') {
				(term - 1, 2)
			} else {
				(term, 1)
			};
		let line = self.read_utf8(line_len)?;
		str.push_str(&line);
		self.buf_mut().skip(term_len)?;
		Ok(true)
	}

	/// Like [`read_utf8_line`](Self::read_utf8_line), but fails with an
	/// end-of-stream error unless `\n` is found within the first
	/// `limit + 1` bytes.
	fn read_utf8_line_strict(&mut self, str: &mut String, limit: usize) -> Result {
		let scan = limit.saturating_add(1);
		let Some(term) = self.find(b'\n', ..scan)? else {
			return Err(Error::eof())
		};
		let (line_len, term_len) =
			if term > 0 && self.buf().get(term - 1) == Some(b'\r') {
				(term - 1, 2)
			} else {
				(term, 1)
			};
		let line = self.read_utf8(line_len)?;
		str.push_str(&line);
		self.buf_mut().skip(term_len)?;
		Ok(())
	}

	/// Reads one UTF-8-encoded character of one to four bytes. Truncated or
	/// malformed sequences, surrogates and out-of-range values decode to
	/// `U+FFFD`: an invalid leading byte or a non-continuation byte consumes
	/// up to the offending byte, a decoded but invalid value consumes its
	/// whole sequence.
	fn read_utf8_char(&mut self) -> Result<char> {
		const REPLACEMENT: char = char::REPLACEMENT_CHARACTER;

		self.require(1)?;
		let b0 = self.buf().get(0).expect("required byte is buffered");
		let (byte_count, min_value, mut value) = match b0 {
			0x00..=0x7f => {
				self.buf_mut().skip(1)?;
				return Ok(b0 as char)
			}
			0xc0..=0xdf => (2, 0x80u32, u32::from(b0 & 0x1f)),
			0xe0..=0xef => (3, 0x800, u32::from(b0 & 0x0f)),
			0xf0..=0xf7 => (4, 0x1_0000, u32::from(b0 & 0x07)),
			_ => {
				self.buf_mut().skip(1)?;
				return Ok(REPLACEMENT)
			}
		};

		self.require(byte_count)?;
		for i in 1..byte_count {
			let b = self.buf().get(i).expect("required byte is buffered");
			if b & 0xc0 != 0x80 {
				self.buf_mut().skip(i)?;
				return Ok(REPLACEMENT)
			}
			value = value << 6 | u32::from(b & 0x3f);
		}
		self.buf_mut().skip(byte_count)?;

		if value < min_value || (0xd800..=0xdfff).contains(&value) || value > 0x10_ffff {
			return Ok(REPLACEMENT)
		}
		Ok(char::from_u32(value).unwrap_or(REPLACEMENT))
	}

	/// Returns the position of the first `byte` within `range`, pulling more
	/// data as the scan outruns the buffer. Returns `None` when the range or
	/// the source is exhausted first. At most one segment is pulled per
	/// iteration, and scanned bytes are not re-scanned.
	fn find(&mut self, byte: u8, range: impl RangeBounds<usize>) -> Result<Option<usize>> {
		let (from, to) = scan_bounds(range);
		let mut start = from;
		while start < to {
			let buffered = self.buf().len();
			if start < buffered {
				let end = min(buffered, to);
				if let Some(i) = self.buf().find(byte, start..end) {
					return Ok(Some(i))
				}
				start = end;
			} else if !self.request(start + 1)? {
				return Ok(None)
			}
		}
		Ok(None)
	}

	/// Returns the position of the first occurrence of `needle` at or after
	/// `from`, pulling more data as needed. Re-scans begin far enough back to
	/// catch matches straddling the old buffer boundary.
	fn find_slice(&mut self, needle: &[u8], from: usize) -> Result<Option<usize>> {
		if needle.is_empty() {
			return Ok(Some(from))
		}
		let mut start = from;
		loop {
			if let Some(i) = self.buf().find_slice(needle, start) {
				return Ok(Some(i))
			}
			let buffered = self.buf().len();
			start = max(from, (buffered + 1).saturating_sub(needle.len()));
			if !self.request(buffered + 1)? {
				return Ok(None)
			}
		}
	}

	/// Returns the position of the first byte contained in `set` at or after
	/// `from`, pulling more data as needed.
	fn find_any(&mut self, set: &[u8], from: usize) -> Result<Option<usize>> {
		let mut start = from;
		loop {
			let buffered = self.buf().len();
			if start < buffered {
				if let Some(i) = self.buf().find_any(set, start) {
					return Ok(Some(i))
				}
				start = buffered;
			} else if !self.request(start + 1)? {
				return Ok(None)
			}
		}
	}

	/// Returns `true` if the bytes at `offset` equal `bytes`, pulling on
	/// demand. A mismatch or an exhausted source compares unequal.
	fn range_eq(&mut self, offset: usize, bytes: &[u8]) -> Result<bool> {
		for (i, &b) in bytes.iter().enumerate() {
			let pos = offset + i;
			if !self.request(pos + 1)? || self.buf().get(pos) != Some(b) {
				return Ok(false)
			}
		}
		Ok(true)
	}

	/// Reads every remaining byte into `sink`, returning the count moved.
	fn read_all(&mut self, sink: &mut impl Sink) -> Result<usize> {
		let mut total = 0;
		loop {
			if self.buf().is_empty() && !self.request(SIZE)? { break }
			let n = self.buf().len();
			sink.write(self.buf_mut(), n)?;
			total += n;
		}
		Ok(total)
	}
}

macro_rules! gen_int_writes {
	($($be:ident $le:ident -> $ty:ident,)+) => {
		$(
		#[doc = concat!("Writes one big-endian [`", stringify!($ty), "`] to the sink.")]
		fn $be(&mut self, value: $ty) -> Result {
			self.write_from_slice(&value.to_be_bytes())
		}

		#[doc = concat!("Writes one little-endian [`", stringify!($ty), "`] to the sink.")]
		fn $le(&mut self, value: $ty) -> Result {
			self.write_from_slice(&value.to_le_bytes())
		}
		)+
	}
}

/// Typed writes over a buffered stream. Writes land in the backing buffer;
/// [`emit_complete_segments`](Self::emit_complete_segments) gives wrappers a
/// chance to hand filled segments downstream after each operation.
pub trait BufSink: BufStream + Sink {
	/// Fails when the sink can no longer accept writes.
	fn check_open(&self) -> Result { Ok(()) }

	/// Pushes all full segments to the underlying sink, keeping a partial
	/// tail buffered. Does not flush. No-op on a terminal sink.
	fn emit_complete_segments(&mut self) -> Result { Ok(()) }

	/// Pushes every buffered byte to the underlying sink. Does not flush.
	/// No-op on a terminal sink.
	fn emit(&mut self) -> Result { Ok(()) }

	/// Appends a slice of bytes.
	fn write_from_slice(&mut self, bytes: &[u8]) -> Result {
		self.check_open()?;
		self.buf_mut().write_from_slice(bytes);
		self.emit_complete_segments()
	}

	/// Writes one [`u8`] to the sink.
	fn write_u8(&mut self, value: u8) -> Result {
		self.write_from_slice(&[value])
	}

	/// Writes one [`i8`] to the sink.
	fn write_i8(&mut self, value: i8) -> Result {
		self.write_u8(value as u8)
	}

	gen_int_writes! {
		write_i16 write_i16_le -> i16,
		write_u16 write_u16_le -> u16,
		write_i32 write_i32_le -> i32,
		write_u32 write_u32_le -> u32,
		write_i64 write_i64_le -> i64,
		write_u64 write_u64_le -> u64,
		write_isize write_isize_le -> isize,
		write_usize write_usize_le -> usize,
	}

	/// Writes a signed decimal number in ASCII.
	fn write_decimal(&mut self, value: i64) -> Result {
		let mut digits = ArrayVec::<u8, 20>::new();
		let mut magnitude = value.unsigned_abs();
		loop {
			digits.push(b'0' + (magnitude % 10) as u8);
			magnitude /= 10;
			if magnitude == 0 { break }
		}
		if value < 0 {
			digits.push(b'-');
		}
		digits.reverse();
		self.write_from_slice(&digits)
	}

	/// Writes an unsigned hexadecimal number in lowercase ASCII.
	fn write_hex(&mut self, value: u64) -> Result {
		const DIGITS: &[u8; 16] = b"0123456789abcdef";
		let mut digits = ArrayVec::<u8, 16>::new();
		let mut rest = value;
		loop {
			digits.push(DIGITS[(rest & 0xf) as usize]);
			rest >>= 4;
			if rest == 0 { break }
		}
		digits.reverse();
		self.write_from_slice(&digits)
	}

	/// Writes UTF-8 text.
	fn write_utf8(&mut self, value: &str) -> Result {
		self.write_from_slice(value.as_bytes())
	}

	/// Writes one character, UTF-8 encoded.
	fn write_utf8_char(&mut self, value: char) -> Result {
		let mut buf = [0; 4];
		self.write_from_slice(value.encode_utf8(&mut buf).as_bytes())
	}

	/// Writes an immutable byte string.
	fn write_byte_string(&mut self, value: &ByteString) -> Result {
		self.write_from_slice(value)
	}

	/// Writes exactly `byte_count` bytes pulled from `source`, failing with
	/// an end-of-stream error when it runs out first.
	fn write_from(&mut self, source: &mut impl Source, byte_count: usize) -> Result {
		self.check_open()?;
		let mut remaining = byte_count;
		while remaining > 0 {
			let Some(n) = source.read(self.buf_mut(), remaining)? else {
				return Err(Error::eof())
			};
			remaining -= n;
			self.emit_complete_segments()?;
		}
		Ok(())
	}

	/// Writes every byte `source` has to offer, returning the count moved.
	fn write_all(&mut self, source: &mut impl Source) -> Result<usize> {
		self.check_open()?;
		let mut total = 0;
		while let Some(n) = source.read(self.buf_mut(), SIZE)? {
			total += n;
			self.emit_complete_segments()?;
		}
		Ok(total)
	}
}

/// Wraps any [`Source`] in a [`BufferedSource`].
pub trait SourceExt: Source + Sized {
	fn buffer(self) -> BufferedSource<Self> {
		BufferedSource::new(self)
	}
}

impl<S: Source> SourceExt for S { }

/// Wraps any [`Sink`] in a [`BufferedSink`].
pub trait SinkExt: Sink + Sized {
	fn buffer(self) -> BufferedSink<Self> {
		BufferedSink::new(self)
	}
}

impl<S: Sink> SinkExt for S { }

impl Source for &[u8] {
	fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>> {
		if byte_count == 0 {
			return Ok(Some(0))
		}
		let this = *self;
		if this.is_empty() {
			return Ok(None)
		}
		let n = min(byte_count, this.len());
		sink.write_from_slice(&this[..n]);
		*self = &this[n..];
		Ok(Some(n))
	}
}

fn scan_bounds(range: impl RangeBounds<usize>) -> (usize, usize) {
	let start = match range.start_bound() {
		Bound::Included(&s) => s,
		Bound::Excluded(&s) => s + 1,
		Bound::Unbounded => 0,
	};
	let end = match range.end_bound() {
		Bound::Included(&e) => e.saturating_add(1),
		Bound::Excluded(&e) => e,
		Bound::Unbounded => usize::MAX,
	};
	(start, end)
}

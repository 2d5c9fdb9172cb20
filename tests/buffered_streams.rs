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
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use brio::{buffer_sink, buffer_source, Buffer, BufStream, Error, ErrorKind, Result, SEGMENT_SIZE};
use brio::streams::{BufSink, BufSource, Sink, Source};

/// A source that hands out canned chunks, at most one per read, regardless
/// of how much was asked for. Mimics a drip-feeding socket.
struct Chunks(VecDeque<Vec<u8>>);

impl Chunks {
	fn of(chunks: &[&[u8]]) -> Self {
		Self(chunks.iter().map(|c| c.to_vec()).collect())
	}
}

impl Source for Chunks {
	fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>> {
		if byte_count == 0 { return Ok(Some(0)) }
		let Some(front) = self.0.front_mut() else { return Ok(None) };
		let n = min(byte_count, front.len());
		sink.write_from_slice(&front[..n]);
		if n == front.len() {
			self.0.pop_front();
		} else {
			front.drain(..n);
		}
		Ok(Some(n))
	}
}

/// A sink remembering everything written, and how often it was flushed and
/// closed.
#[derive(Clone, Default)]
struct Record {
	data: Arc<Mutex<Vec<u8>>>,
	writes: Arc<Mutex<usize>>,
	flushes: Arc<Mutex<usize>>,
}

impl Record {
	fn data(&self) -> Vec<u8> { self.data.lock().unwrap().clone() }
	fn writes(&self) -> usize { *self.writes.lock().unwrap() }
	fn flushes(&self) -> usize { *self.flushes.lock().unwrap() }
}

impl Sink for Record {
	fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result {
		let mut bytes = vec![0; byte_count];
		let n = source.read_into_slice(&mut bytes);
		assert_eq!(n, byte_count, "the writer never over-asks");
		self.data.lock().unwrap().extend_from_slice(&bytes);
		*self.writes.lock().unwrap() += 1;
		Ok(())
	}

	fn flush(&mut self) -> Result {
		*self.flushes.lock().unwrap() += 1;
		Ok(())
	}
}

#[test]
fn incremental_find_and_line() {
	let mut source = buffer_source(Chunks::of(&[b"abc", b"def", b"g\ng"]));

	assert_eq!(source.find(b'\n', ..).unwrap(), Some(7));

	let mut line = String::new();
	assert!(source.read_utf8_line(&mut line).unwrap());
	assert_eq!(line, "abcdefg");

	assert_eq!(source.buf().len(), 1, "one unread byte stays buffered");
	assert_eq!(source.read_utf8(1).unwrap(), "g");
	assert!(source.is_exhausted().unwrap());
}

#[test]
fn request_and_require() {
	let mut source = buffer_source(Chunks::of(&[b"abc", b"def"]));
	assert!(source.request(4).unwrap());
	assert!(!source.request(10).unwrap());
	assert_eq!(source.require(10).unwrap_err().kind(), ErrorKind::UnexpectedEof);
	// The pulled bytes are still there.
	assert_eq!(source.read_utf8(6).unwrap(), "abcdef");
}

#[test]
fn require_zero_never_pulls() {
	struct Untouchable;
	impl Source for Untouchable {
		fn read(&mut self, _: &mut Buffer, _: usize) -> Result<Option<usize>> {
			panic!("a zero-byte requirement must not pull")
		}
	}
	let mut source = buffer_source(Untouchable);
	source.require(0).unwrap();
}

#[test]
fn typed_reads_pull_on_demand() {
	let mut source = buffer_source(Chunks::of(&[b"\x12", b"\x34\x56", b"\x78"]));
	assert_eq!(source.read_u32().unwrap(), 0x1234_5678);
}

#[test]
fn decimal_across_pulls() {
	let mut source = buffer_source(Chunks::of(&[b"-1", b"2a"]));
	assert_eq!(source.read_decimal().unwrap(), -12);
	assert_eq!(source.read_u8().unwrap(), b'a');
}

#[test]
fn skip_pulls_and_discards() {
	let mut source = buffer_source(Chunks::of(&[b"abc", b"def", b"ghi"]));
	source.skip(7).unwrap();
	assert_eq!(source.read_utf8(2).unwrap(), "hi");
	assert_eq!(source.skip(1).unwrap_err().kind(), ErrorKind::UnexpectedEof);
}

#[test]
fn find_slice_straddles_pull_boundaries() {
	let mut source = buffer_source(Chunks::of(&[b"abcd", b"efgh"]));
	assert_eq!(source.find_slice(b"def", 0).unwrap(), Some(3));
	assert_eq!(source.find_slice(b"hij", 0).unwrap(), None);
}

#[test]
fn range_eq_pulls_on_demand() {
	let mut source = buffer_source(Chunks::of(&[b"head", b"tail"]));
	assert!(source.range_eq(4, b"tail").unwrap());
	assert!(!source.range_eq(4, b"tails").unwrap(), "exhaustion compares unequal");
}

#[test]
fn peek_leaves_the_source_in_place() {
	let mut source = buffer_source(Chunks::of(&[b"abc", b"def"]));

	let mut peek = source.peek();
	assert_eq!(peek.read_utf8(3).unwrap(), "abc");
	assert_eq!(peek.read_utf8(3).unwrap(), "def");
	assert!(peek.is_exhausted().unwrap());
	drop(peek);

	assert_eq!(source.read_utf8(6).unwrap(), "abcdef");
}

#[test]
fn peek_again_restarts_at_the_current_position() {
	let mut source = buffer_source(Chunks::of(&[b"abcdef"]));
	source.skip(2).unwrap();

	let mut peek = source.peek();
	assert_eq!(peek.read_utf8(2).unwrap(), "cd");
	drop(peek);

	let mut peek = source.peek();
	assert_eq!(peek.read_utf8(4).unwrap(), "cdef");
	drop(peek);

	assert_eq!(source.read_utf8(4).unwrap(), "cdef");
}

#[test]
fn source_close_is_idempotent_and_final() {
	let mut source = buffer_source(Chunks::of(&[b"abc"]));
	source.close_source().unwrap();
	source.close_source().unwrap();
	assert_eq!(source.request(1).unwrap_err().kind(), ErrorKind::Closed);
	assert_eq!(source.read_u8().unwrap_err().kind(), ErrorKind::Closed);
}

#[test]
fn exhausted_source_reports_eof_on_typed_reads() {
	let mut source = buffer_source(Chunks::of(&[b"ab"]));
	assert_eq!(source.read_u32().unwrap_err().kind(), ErrorKind::UnexpectedEof);
}

#[test]
fn small_writes_stay_buffered_until_flush() {
	let record = Record::default();
	let mut sink = buffer_sink(record.clone());

	sink.write_utf8("hello").unwrap();
	assert_eq!(record.data(), b"", "a partial segment is not emitted");

	sink.flush().unwrap();
	assert_eq!(record.data(), b"hello");
	assert_eq!(record.flushes(), 1);
}

#[test]
fn complete_segments_are_emitted_without_flush() {
	let record = Record::default();
	let mut sink = buffer_sink(record.clone());

	let data = vec![0x5a; SEGMENT_SIZE + 100];
	sink.write_from_slice(&data).unwrap();
	assert_eq!(record.data().len(), SEGMENT_SIZE, "whole segments go down early");
	assert_eq!(record.flushes(), 0);

	sink.emit().unwrap();
	assert_eq!(record.data().len(), data.len());
	assert_eq!(record.flushes(), 0, "emit does not flush");
}

#[test]
fn flush_without_writes_skips_the_underlying_write() {
	let record = Record::default();
	let mut sink = buffer_sink(record.clone());

	sink.write_utf8("once").unwrap();
	sink.flush().unwrap();
	let writes = record.writes();

	sink.flush().unwrap();
	assert_eq!(record.writes(), writes, "nothing new to write");
	assert_eq!(record.flushes(), 2);
}

#[test]
fn close_emits_remaining_bytes() {
	let record = Record::default();
	let mut sink = buffer_sink(record.clone());
	sink.write_utf8("tail bytes").unwrap();
	sink.close_sink().unwrap();
	sink.close_sink().unwrap();
	assert_eq!(record.data(), b"tail bytes");
	assert_eq!(sink.write_utf8("nope").unwrap_err().kind(), ErrorKind::Closed);
	assert_eq!(sink.flush().unwrap_err().kind(), ErrorKind::Closed);
}

#[test]
fn close_reports_the_first_error_but_still_closes() {
	struct Failing;
	impl Sink for Failing {
		fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result {
			source.skip(byte_count)?;
			Err(Error::new(ErrorKind::Io, "wire gone"))
		}
	}

	let mut sink = buffer_sink(Failing);
	sink.write_utf8("data").unwrap();
	assert_eq!(sink.close_sink().unwrap_err().kind(), ErrorKind::Io);
	assert_eq!(sink.write_utf8("x").unwrap_err().kind(), ErrorKind::Closed);
}

#[test]
fn write_all_moves_everything() {
	let record = Record::default();
	let mut sink = buffer_sink(record.clone());
	let mut source = buffer_source(Chunks::of(&[b"abc", b"def", b"g"]));

	let moved = sink.write_all(&mut source).unwrap();
	assert_eq!(moved, 7);
	sink.flush().unwrap();
	assert_eq!(record.data(), b"abcdefg");
}

#[test]
fn write_from_requires_the_full_count() {
	let record = Record::default();
	let mut sink = buffer_sink(record.clone());
	let mut source = buffer_source(Chunks::of(&[b"abc"]));
	assert_eq!(
		sink.write_from(&mut source, 5).unwrap_err().kind(),
		ErrorKind::UnexpectedEof,
	);
}

#[test]
fn std_io_bridges_round_trip() {
	use std::io::{Read, Write};
	use brio::{read_source, write_sink, IntoRead, IntoWrite};

	let mut staged = Vec::new();
	{
		let mut writer = buffer_sink(write_sink(&mut staged)).into_write();
		writer.write_all(b"through std").unwrap();
		writer.flush().unwrap();
	}
	assert_eq!(staged, b"through std");

	let mut reader = buffer_source(read_source(&staged[..])).into_read();
	let mut read = String::new();
	reader.read_to_string(&mut read).unwrap();
	assert_eq!(read, "through std");
}

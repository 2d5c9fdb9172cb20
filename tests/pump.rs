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
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use pretty_assertions::assert_eq;

use brio::{
	buffer_sink_write_behind, buffer_source_read_ahead, Buffer, ErrorKind, Result,
};
use brio::streams::{BufSink, BufSource, Sink, Source};

/// A source that drips its bytes in bounded chunks.
struct Drip {
	data: Vec<u8>,
	at: usize,
	chunk: usize,
}

impl Drip {
	fn new(data: Vec<u8>, chunk: usize) -> Self {
		Self { data, at: 0, chunk }
	}
}

impl Source for Drip {
	fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>> {
		if byte_count == 0 { return Ok(Some(0)) }
		if self.at == self.data.len() { return Ok(None) }
		let n = min(min(byte_count, self.chunk), self.data.len() - self.at);
		sink.write_from_slice(&self.data[self.at..self.at + n]);
		self.at += n;
		Ok(Some(n))
	}
}

/// A sink that accepts everything, slowly, remembering the bytes and their
/// order.
#[derive(Clone, Default)]
struct SlowSink {
	data: Arc<Mutex<Vec<u8>>>,
	flushes: Arc<Mutex<usize>>,
}

impl SlowSink {
	fn data(&self) -> Vec<u8> { self.data.lock().unwrap().clone() }
	fn flushes(&self) -> usize { *self.flushes.lock().unwrap() }
}

impl Sink for SlowSink {
	fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result {
		thread::sleep(Duration::from_millis(1));
		let mut bytes = vec![0; byte_count];
		let n = source.read_into_slice(&mut bytes);
		assert_eq!(n, byte_count);
		self.data.lock().unwrap().extend_from_slice(&bytes);
		Ok(())
	}

	fn flush(&mut self) -> Result {
		*self.flushes.lock().unwrap() += 1;
		Ok(())
	}
}

fn patterned(len: usize) -> Vec<u8> {
	(0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn read_ahead_round_trip() {
	// More data than the read-ahead gate holds at once.
	let data = patterned(300 * 1024);
	let mut source = buffer_source_read_ahead(Drip::new(data.clone(), 1500));
	let read = source.read_all_bytes().unwrap();
	assert_eq!(read.len(), data.len());
	assert_eq!(read, data);
	assert!(source.is_exhausted().unwrap());
}

#[test]
fn read_ahead_supports_typed_reads() {
	let mut staged = Buffer::new();
	staged.write_u32(0xdead_beef).unwrap();
	staged.write_decimal(-42).unwrap();
	staged.write_utf8("\nrest").unwrap();
	let bytes = staged.read_bytes(staged.len()).unwrap();

	let mut source = buffer_source_read_ahead(Drip::new(bytes, 3));
	assert_eq!(source.read_u32().unwrap(), 0xdead_beef);
	assert_eq!(source.read_decimal().unwrap(), -42);
	let mut line = String::new();
	assert!(source.read_utf8_line(&mut line).unwrap());
	assert_eq!(source.read_utf8(4).unwrap(), "rest");
	assert_eq!(source.read_u8().unwrap_err().kind(), ErrorKind::UnexpectedEof);
}

#[test]
fn read_ahead_close_terminates_the_pump() {
	let data = patterned(512 * 1024);
	let mut source = buffer_source_read_ahead(Drip::new(data, 4096));
	let head = source.read_bytes(1024).unwrap();
	assert_eq!(head, patterned(1024));
	source.close_source().unwrap();
	source.close_source().unwrap();
	assert_eq!(source.read_u8().unwrap_err().kind(), ErrorKind::Closed);
}

#[test]
fn write_behind_delivers_everything_in_order() {
	let recorder = SlowSink::default();
	let data = patterned(1024 * 1024);

	let mut sink = buffer_sink_write_behind(recorder.clone());
	for chunk in data.chunks(8 * 1024) {
		sink.write_from_slice(chunk).unwrap();
	}
	sink.close_sink().unwrap();

	let written = recorder.data();
	assert_eq!(written.len(), data.len(), "every byte arrives");
	assert_eq!(written, data, "in write order");
}

#[test]
fn write_behind_flush_waits_for_the_pump() {
	let recorder = SlowSink::default();
	let data = patterned(64 * 1024);

	let mut sink = buffer_sink_write_behind(recorder.clone());
	sink.write_from_slice(&data).unwrap();
	sink.flush().unwrap();

	assert_eq!(recorder.data(), data, "flush returns only after the pump drained");
	assert!(recorder.flushes() >= 1, "the underlying sink was flushed");
	sink.close_sink().unwrap();
}

#[test]
fn write_behind_close_is_idempotent_and_final() {
	let recorder = SlowSink::default();
	let mut sink = buffer_sink_write_behind(recorder.clone());
	sink.write_utf8("tail").unwrap();
	sink.close_sink().unwrap();
	sink.close_sink().unwrap();
	assert_eq!(recorder.data(), b"tail");
	assert_eq!(sink.write_utf8("no").unwrap_err().kind(), ErrorKind::Closed);
}

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

use std::cmp::max;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::{cancel, Buffer};
use crate::error::{Error, ErrorKind, Result};
use crate::segment::SIZE;
use super::Source;

/// The pump stops reading ahead once this many bytes sit unconsumed.
pub const MAX_READ_AHEAD: usize = 128 * 1024;

/// How long a blocked foreground waits between cancellation checks.
const WAIT_TICK: Duration = Duration::from_millis(50);

/// A [`Source`] that reads ahead of demand: a pump thread pulls from the
/// underlying source into a shared buffer, pausing at [`MAX_READ_AHEAD`]
/// buffered bytes, and foreground reads drain the buffer, waiting only when
/// it is empty. Closing terminates the pump, joins it, and closes the
/// underlying source.
pub struct ReadAhead<S: Source + Send + 'static> {
	shared: Arc<Shared>,
	pump: Option<JoinHandle<S>>,
	closed: bool,
}

#[derive(Default)]
struct Shared {
	state: Mutex<PumpState>,
	/// Pump to foreground: bytes arrived, or the pump terminated.
	filled: Condvar,
	/// Foreground to pump: demand posted, space freed, or closing.
	demand: Condvar,
}

#[derive(Default)]
struct PumpState {
	buffer: Buffer,
	/// The byte count a waiting foreground expects to see buffered.
	expected: usize,
	/// The underlying source is exhausted.
	eof: bool,
	/// The foreground is tearing the stream down.
	closed: bool,
	error: Option<Error>,
	failed: Option<ErrorKind>,
}

impl PumpState {
	/// Surfaces a stored pump failure: the original error the first time,
	/// its kind on every observation after that.
	fn failure(&mut self) -> Option<Error> {
		if let Some(error) = self.error.take() {
			return Some(error)
		}
		self.failed.map(Error::bare)
	}
}

impl Shared {
	fn lock(&self) -> MutexGuard<'_, PumpState> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}
}

impl<S: Source + Send + 'static> ReadAhead<S> {
	pub fn new(source: S) -> Self {
		let shared = Arc::new(Shared::default());
		let pump_shared = Arc::clone(&shared);
		let pump = thread::Builder::new()
			.name("brio-read-ahead".into())
			.spawn(move || {
				let mut source = source;
				run(&pump_shared, &mut source);
				source
			})
			.expect("failed to spawn the read-ahead pump");
		Self {
			shared,
			pump: Some(pump),
			closed: false,
		}
	}

	fn shutdown(&mut self) -> Result {
		if self.closed { return Ok(()) }
		self.closed = true;
		{
			let mut state = self.shared.lock();
			state.closed = true;
			state.buffer.clear();
			self.shared.demand.notify_all();
			self.shared.filled.notify_all();
		}
		match self.pump.take().map(JoinHandle::join) {
			Some(Ok(mut source)) => source.close_source(),
			Some(Err(_)) => Err(Error::new(ErrorKind::Io, "read-ahead pump panicked")),
			None => Ok(()),
		}
	}
}

impl<S: Source + Send + 'static> Source for ReadAhead<S> {
	fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>> {
		if self.closed { return Err(Error::closed()) }
		if byte_count == 0 { return Ok(Some(0)) }

		let mut state = self.shared.lock();
		loop {
			if state.closed {
				return Err(Error::closed())
			}
			if !state.buffer.is_empty() {
				let n = state.buffer.move_into(sink, byte_count);
				// Space freed: let a paused pump resume.
				self.shared.demand.notify_all();
				return Ok(Some(n))
			}
			if let Some(error) = state.failure() {
				return Err(error)
			}
			if state.eof {
				return Ok(None)
			}

			if let Err(cancelled) = cancel::check() {
				state.closed = true;
				self.shared.demand.notify_all();
				return Err(cancelled)
			}
			state.expected = byte_count;
			self.shared.demand.notify_all();
			let (relocked, _) = self.shared.filled
				.wait_timeout(state, WAIT_TICK)
				.unwrap_or_else(|e| e.into_inner());
			state = relocked;
		}
	}

	fn close_source(&mut self) -> Result {
		self.shutdown()
	}
}

impl<S: Source + Send + 'static> Drop for ReadAhead<S> {
	fn drop(&mut self) {
		let _ = self.shutdown();
	}
}

fn run<S: Source>(shared: &Shared, source: &mut S) {
	log::trace!("read-ahead: pump started");
	let mut scratch = Buffer::new();
	loop {
		// Decide how much to read, pausing while the gate is full and no
		// expectation is pending.
		let want = {
			let mut state = shared.lock();
			loop {
				if state.closed {
					log::trace!("read-ahead: pump closed");
					return
				}
				if state.expected > 0 && state.buffer.len() >= state.expected {
					state.expected = 0;
					shared.filled.notify_all();
				}
				if state.expected > state.buffer.len() {
					break state.expected - state.buffer.len()
				}
				if state.buffer.len() < MAX_READ_AHEAD {
					break SIZE
				}
				state = shared.demand
					.wait(state)
					.unwrap_or_else(|e| e.into_inner());
			}
		};

		match source.read(&mut scratch, max(want, SIZE)) {
			Ok(Some(_)) => {
				let mut state = shared.lock();
				let n = scratch.len();
				scratch.move_into(&mut state.buffer, n);
				shared.filled.notify_all();
			}
			Ok(None) => {
				let mut state = shared.lock();
				state.eof = true;
				shared.filled.notify_all();
				log::trace!("read-ahead: source exhausted, pump terminating");
				return
			}
			Err(error) => {
				let mut state = shared.lock();
				state.failed = Some(error.kind());
				state.error = Some(error);
				shared.filled.notify_all();
				log::trace!("read-ahead: source failed, pump terminating");
				return
			}
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::streams::BufSource;
	use crate::buffer_source_read_ahead;

	#[test]
	fn delivers_all_bytes_in_order() {
		let data: Vec<u8> = (0..100_000u32).map(|i| i as u8).collect();
		let mut source = buffer_source_read_ahead(Cursor(data.clone()));
		let read = source.read_all_bytes().unwrap();
		assert_eq!(read, data);
	}

	#[test]
	fn surfaces_the_pump_error() {
		struct Failing;
		impl Source for Failing {
			fn read(&mut self, _: &mut Buffer, _: usize) -> Result<Option<usize>> {
				Err(Error::new(ErrorKind::Io, "broken transport"))
			}
		}
		let mut source = ReadAhead::new(Failing);
		let mut sink = Buffer::new();
		let error = source.read(&mut sink, 1).unwrap_err();
		assert_eq!(error.kind(), ErrorKind::Io);
	}

	/// A source handing out its bytes in small chunks.
	struct Cursor(Vec<u8>);

	impl Source for Cursor {
		fn read(&mut self, sink: &mut Buffer, byte_count: usize) -> Result<Option<usize>> {
			if byte_count == 0 { return Ok(Some(0)) }
			if self.0.is_empty() { return Ok(None) }
			let n = byte_count.min(self.0.len()).min(997);
			sink.write_from_slice(&self.0[..n]);
			self.0.drain(..n);
			Ok(Some(n))
		}
	}
}

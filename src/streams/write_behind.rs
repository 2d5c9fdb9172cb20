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

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::{cancel, Buffer};
use crate::error::{Error, ErrorKind, Result};
use super::Sink;

/// Writes block once this many bytes wait for the pump.
pub const MAX_WRITE_BEHIND: usize = 128 * 1024;

/// How long a blocked foreground waits between cancellation checks.
const WAIT_TICK: Duration = Duration::from_millis(50);

/// A [`Sink`] that writes behind the caller: foreground writes land in a
/// shared buffer and enqueue an emit event; a pump thread drains the events
/// to the underlying sink in order. The foreground blocks while more than
/// [`MAX_WRITE_BEHIND`] bytes wait, and on `flush`, which completes only
/// after every previously enqueued event has. Closing drains the queue,
/// joins the pump, and closes the underlying sink.
pub struct WriteBehind<S: Sink + Send + 'static> {
	shared: Arc<Shared>,
	pump: Option<JoinHandle<S>>,
	closed: bool,
}

/// A drain boundary: `bytes` more of the shared buffer to write, then
/// optionally a flush.
struct EmitEvent {
	bytes: usize,
	flush: bool,
}

#[derive(Default)]
struct Shared {
	state: Mutex<PumpState>,
	/// Pump to foreground: an event completed, or the pump terminated.
	drained: Condvar,
	/// Foreground to pump: an event was enqueued, or closing.
	work: Condvar,
}

#[derive(Default)]
struct PumpState {
	buffer: Buffer,
	events: VecDeque<EmitEvent>,
	/// Events enqueued and completed, for flush rendezvous.
	enqueued: u64,
	completed: u64,
	shutdown: bool,
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

impl<S: Sink + Send + 'static> WriteBehind<S> {
	pub fn new(sink: S) -> Self {
		let shared = Arc::new(Shared::default());
		let pump_shared = Arc::clone(&shared);
		let pump = thread::Builder::new()
			.name("brio-write-behind".into())
			.spawn(move || {
				let mut sink = sink;
				run(&pump_shared, &mut sink);
				sink
			})
			.expect("failed to spawn the write-behind pump");
		Self {
			shared,
			pump: Some(pump),
			closed: false,
		}
	}

	/// Blocks until the pump drains the shared buffer below
	/// [`MAX_WRITE_BEHIND`].
	fn pause_if_full(&self) -> Result {
		let mut state = self.shared.lock();
		while state.buffer.len() > MAX_WRITE_BEHIND {
			if let Some(error) = state.failure() {
				return Err(error)
			}
			cancel::check()?;
			let (relocked, _) = self.shared.drained
				.wait_timeout(state, WAIT_TICK)
				.unwrap_or_else(|e| e.into_inner());
			state = relocked;
		}
		Ok(())
	}
}

impl<S: Sink + Send + 'static> Sink for WriteBehind<S> {
	fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result {
		if self.closed { return Err(Error::closed()) }
		if byte_count > source.len() {
			return Err(Error::invalid_input("write count exceeds the buffered bytes"))
		}
		self.pause_if_full()?;

		let mut state = self.shared.lock();
		if let Some(error) = state.failure() {
			return Err(error)
		}
		source.move_into(&mut state.buffer, byte_count);
		match state.events.back_mut() {
			// Fold into the last pending boundary instead of queueing a
			// duplicate.
			Some(event) if !event.flush => event.bytes += byte_count,
			_ => {
				state.events.push_back(EmitEvent { bytes: byte_count, flush: false });
				state.enqueued += 1;
			}
		}
		self.shared.work.notify_all();
		Ok(())
	}

	fn flush(&mut self) -> Result {
		if self.closed { return Err(Error::closed()) }

		let mut state = self.shared.lock();
		if let Some(error) = state.failure() {
			return Err(error)
		}
		state.events.push_back(EmitEvent { bytes: 0, flush: true });
		state.enqueued += 1;
		let target = state.enqueued;
		self.shared.work.notify_all();

		while state.completed < target {
			if let Some(error) = state.failure() {
				return Err(error)
			}
			cancel::check()?;
			let (relocked, _) = self.shared.drained
				.wait_timeout(state, WAIT_TICK)
				.unwrap_or_else(|e| e.into_inner());
			state = relocked;
		}
		Ok(())
	}

	fn close_sink(&mut self) -> Result {
		if self.closed { return Ok(()) }
		self.closed = true;
		{
			let mut state = self.shared.lock();
			state.shutdown = true;
			self.shared.work.notify_all();
		}
		match self.pump.take().map(JoinHandle::join) {
			Some(Ok(mut sink)) => {
				let closed = sink.close_sink();
				let failed = self.shared.lock().failure();
				match failed {
					Some(error) => Err(error),
					None => closed,
				}
			}
			Some(Err(_)) => Err(Error::new(ErrorKind::Io, "write-behind pump panicked")),
			None => Ok(()),
		}
	}
}

impl<S: Sink + Send + 'static> Drop for WriteBehind<S> {
	fn drop(&mut self) {
		if let Err(error) = self.close_sink() {
			log::debug!("write-behind sink dropped with close error: {error}");
		}
	}
}

fn run<S: Sink>(shared: &Shared, sink: &mut S) {
	log::trace!("write-behind: pump started");
	let mut scratch = Buffer::new();
	loop {
		// Claim the next event, moving its bytes out so the write happens
		// outside the lock.
		let flush = {
			let mut state = shared.lock();
			loop {
				if let Some(event) = state.events.pop_front() {
					state.buffer.move_into(&mut scratch, event.bytes);
					break event.flush
				}
				if state.shutdown {
					if state.buffer.is_empty() {
						log::trace!("write-behind: queue drained, pump exiting");
						return
					}
					// Stray bytes with no boundary: drain them on the way
					// out.
					let n = state.buffer.len();
					state.buffer.move_into(&mut scratch, n);
					break true
				}
				state = shared.work
					.wait(state)
					.unwrap_or_else(|e| e.into_inner());
			}
		};

		let result = write_event(sink, &mut scratch, flush);
		let mut state = shared.lock();
		match result {
			Ok(()) => {
				state.completed += 1;
				shared.drained.notify_all();
			}
			Err(error) => {
				state.failed = Some(error.kind());
				state.error = Some(error);
				shared.drained.notify_all();
				log::trace!("write-behind: sink failed, pump terminating");
				return
			}
		}
	}
}

fn write_event<S: Sink>(sink: &mut S, scratch: &mut Buffer, flush: bool) -> Result {
	let n = scratch.len();
	if n > 0 {
		sink.write(scratch, n)?;
	}
	if flush {
		sink.flush()?;
	}
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn events_drain_in_order() {
		let mut behind = WriteBehind::new(Remembering::default());
		let mut staged = Buffer::new();
		for chunk in [&b"write"[..], b" behind", b" order"] {
			staged.write_from_slice(chunk);
			let n = staged.len();
			behind.write(&mut staged, n).unwrap();
		}
		behind.flush().unwrap();
		let written = behind.shared.lock().completed;
		assert!(written > 0);
		behind.close_sink().unwrap();
	}

	#[derive(Default)]
	struct Remembering(Vec<u8>);

	impl Sink for Remembering {
		fn write(&mut self, source: &mut Buffer, byte_count: usize) -> Result {
			let mut bytes = vec![0; byte_count];
			let n = source.read_into_slice(&mut bytes);
			debug_assert_eq!(n, byte_count);
			self.0.extend_from_slice(&bytes);
			Ok(())
		}
	}
}

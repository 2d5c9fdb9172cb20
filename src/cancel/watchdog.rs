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

//! The shared watchdog: one background thread firing timeout actions for
//! every pending scope in the process. Pending entries sit in a
//! deadline-sorted list under a single lock; the thread sleeps until the
//! head is due, fires its action outside the lock, and exits after a minute
//! of idleness to be restarted lazily by the next schedule.

use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

type Action = Box<dyn FnOnce() + Send>;

/// Handle to a scheduled timeout, used to cancel it once the guarded
/// operation completes.
pub(crate) struct TimeoutNode {
	id: u64,
}

struct Entry {
	id: u64,
	deadline: Instant,
	action: Action,
}

#[derive(Default)]
struct State {
	queue: Vec<Entry>,
	running: bool,
	next_id: u64,
}

struct Watchdog {
	state: Mutex<State>,
	cond: Condvar,
}

static WATCHDOG: Lazy<Watchdog> = Lazy::new(|| Watchdog {
	state: Mutex::new(State::default()),
	cond: Condvar::new(),
});

/// Schedules `action` to fire at `deadline`. The action must be short and
/// non-blocking; the typical one closes the transport a blocked operation is
/// waiting on.
pub(crate) fn schedule(deadline: Instant, action: Action) -> TimeoutNode {
	let mut state = lock();
	let id = state.next_id;
	state.next_id += 1;

	let at = state.queue.partition_point(|e| e.deadline <= deadline);
	state.queue.insert(at, Entry { id, deadline, action });
	log::trace!("watchdog: scheduled node {id}");

	if !state.running {
		state.running = true;
		thread::spawn(run);
	} else if at == 0 {
		// New head: wake the thread to shorten its sleep.
		WATCHDOG.cond.notify_one();
	}

	TimeoutNode { id }
}

/// Cancels a scheduled timeout. Returns `false` when the watchdog already
/// fired it.
pub(crate) fn cancel_schedule(node: TimeoutNode) -> bool {
	let mut state = lock();
	if let Some(i) = state.queue.iter().position(|e| e.id == node.id) {
		state.queue.remove(i);
		true
	} else {
		false
	}
}

fn run() {
	log::trace!("watchdog: thread started");
	let mut state = lock();
	loop {
		let now = Instant::now();
		match state.queue.first().map(|e| e.deadline) {
			Some(deadline) if deadline <= now => {
				let entry = state.queue.remove(0);
				drop(state);
				log::trace!("watchdog: firing node {}", entry.id);
				(entry.action)();
				state = lock();
			}
			Some(deadline) => {
				let (relocked, _) = WATCHDOG.cond
					.wait_timeout(state, deadline - now)
					.unwrap_or_else(|e| e.into_inner());
				state = relocked;
			}
			None => {
				let (relocked, wait) = WATCHDOG.cond
					.wait_timeout(state, IDLE_TIMEOUT)
					.unwrap_or_else(|e| e.into_inner());
				state = relocked;
				if wait.timed_out() && state.queue.is_empty() {
					state.running = false;
					log::trace!("watchdog: idle, thread exiting");
					return
				}
			}
		}
	}
}

fn lock() -> std::sync::MutexGuard<'static, State> {
	WATCHDOG.state.lock().unwrap_or_else(|e| e.into_inner())
}

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

//! Cancellation scopes for blocking operations.
//!
//! A [`CancelToken`] carries a timeout, an absolute deadline, and a
//! cancelled flag. Entering a scope pushes the token onto a thread-local
//! stack; every blocking step of the buffered streams calls [`check`], which
//! intersects the stack from the innermost scope outward, skipping finished
//! tokens and stopping at a shielded one, and fails with `Cancelled` or
//! `TimedOut` accordingly.
//!
//! Cancellation is a hint: setting it does not interrupt anything by itself.
//! [`with_timeout`] pairs a scope with the shared watchdog thread, which
//! fires a user-supplied action when the deadline elapses. The typical action
//! closes the transport the operation is blocked on, so the operation fails
//! and the wrapper translates the outcome into `TimedOut`.
//!
//! Tokens are `Clone` and shareable across threads; the stack is not.
//! Nothing is inherited by spawned threads unless a token is explicitly
//! moved into them.

mod watchdog;

use std::cell::RefCell;
use std::cmp::min;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{Error, ErrorKind, Result};

/// A shareable carrier of deadline, timeout, and cancellation state for a
/// cancellable block.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
	state: Arc<TokenState>,
}

#[derive(Debug, Default)]
struct TokenState {
	timeout: Option<Duration>,
	deadline: Option<Instant>,
	cancelled: AtomicBool,
	shielded: AtomicBool,
	finished: AtomicBool,
}

impl CancelToken {
	/// Creates a token with no timeout and no deadline; it only cancels when
	/// told to.
	pub fn new() -> Self { Self::default() }

	/// Creates a token whose scopes time out `timeout` after entry.
	pub fn with_timeout(timeout: Duration) -> Self {
		Self::build(Some(timeout), None)
	}

	/// Creates a token whose scopes time out at the absolute `deadline`.
	pub fn with_deadline(deadline: Instant) -> Self {
		Self::build(None, Some(deadline))
	}

	fn build(timeout: Option<Duration>, deadline: Option<Instant>) -> Self {
		Self {
			state: Arc::new(TokenState {
				timeout,
				deadline,
				..TokenState::default()
			}),
		}
	}

	/// Requests cancellation. The owning operation observes it at its next
	/// cancellation check or blocking step.
	pub fn cancel(&self) {
		self.state.cancelled.store(true, Ordering::Relaxed);
	}

	/// Returns `true` once [`cancel`](Self::cancel) has been called.
	pub fn is_cancelled(&self) -> bool {
		self.state.cancelled.load(Ordering::Relaxed)
	}

	/// Shields scopes of this token from deadlines and timeouts of enclosing
	/// scopes. Sticky for the token's lifetime.
	pub fn shield(&self) {
		self.state.shielded.store(true, Ordering::Relaxed);
	}

	pub(crate) fn is_shielded(&self) -> bool {
		self.state.shielded.load(Ordering::Relaxed)
	}

	pub(crate) fn is_finished(&self) -> bool {
		self.state.finished.load(Ordering::Relaxed)
	}

	fn finish(&self) {
		self.state.finished.store(true, Ordering::Relaxed);
	}

	/// The instant at which a scope entered now would time out: the earlier
	/// of the absolute deadline and `now + timeout`.
	fn deadline_at(&self, now: Instant) -> Option<Instant> {
		let timeout_at = self.state.timeout.map(|t| now + t);
		match (self.state.deadline, timeout_at) {
			(Some(d), Some(t)) => Some(min(d, t)),
			(deadline, timeout) => deadline.or(timeout),
		}
	}
}

struct ScopeEntry {
	token: CancelToken,
	deadline: Option<Instant>,
}

thread_local! {
	static STACK: RefCell<Vec<ScopeEntry>> = RefCell::new(Vec::new());
}

/// An entered cancel scope. On drop it leaves the scope, popping the stack
/// and marking the token finished.
#[must_use = "a scope guard cancels nothing once dropped"]
pub struct CancelScope {
	_not_send: PhantomData<*mut ()>,
}

/// Enters a scope for `token` on the current thread. Timeouts are anchored
/// here: a token with a 1s timeout entered now expires 1s from now.
pub fn enter(token: &CancelToken) -> CancelScope {
	push(token, token.deadline_at(Instant::now()))
}

fn push(token: &CancelToken, deadline: Option<Instant>) -> CancelScope {
	STACK.with(|stack| {
		stack.borrow_mut().push(ScopeEntry {
			token: token.clone(),
			deadline,
		})
	});
	CancelScope { _not_send: PhantomData }
}

impl Drop for CancelScope {
	fn drop(&mut self) {
		let entry = STACK.with(|stack| stack.borrow_mut().pop());
		if let Some(entry) = entry {
			entry.token.finish();
		}
	}
}

/// Fails with `Cancelled` or `TimedOut` when the intersection of the
/// scopes entered on this thread says so. Cheap when no scope is active.
pub fn check() -> Result {
	STACK.with(|stack| {
		let stack = stack.borrow();
		if stack.is_empty() { return Ok(()) }

		let now = Instant::now();
		for entry in stack.iter().rev() {
			if entry.token.is_finished() { continue }
			if entry.token.is_cancelled() {
				return Err(Error::cancelled())
			}
			if entry.deadline.is_some_and(|deadline| deadline <= now) {
				return Err(Error::timed_out())
			}
			if entry.token.is_shielded() { break }
		}
		Ok(())
	})
}

/// Runs `block` inside a scope for `token`.
pub fn with_token<T>(token: &CancelToken, block: impl FnOnce() -> T) -> T {
	let _scope = enter(token);
	block()
}

/// Runs `block` shielded from deadlines and timeouts of enclosing scopes.
pub fn shielded<T>(block: impl FnOnce() -> T) -> T {
	let token = CancelToken::new();
	token.shield();
	with_token(&token, block)
}

/// Runs `block` inside a scope for `token`, with `on_timeout` armed on the
/// shared watchdog for the token's deadline. When the watchdog fires, before
/// or after the block completes, the outcome is a `TimedOut` error,
/// carrying the block's own error as its cause if it failed too.
///
/// `on_timeout` must be short and non-blocking; the typical action closes
/// the underlying transport so the blocked operation fails promptly.
pub fn with_timeout<T>(
	token: &CancelToken,
	on_timeout: impl FnOnce() + Send + 'static,
	block: impl FnOnce() -> Result<T>,
) -> Result<T> {
	let deadline = token.deadline_at(Instant::now());
	let _scope = push(token, deadline);
	let Some(deadline) = deadline else {
		return block()
	};

	let node = watchdog::schedule(deadline, Box::new(on_timeout));
	let result = block();
	if watchdog::cancel_schedule(node) {
		result
	} else {
		match result {
			Ok(_) => Err(Error::timed_out()),
			Err(cause) => Err(Error::new(ErrorKind::TimedOut, cause)),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn unscoped_check_passes() {
		assert!(check().is_ok());
	}

	#[test]
	fn cancel_is_observed_in_scope() {
		let token = CancelToken::new();
		let scope = enter(&token);
		assert!(check().is_ok());
		token.cancel();
		assert_eq!(check().unwrap_err().kind(), ErrorKind::Cancelled);
		drop(scope);
		assert!(check().is_ok(), "a popped scope no longer applies");
	}

	#[test]
	fn deadline_elapses() {
		let token = CancelToken::with_deadline(Instant::now());
		let _scope = enter(&token);
		assert_eq!(check().unwrap_err().kind(), ErrorKind::TimedOut);
	}

	#[test]
	fn inner_scope_inherits_outer_deadline() {
		let outer = CancelToken::with_deadline(Instant::now());
		let _outer = enter(&outer);
		let inner = CancelToken::new();
		let _inner = enter(&inner);
		assert_eq!(check().unwrap_err().kind(), ErrorKind::TimedOut);
	}

	#[test]
	fn shield_cuts_inherited_deadline() {
		let outer = CancelToken::with_deadline(Instant::now());
		let _outer = enter(&outer);
		shielded(|| assert!(check().is_ok()));
		assert_eq!(check().unwrap_err().kind(), ErrorKind::TimedOut);
	}

	#[test]
	fn timeout_anchors_at_entry() {
		let token = CancelToken::with_timeout(Duration::from_secs(3600));
		let _scope = enter(&token);
		assert!(check().is_ok());
	}
}

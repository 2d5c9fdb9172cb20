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

mod read;
mod write;

use std::cmp::min;
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Bound, RangeBounds};

use itertools::Itertools;

use crate::{pool, ByteString};
use crate::error::{Error, Result};
use crate::segment::{Segment, SHARE_MINIMUM, SIZE};

/// A deque of bytes with segment granularity. Bytes are read from the front
/// and written to the back; whole segments move between buffers without
/// copying, and copies share segment blocks wherever ranges are large enough
/// to be worth pinning.
///
/// A buffer is single-owner: it is not meant to be used from two threads at
/// once, and the borrow checker enforces as much. It is also both a [`Source`]
/// and a [`Sink`], the degenerate buffered stream whose backing store is
/// always "ready".
///
/// [`Source`]: crate::streams::Source
/// [`Sink`]: crate::streams::Sink
#[derive(Default)]
pub struct Buffer {
	segments: VecDeque<Segment>,
	len: usize,
}

impl Buffer {
	/// Creates an empty buffer.
	pub fn new() -> Self { Self::default() }

	/// Returns the number of readable bytes.
	pub fn len(&self) -> usize { self.len }

	/// Returns `true` if the buffer contains no bytes.
	pub fn is_empty(&self) -> bool { self.len == 0 }

	/// Recycles all segments, dropping the buffered bytes.
	pub fn clear(&mut self) {
		for seg in self.segments.drain(..) {
			pool::recycle(seg);
		}
		self.len = 0;
	}

	/// Returns the byte at `index` without consuming it, or `None` when the
	/// index is out of bounds. Costs a walk over the segments.
	pub fn get(&self, mut index: usize) -> Option<u8> {
		if index >= self.len { return None }
		for seg in &self.segments {
			if index < seg.len() {
				return Some(seg.data()[index])
			}
			index -= seg.len();
		}
		None
	}

	/// Drops `byte_count` bytes from the front. Fails with `UnexpectedEof`
	/// when fewer bytes are buffered, leaving the buffer unchanged.
	pub fn skip(&mut self, byte_count: usize) -> Result {
		if byte_count > self.len {
			return Err(Error::eof())
		}
		let mut remaining = byte_count;
		while remaining > 0 {
			let front = self.segments.front_mut()
				.expect("buffer length covers the skip");
			let n = min(front.len(), remaining);
			front.consume(n);
			remaining -= n;
			if front.is_empty() {
				let seg = self.segments.pop_front()
					.expect("front segment exists");
				pool::recycle(seg);
			}
		}
		self.len -= byte_count;
		Ok(())
	}

	/// Drops every buffered byte.
	pub fn skip_all(&mut self) {
		self.clear();
	}

	/// Returns the position of the first `byte` within `range`, or `None`.
	pub fn find(&self, byte: u8, range: impl RangeBounds<usize>) -> Option<usize> {
		let (start, end) = self.clamp_range(range);
		let mut base = 0;
		for seg in &self.segments {
			if base >= end { break }
			let lo = start.saturating_sub(base);
			let hi = min(seg.len(), end - base);
			if lo < hi {
				if let Some(i) = seg.data()[lo..hi].iter().position(|&b| b == byte) {
					return Some(base + lo + i)
				}
			}
			base += seg.len();
		}
		None
	}

	/// Returns the position of the first occurrence of `needle` at or after
	/// `from`, or `None`. Matches may straddle segment boundaries.
	pub fn find_slice(&self, needle: &[u8], from: usize) -> Option<usize> {
		if needle.is_empty() {
			return Some(min(from, self.len))
		}
		let mut start = from;
		while let Some(i) = self.find(needle[0], start..) {
			if i + needle.len() > self.len { return None }
			if self.range_eq(i, needle) { return Some(i) }
			start = i + 1;
		}
		None
	}

	/// Returns the position of the first byte contained in `set` at or after
	/// `from`, or `None`.
	pub fn find_any(&self, set: &[u8], from: usize) -> Option<usize> {
		let mut base = 0;
		for seg in &self.segments {
			let lo = from.saturating_sub(base);
			if lo < seg.len() {
				if let Some(i) = seg.data()[lo..].iter().position(|b| set.contains(b)) {
					return Some(base + lo + i)
				}
			}
			base += seg.len();
		}
		None
	}

	/// Returns `true` if the bytes at `offset` equal `bytes`. Out-of-bounds
	/// ranges compare unequal.
	pub fn range_eq(&self, offset: usize, bytes: &[u8]) -> bool {
		if offset.checked_add(bytes.len()).map_or(true, |end| end > self.len) {
			return false
		}
		let mut rest = bytes;
		let mut base = 0;
		for seg in &self.segments {
			if rest.is_empty() { break }
			let lo = offset.saturating_sub(base);
			if lo < seg.len() {
				let n = min(seg.len() - lo, rest.len());
				if seg.data()[lo..lo + n] != rest[..n] {
					return false
				}
				rest = &rest[n..];
			}
			base += seg.len();
		}
		rest.is_empty()
	}

	/// Copies `byte_count` bytes at `offset` into `sink` without consuming
	/// them. Ranges of a kilobyte and up share segment blocks; smaller
	/// ranges are copied outright.
	pub fn copy_to(&self, sink: &mut Buffer, mut offset: usize, mut byte_count: usize) -> Result {
		if offset.checked_add(byte_count).map_or(true, |end| end > self.len) {
			return Err(Error::invalid_input("copy range out of bounds"))
		}
		for seg in &self.segments {
			if byte_count == 0 { break }
			let len = seg.len();
			if offset >= len {
				offset -= len;
				continue
			}
			let n = min(len - offset, byte_count);
			if n >= SHARE_MINIMUM {
				let mut view = seg.share_all();
				view.consume(offset);
				view.truncate(n);
				sink.push_segment(view);
			} else {
				sink.write_from_slice(&seg.data()[offset..offset + n]);
			}
			offset = 0;
			byte_count -= n;
		}
		Ok(())
	}

	/// Folds partially-filled segments together, recycling the ones emptied
	/// out. Reading at offsets and splitting leave gaps behind; compacting
	/// trades one pass of copying for a denser buffer. Shared segments are
	/// left as they are.
	pub fn compact(&mut self) {
		let mut compacted = VecDeque::with_capacity(self.segments.len());
		let mut acc: Option<Segment> = None;
		for mut seg in self.segments.drain(..) {
			let Some(mut base) = acc.take() else {
				acc = Some(seg);
				continue
			};
			let fit = min(seg.len(), SIZE - base.len());
			if fit > 0 {
				seg.write_to(&mut base, fit);
			}
			if seg.is_empty() {
				pool::recycle(seg);
				acc = Some(base);
			} else {
				compacted.push_back(base);
				acc = Some(seg);
			}
		}
		if let Some(base) = acc {
			compacted.push_back(base);
		}
		self.segments = compacted;
		debug_assert_eq!(self.len, self.recount());
	}

	/// Returns an immutable snapshot of the readable bytes.
	pub fn snapshot(&self) -> ByteString {
		let mut bytes = Vec::with_capacity(self.len);
		for seg in &self.segments {
			bytes.extend_from_slice(seg.data());
		}
		bytes.into()
	}

	/// Moves up to `byte_count` bytes to the back of `sink`, splitting at
	/// most one partial segment, and returns the count moved.
	pub(crate) fn move_into(&mut self, sink: &mut Buffer, byte_count: usize) -> usize {
		let moved = min(byte_count, self.len);
		let mut remaining = moved;
		while remaining > 0 {
			let front_len = self.segments.front()
				.expect("buffer length covers the move")
				.len();
			if front_len <= remaining {
				let seg = self.segments.pop_front()
					.expect("front segment exists");
				sink.push_segment(seg);
				remaining -= front_len;
			} else {
				let front = self.segments.front_mut()
					.expect("front segment exists");
				let prefix = front.split(remaining);
				sink.push_segment(prefix);
				remaining = 0;
			}
		}
		self.len -= moved;
		debug_assert_eq!(self.len, self.recount());
		debug_assert_eq!(sink.len, sink.recount());
		moved
	}

	/// Appends a segment, folding small ones into the tail to keep the deque
	/// from silting up with fragments.
	pub(crate) fn push_segment(&mut self, mut seg: Segment) {
		self.len += seg.len();
		if seg.is_empty() {
			pool::recycle(seg);
			return
		}
		if let Some(tail) = self.segments.back_mut() {
			let n = seg.len();
			if n < SHARE_MINIMUM && seg.write_to(tail, n) {
				pool::recycle(seg);
				return
			}
		}
		self.segments.push_back(seg);
	}

	/// Returns a tail segment with at least `min_capacity` contiguous bytes of
	/// writable space, claiming a fresh one from the pool when the current
	/// tail is absent, shared, or too full.
	pub(crate) fn writable_tail(&mut self, min_capacity: usize) -> &mut Segment {
		debug_assert!(min_capacity <= SIZE);
		let needs_fresh = match self.segments.back() {
			Some(tail) => !tail.is_writable() || tail.trailing_space() < min_capacity,
			None => true,
		};
		if needs_fresh {
			self.segments.push_back(pool::take());
		}
		self.segments.back_mut().expect("a tail was just ensured")
	}

	/// Bytes in whole segments: everything except a partial, still-writable
	/// tail.
	pub(crate) fn complete_segment_bytes(&self) -> usize {
		match self.segments.back() {
			Some(tail) if tail.is_writable() && tail.limit() < SIZE =>
				self.len - tail.len(),
			_ => self.len,
		}
	}

	pub(crate) fn grow(&mut self, n: usize) {
		self.len += n;
	}

	fn clamp_range(&self, range: impl RangeBounds<usize>) -> (usize, usize) {
		let start = match range.start_bound() {
			Bound::Included(&s) => s,
			Bound::Excluded(&s) => s + 1,
			Bound::Unbounded => 0,
		};
		let end = match range.end_bound() {
			Bound::Included(&e) => e.saturating_add(1),
			Bound::Excluded(&e) => e,
			Bound::Unbounded => self.len,
		};
		(start, min(end, self.len))
	}

	fn recount(&self) -> usize {
		self.segments.iter().map(Segment::len).sum()
	}
}

impl Drop for Buffer {
	fn drop(&mut self) {
		self.clear();
	}
}

impl Clone for Buffer {
	/// Copies the readable bytes into a new buffer, sharing segment blocks
	/// where ranges are large enough.
	fn clone(&self) -> Self {
		let mut copy = Self::new();
		self.copy_to(&mut copy, 0, self.len)
			.expect("full-range copy is always in bounds");
		copy
	}
}

impl PartialEq for Buffer {
	fn eq(&self, other: &Self) -> bool {
		if self.len != other.len { return false }
		let mut rest = other.segments.iter().flat_map(Segment::data);
		self.segments
			.iter()
			.flat_map(Segment::data)
			.all(|b| rest.next() == Some(b))
	}
}

impl Eq for Buffer { }

impl std::hash::Hash for Buffer {
	/// Hashes the readable bytes, so equal contents hash equally no matter
	/// how they are segmented.
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		state.write_usize(self.len);
		for byte in self.segments.iter().flat_map(Segment::data) {
			state.write_u8(*byte);
		}
	}
}

impl fmt::Debug for Buffer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		const PREVIEW: usize = 64;
		let head = self.segments
			.iter()
			.flat_map(Segment::data)
			.take(PREVIEW)
			.format_with("", |b, f| f(&format_args!("{b:02x}")));
		write!(f, "Buffer[{}: {head}", self.len)?;
		if self.len > PREVIEW {
			write!(f, "…")?;
		}
		write!(f, "]")
	}
}

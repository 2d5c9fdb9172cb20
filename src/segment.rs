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
use std::fmt;
use std::sync::Arc;

use crate::pool;

/// The fixed capacity of a segment block.
pub const SIZE: usize = 8192;
/// Splits smaller than this are copied into a fresh segment instead of sharing
/// the block, trading a short copy for not pinning 8KiB of memory.
pub(crate) const SHARE_MINIMUM: usize = 1024;

pub(crate) type Block = [u8; SIZE];

/// A fixed-capacity chunk of buffer memory: a `pos..limit` view over a
/// refcounted block. Readable bytes are `block[pos..limit]`; writable space is
/// `block[limit..]`, available only to the unique owner of the block.
///
/// Sharing a segment clones the block handle in O(1). Shared views are
/// read-only and are never returned to the pool; the block itself is reclaimed
/// by the pool once the last reference drops it.
pub(crate) struct Segment {
	block: Arc<Block>,
	pos: usize,
	limit: usize,
	/// The segment may append to its block. One owner per block.
	owner: bool,
	/// The segment is a read-only view of a block observed elsewhere.
	shared: bool,
}

impl Segment {
	/// Wraps a fresh or recycled block in an empty, owned segment.
	pub(crate) fn fresh(block: Arc<Block>) -> Self {
		Self {
			block,
			pos: 0,
			limit: 0,
			owner: true,
			shared: false,
		}
	}

	/// Returns the number of readable bytes.
	pub(crate) fn len(&self) -> usize { self.limit - self.pos }
	/// Returns the read position, from `[0,SIZE]`.
	pub(crate) fn pos(&self) -> usize { self.pos }
	/// Returns the write limit, from `[0,SIZE]`.
	pub(crate) fn limit(&self) -> usize { self.limit }
	/// Returns the number of bytes that can be appended without compacting.
	pub(crate) fn trailing_space(&self) -> usize { SIZE - self.limit }

	/// Returns `true` if the segment is empty.
	pub(crate) fn is_empty(&self) -> bool { self.len() == 0 }

	/// Returns `true` if the segment may be written to: it owns its block, is
	/// not a shared view, and no shared view of its block is alive.
	pub(crate) fn is_writable(&self) -> bool {
		self.owner && !self.shared && Arc::strong_count(&self.block) == 1
	}

	/// Returns a slice of the readable bytes.
	pub(crate) fn data(&self) -> &[u8] {
		&self.block[self.pos..self.limit]
	}

	/// Consumes `n` readable bytes from the front.
	pub(crate) fn consume(&mut self, n: usize) {
		debug_assert!(n <= self.len());
		self.pos += n;
	}

	/// Truncates the readable range to at most `len` bytes.
	pub(crate) fn truncate(&mut self, len: usize) {
		self.limit = min(self.limit, self.pos + len);
	}

	/// Appends bytes to the block, returning the number written. The segment
	/// must be writable.
	pub(crate) fn push_slice(&mut self, bytes: &[u8]) -> usize {
		let n = min(self.trailing_space(), bytes.len());
		if n > 0 {
			let limit = self.limit;
			self.block_mut()[limit..limit + n].copy_from_slice(&bytes[..n]);
			self.limit += n;
		}
		n
	}

	/// Pops readable bytes into a slice, returning the number read.
	pub(crate) fn pop_into_slice(&mut self, bytes: &mut [u8]) -> usize {
		let n = min(self.len(), bytes.len());
		if n > 0 {
			bytes[..n].copy_from_slice(&self.data()[..n]);
			self.pos += n;
		}
		n
	}

	/// Returns the uninitialized tail of the block for direct writes. The
	/// caller reports the written count with [`add`](Self::add).
	pub(crate) fn tail_mut(&mut self) -> &mut [u8] {
		let limit = self.limit;
		&mut self.block_mut()[limit..]
	}

	/// Adds `n` bytes written through [`tail_mut`](Self::tail_mut).
	pub(crate) fn add(&mut self, n: usize) {
		debug_assert!(n <= self.trailing_space());
		self.limit += n;
	}

	/// Shifts the readable bytes back so `pos` is 0, freeing trailing space.
	/// The segment must be writable.
	pub(crate) fn compact(&mut self) {
		if self.pos == 0 { return }
		let (pos, limit) = (self.pos, self.limit);
		self.block_mut().copy_within(pos..limit, 0);
		self.pos = 0;
		self.limit = limit - pos;
	}

	/// Returns a read-only view of the first `byte_count` readable bytes,
	/// sharing the block without copying.
	pub(crate) fn share(&self, byte_count: usize) -> Self {
		debug_assert!(byte_count <= self.len());
		Self {
			block: self.block.clone(),
			pos: self.pos,
			limit: self.pos + byte_count,
			owner: false,
			shared: true,
		}
	}

	/// Returns a read-only view of all readable bytes.
	pub(crate) fn share_all(&self) -> Self { self.share(self.len()) }

	/// Splits off a prefix of `at` bytes, consuming them from this segment.
	/// Prefixes under [`SHARE_MINIMUM`] are copied into a fresh pooled
	/// segment; larger prefixes share the block.
	pub(crate) fn split(&mut self, at: usize) -> Self {
		debug_assert!(at <= self.len());
		let prefix = if at >= SHARE_MINIMUM {
			self.share(at)
		} else {
			let mut seg = pool::take();
			seg.push_slice(&self.data()[..at]);
			seg
		};
		self.pos += at;
		prefix
	}

	/// Moves `byte_count` readable bytes to the end of `sink`, compacting the
	/// sink first when the bytes only fit compacted. Returns `false` when the
	/// sink cannot take them in place; the caller moves this segment whole
	/// instead.
	pub(crate) fn write_to(&mut self, sink: &mut Self, byte_count: usize) -> bool {
		debug_assert!(byte_count <= self.len());
		if !sink.is_writable() { return false }
		if byte_count > sink.trailing_space() {
			if byte_count > SIZE - sink.len() { return false }
			sink.compact();
		}
		let n = sink.push_slice(&self.data()[..byte_count]);
		debug_assert_eq!(n, byte_count);
		self.pos += n;
		true
	}

	/// Resets the segment for pooling. The block must be uniquely referenced.
	pub(crate) fn into_block(self) -> Option<Arc<Block>> {
		if self.owner && !self.shared && Arc::strong_count(&self.block) == 1 {
			Some(self.block)
		} else {
			None
		}
	}

	fn block_mut(&mut self) -> &mut Block {
		debug_assert!(self.owner && !self.shared);
		Arc::get_mut(&mut self.block)
			.expect("writable segment block must be uniquely referenced")
	}
}

impl fmt::Debug for Segment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Segment")
		 .field("pos", &self.pos)
		 .field("limit", &self.limit)
		 .field("owner", &self.owner)
		 .field("shared", &self.shared)
		 .finish()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn push_pop() {
		let mut seg = pool::take();
		assert_eq!(seg.push_slice(b"Hello World!"), 12);
		assert_eq!(seg.len(), 12);

		let mut word = [0; 5];
		assert_eq!(seg.pop_into_slice(&mut word), 5);
		assert_eq!(&word, b"Hello");
		seg.consume(1);
		assert_eq!(seg.data(), b"World!");
	}

	#[test]
	fn share_blocks_writes() {
		let mut seg = pool::take();
		seg.push_slice(b"abc");
		let view = seg.share_all();
		assert!(!seg.is_writable(), "segment with a live view is read-only");
		assert_eq!(view.data(), b"abc");
		drop(view);
		assert!(seg.is_writable(), "writability returns when the view drops");
	}

	#[test]
	fn split_small_copies() {
		let mut seg = pool::take();
		seg.push_slice(b"abcdef");
		let prefix = seg.split(2);
		assert_eq!(prefix.data(), b"ab");
		assert_eq!(seg.data(), b"cdef");
		// Small prefixes are copies, so the source stays writable.
		assert!(seg.is_writable());
	}

	#[test]
	fn split_large_shares() {
		let mut seg = pool::take();
		let data = vec![0x2a; SHARE_MINIMUM + 16];
		seg.push_slice(&data);
		let prefix = seg.split(SHARE_MINIMUM);
		assert_eq!(prefix.len(), SHARE_MINIMUM);
		assert_eq!(seg.len(), 16);
		assert!(prefix.shared);
		assert!(!seg.is_writable(), "shared block pins the source");
	}

	#[test]
	fn split_bounds() {
		let mut seg = pool::take();
		seg.push_slice(b"xyz");
		let empty = seg.split(0);
		assert!(empty.is_empty());
		assert_eq!(seg.len(), 3);

		let whole = seg.split(3);
		assert_eq!(whole.data(), b"xyz");
		assert!(seg.is_empty());
	}

	#[test]
	fn write_to_compacts() {
		let mut sink = pool::take();
		let fill = vec![1; SIZE - 4];
		sink.push_slice(&fill);
		sink.consume(SIZE - 8);
		// 4 readable bytes at the end of the block: room for 8 more only
		// after compacting.
		let mut src = pool::take();
		src.push_slice(b"abcdefgh");
		assert!(src.write_to(&mut sink, 8));
		assert_eq!(sink.pos(), 0);
		assert_eq!(sink.len(), 12);
		assert!(src.is_empty());
	}

	#[test]
	fn write_to_rejects_overflow() {
		let mut sink = pool::take();
		let fill = vec![1; SIZE - 2];
		sink.push_slice(&fill);
		let mut src = pool::take();
		src.push_slice(b"abcd");
		assert!(!src.write_to(&mut sink, 4));
		assert_eq!(src.len(), 4, "bytes stay put when the sink has no room");
	}
}

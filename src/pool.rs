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

//! The segment allocator: a per-thread free list for the hot path, with a
//! bounded global overflow shared between threads. Claiming never fails, and
//! recycling never fails; blocks beyond both caps are dropped for the
//! allocator to reclaim. Shared or still-referenced blocks are never pooled.

use std::cell::RefCell;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::segment::{Block, Segment, SIZE};

/// Bytes of recycled segments each thread keeps to itself.
const LOCAL_LIMIT: usize = 64 * 1024;
/// Bytes of recycled segments the global overflow absorbs.
const GLOBAL_LIMIT: usize = 256 * 1024;

const LOCAL_BLOCKS: usize = LOCAL_LIMIT / SIZE;
const GLOBAL_BLOCKS: usize = GLOBAL_LIMIT / SIZE;

thread_local! {
	static LOCAL: RefCell<Vec<Arc<Block>>> = RefCell::new(Vec::new());
}

static GLOBAL: Lazy<Mutex<Vec<Arc<Block>>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Claims an empty, owned segment: first from the current thread's free list,
/// then from the global overflow, then freshly allocated.
pub(crate) fn take() -> Segment {
	let block = LOCAL
		.with(|slot| slot.borrow_mut().pop())
		.or_else(take_global)
		.unwrap_or_else(|| {
			log::trace!("pool: allocating a fresh block");
			Arc::new([0; SIZE])
		});
	Segment::fresh(block)
}

/// Recycles a consumed segment. Segments whose block is shared or otherwise
/// still referenced are dropped instead; the block outlives them through the
/// remaining references.
pub(crate) fn recycle(segment: Segment) {
	let Some(block) = segment.into_block() else { return };

	let overflow = LOCAL.with(|slot| {
		let mut slot = slot.borrow_mut();
		if slot.len() < LOCAL_BLOCKS {
			slot.push(block);
			None
		} else {
			Some(block)
		}
	});

	if let Some(block) = overflow {
		let mut global = GLOBAL.lock().unwrap_or_else(|e| e.into_inner());
		if global.len() < GLOBAL_BLOCKS {
			global.push(block);
		} else {
			log::trace!("pool: dropping a block past the global cap");
		}
	}
}

fn take_global() -> Option<Arc<Block>> {
	GLOBAL.lock().unwrap_or_else(|e| e.into_inner()).pop()
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn recycled_block_is_reused() {
		let mut seg = take();
		seg.push_slice(b"junk");
		let ptr = seg.data().as_ptr() as usize;
		recycle(seg);

		let seg = take();
		assert_eq!(seg.len(), 0, "recycled segments come back empty");
		assert_eq!(
			seg.data().as_ptr() as usize, ptr,
			"the most recently recycled block is claimed first",
		);
	}

	#[test]
	fn shared_segment_is_not_pooled() {
		let mut seg = take();
		seg.push_slice(b"abc");
		let view = seg.share_all();
		assert!(view.into_block().is_none(), "a view never yields its block");
		assert!(seg.into_block().is_some(), "the owner yields once views drop");
	}
}

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

//! ## How it works
//!
//! Data is written to and read from reusable chunks of memory called *segments*.
//! When a segment is consumed, it's returned to a *pool*. To write data, segments
//! are claimed from this pool. Each thread keeps a small free list of its own;
//! overflow spills into a bounded global list, and anything beyond that is simply
//! dropped for the allocator to reclaim.
//!
//! ### Segments
//!
//! A [`Buffer`] arranges segments in a deque, reading from the front and writing
//! to the back, claiming new segments from the pool as it fills. Memory within
//! segments can either be owned by or shared between segments, avoiding expensive
//! mem-copy operations as much as possible. Shared memory is read-only; it can be
//! observed by multiple segments at once, and its backing block is only returned
//! to the pool once the last reference drops. Small amounts of data under a set
//! threshold (1024B) are copied rather than shared, as a tradeoff between memory
//! allocation performance and speed.
//!
//! ### Streams
//!
//! [`Source`] and [`Sink`] are the minimal byte-stream contracts: "read up to
//! *n* bytes into a buffer" and "write *n* bytes from a buffer".
//! [`BufferedSource`] and [`BufferedSink`] layer an owned buffer over them,
//! reading on demand and coalescing writes into whole segments. Read-ahead and
//! write-behind variants run a pump on a background thread, gated by a bounded
//! byte count for backpressure.
//!
//! ### Cancellation
//!
//! Blocking operations run inside *cancel scopes*: a thread-local stack of
//! tokens carrying deadlines, timeouts and a cancelled flag. A single shared
//! watchdog thread fires user-supplied actions when a scheduled deadline
//! elapses, typically closing the underlying transport out from under the
//! blocked operation.

mod buffer;
mod buffered_wrappers;
pub mod cancel;
mod byte_str;
mod error;
mod pool;
mod segment;
mod std_io;
pub mod streams;

pub use buffer::*;
pub use buffered_wrappers::*;
pub use byte_str::*;
pub use error::*;
pub use segment::SIZE as SEGMENT_SIZE;
pub use std_io::*;
pub use streams::{BufSink, BufSource, BufStream, Sink, SinkExt, Source, SourceExt};

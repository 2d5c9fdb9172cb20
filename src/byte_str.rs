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

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use base64::Engine;
use base64::prelude::{BASE64_STANDARD_NO_PAD, BASE64_URL_SAFE_NO_PAD};
use simdutf8::compat::from_utf8;

use crate::error::Result;

/// An immutable, cheaply cloneable string of bytes, as produced by
/// [`Buffer::snapshot`](crate::Buffer::snapshot) and the exact-length
/// byte-string reads.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ByteString {
	data: Arc<[u8]>,
}

impl ByteString {
	/// Creates an empty byte string.
	pub fn empty() -> Self { Self::default() }

	/// Returns the length in bytes.
	pub fn len(&self) -> usize { self.data.len() }

	/// Returns `true` if the byte string is empty.
	pub fn is_empty(&self) -> bool { self.data.is_empty() }

	/// Returns the bytes as a slice.
	pub fn as_slice(&self) -> &[u8] { &self.data }

	/// Copies the bytes into a vector.
	pub fn to_vec(&self) -> Vec<u8> { self.data.to_vec() }

	/// Decodes the bytes as UTF-8.
	pub fn utf8(&self) -> Result<&str> {
		Ok(from_utf8(&self.data)?)
	}

	/// Encodes the bytes as a lowercase hex string.
	pub fn hex_lower(&self) -> String {
		base16ct::lower::encode_string(&self.data)
	}

	/// Encodes the bytes as an uppercase hex string.
	pub fn hex_upper(&self) -> String {
		base16ct::upper::encode_string(&self.data)
	}

	/// Encodes the bytes as unpadded Base64.
	pub fn base64(&self) -> String {
		BASE64_STANDARD_NO_PAD.encode(&self.data)
	}

	/// Encodes the bytes as unpadded, URL-safe Base64.
	pub fn base64_url(&self) -> String {
		BASE64_URL_SAFE_NO_PAD.encode(&self.data)
	}
}

impl Default for ByteString {
	fn default() -> Self {
		Self { data: Arc::from(&[][..]) }
	}
}

impl Deref for ByteString {
	type Target = [u8];
	fn deref(&self) -> &[u8] { &self.data }
}

impl AsRef<[u8]> for ByteString {
	fn as_ref(&self) -> &[u8] { &self.data }
}

impl From<Vec<u8>> for ByteString {
	fn from(value: Vec<u8>) -> Self {
		Self { data: value.into() }
	}
}

impl From<&[u8]> for ByteString {
	fn from(value: &[u8]) -> Self {
		Self { data: value.into() }
	}
}

impl<const N: usize> From<[u8; N]> for ByteString {
	fn from(value: [u8; N]) -> Self {
		value.as_slice().into()
	}
}

impl From<&str> for ByteString {
	fn from(value: &str) -> Self {
		value.as_bytes().into()
	}
}

impl PartialEq<[u8]> for ByteString {
	fn eq(&self, other: &[u8]) -> bool {
		*self.data == *other
	}
}

impl PartialEq<&[u8]> for ByteString {
	fn eq(&self, other: &&[u8]) -> bool {
		*self.data == **other
	}
}

impl fmt::Debug for ByteString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ByteString[{}: {}]", self.len(), self.hex_lower())
	}
}

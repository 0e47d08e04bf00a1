// Copyright 2024 Saptak Santra
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

//! Generational identifiers.
//!
//! A [`GenerationId`] packs a valid bit, a 31-bit slot index and a 32-bit
//! generation into a single `u64`:
//!
//! ```text
//! | valid (1) | index (31) | generation (32) |
//! ```
//!
//! Two ids are equal only when both index and generation match. Once the
//! World bumps the generation of a slot, every copy of the old id stays
//! permanently unequal to the new one and is treated as dangling.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

const VALID_BIT: u64 = 1 << 63;
const INDEX_SHIFT: u32 = 32;
const INDEX_MASK: u64 = 0x7FFF_FFFF;
const GENERATION_MASK: u64 = 0xFFFF_FFFF;

/// Largest slot index a [`GenerationId`] can address.
pub const MAX_INDEX: u32 = INDEX_MASK as u32;

/// Packed (valid, index, generation) identity.
#[derive(Clone, Copy, Default, Serialize, Deserialize)]
pub struct GenerationId(u64);

/// Entities are plain generational ids.
pub type Entity = GenerationId;

impl GenerationId {
    /// Build a valid id. `index` is truncated to 31 bits.
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(VALID_BIT | ((index as u64 & INDEX_MASK) << INDEX_SHIFT) | generation as u64)
    }

    /// The invalid id. Equal to `GenerationId::default()`.
    #[inline]
    pub const fn invalid() -> Self {
        Self(0)
    }

    #[inline]
    pub const fn index(self) -> u32 {
        ((self.0 >> INDEX_SHIFT) & INDEX_MASK) as u32
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        (self.0 & GENERATION_MASK) as u32
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 & VALID_BIT != 0
    }

    /// Same index, next generation. Wraps at `u32::MAX`.
    #[inline]
    pub const fn next_generation(self) -> Self {
        Self::new(self.index(), self.generation().wrapping_add(1))
    }

    #[inline]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[inline]
    fn key(self) -> (u32, u32) {
        (self.index(), self.generation())
    }
}

impl PartialEq for GenerationId {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for GenerationId {}

impl Hash for GenerationId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for GenerationId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GenerationId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Debug for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}v{}", self.index(), self.generation())
        } else {
            write!(f, "invalid({}v{})", self.index(), self.generation())
        }
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A [`GenerationId`] cell that can be read and written from any thread.
#[derive(Default)]
pub struct AtomicGenerationId(AtomicU64);

impl AtomicGenerationId {
    pub const fn new(id: GenerationId) -> Self {
        Self(AtomicU64::new(id.0))
    }

    #[inline]
    pub fn load(&self) -> GenerationId {
        GenerationId(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, id: GenerationId) {
        self.0.store(id.0, Ordering::Release);
    }

    /// Replace the stored id, returning the previous one.
    #[inline]
    pub fn swap(&self, id: GenerationId) -> GenerationId {
        GenerationId(self.0.swap(id.0, Ordering::AcqRel))
    }
}

impl fmt::Debug for AtomicGenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicGenerationId").field(&self.load()).finish()
    }
}

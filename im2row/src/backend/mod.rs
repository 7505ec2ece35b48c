/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Numeric backend capability.
//!
//! The im2row engine never touches numbers itself. It asks a
//! [`Backend`] for buffers ([`Vector`]) and for a compiled form of a
//! gather table ([`Mapper`]), and it keys its mapper cache by the
//! backend's [`BackendId`]. Vectors and mappers carry the id of the
//! backend that produced them, and mixing backends is reported as
//! [`Im2RowError::BackendMismatch`].
//!
//! [`cpu`] provides the host-memory implementation.

use std::fmt;
use std::fmt::Debug;
use std::ops::AddAssign;
use std::ops::Range;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::error::Im2RowError;
use crate::table::GatherIndexTable;

pub mod cpu;

/// Identity of a backend instance.
///
/// Ids are handed out from a process-wide counter, so two backends
/// compare equal only if one was cloned from the other.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendId(u64);

impl BackendId {
    /// Returns an id distinct from every id returned before.
    pub fn unique() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "backend#{}", self.0)
    }
}

/// Numeric element type stored in backend vectors.
pub trait Element: Copy + Default + AddAssign + PartialEq + Debug + Send + Sync + 'static {}

impl<T> Element for T where
    T: Copy + Default + AddAssign + PartialEq + Debug + Send + Sync + 'static
{
}

/// A one-dimensional numeric buffer owned by a backend.
pub trait Vector: Send + Sync + 'static {
    type Elem: Element;

    /// A borrowed contiguous sub-range of the vector.
    type Slice<'a>: Copy
    where
        Self: 'a;

    /// The backend that allocated this vector.
    fn backend_id(&self) -> BackendId;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrows `range` without copying.
    fn slice(&self, range: Range<usize>) -> Result<Self::Slice<'_>, Im2RowError>;
}

/// Convenience alias for the slice type of a backend's vectors.
pub type SliceOf<'a, V> = <V as Vector>::Slice<'a>;

/// A gather table compiled for one backend.
pub trait Mapper: Send + Sync + 'static {
    type Vector: Vector;

    /// The backend this mapper was compiled for.
    fn backend_id(&self) -> BackendId;

    /// Length of the source tensor.
    fn in_len(&self) -> usize;

    /// Length of the gathered output.
    fn out_len(&self) -> usize;

    /// Writes `dst[i] = src[table[i]]` for every table entry.
    fn map(&self, src: SliceOf<'_, Self::Vector>, dst: &mut Self::Vector)
    -> Result<(), Im2RowError>;

    /// The adjoint of [`Mapper::map`]: `dst[table[i]] += src[i]` for
    /// every table entry. Overlapping windows accumulate.
    fn map_transpose(&self, src: &Self::Vector, dst: &mut Self::Vector)
    -> Result<(), Im2RowError>;
}

/// A numeric execution context that owns vectors and mappers.
pub trait Backend: Send + Sync {
    type Elem: Element;
    type Vector: Vector<Elem = Self::Elem>;
    type Mapper: Mapper<Vector = Self::Vector>;

    fn id(&self) -> BackendId;

    /// Allocates a zeroed vector of `len` elements.
    fn make_vector(&self, len: usize) -> Self::Vector;

    /// Compiles `table` into a mapper over sources of `in_len`
    /// elements. Offsets outside the source are rejected.
    fn make_mapper(
        &self,
        in_len: usize,
        table: &GatherIndexTable,
    ) -> Result<Self::Mapper, Im2RowError>;
}

/// Fails unless `got` is `expected`.
pub(crate) fn check_backend(expected: BackendId, got: BackendId) -> Result<(), Im2RowError> {
    if expected == got {
        Ok(())
    } else {
        Err(Im2RowError::BackendMismatch { expected, got })
    }
}

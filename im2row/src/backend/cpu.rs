/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Host-memory backend.

use std::marker::PhantomData;
use std::ops::Range;

use crate::backend::Backend;
use crate::backend::BackendId;
use crate::backend::Element;
use crate::backend::Mapper;
use crate::backend::Vector;
use crate::backend::check_backend;
use crate::error::Im2RowError;
use crate::table::GatherIndexTable;

/// A backend storing `T` values in ordinary heap memory.
///
/// Every call to [`CpuBackend::new`] creates a distinct backend;
/// clones share its identity.
#[derive(Clone, Debug)]
pub struct CpuBackend<T> {
    id: BackendId,
    _elem: PhantomData<fn() -> T>,
}

impl<T: Element> CpuBackend<T> {
    pub fn new() -> Self {
        Self {
            id: BackendId::unique(),
            _elem: PhantomData,
        }
    }

    /// Wraps `data` in a vector owned by this backend.
    pub fn vector_from(&self, data: Vec<T>) -> CpuVector<T> {
        CpuVector {
            backend: self.id,
            data,
        }
    }
}

impl<T: Element> Default for CpuBackend<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element> Backend for CpuBackend<T> {
    type Elem = T;
    type Vector = CpuVector<T>;
    type Mapper = CpuMapper<T>;

    fn id(&self) -> BackendId {
        self.id
    }

    fn make_vector(&self, len: usize) -> CpuVector<T> {
        self.vector_from(vec![T::default(); len])
    }

    fn make_mapper(
        &self,
        in_len: usize,
        table: &GatherIndexTable,
    ) -> Result<CpuMapper<T>, Im2RowError> {
        if let Some(&index) = table.offsets().iter().find(|&&index| index >= in_len) {
            return Err(Im2RowError::IndexOutOfRange { index, len: in_len });
        }
        Ok(CpuMapper {
            backend: self.id,
            in_len,
            indices: table.offsets().to_vec(),
            _elem: PhantomData,
        })
    }
}

/// A heap vector tagged with the backend that created it.
#[derive(Clone, Debug, PartialEq)]
pub struct CpuVector<T> {
    backend: BackendId,
    data: Vec<T>,
}

impl<T: Element> CpuVector<T> {
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

/// A borrowed run of a [`CpuVector`].
#[derive(Clone, Copy, Debug)]
pub struct CpuSlice<'a, T> {
    backend: BackendId,
    data: &'a [T],
}

impl<'a, T> CpuSlice<'a, T> {
    pub fn backend_id(&self) -> BackendId {
        self.backend
    }

    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }
}

impl<T: Element> Vector for CpuVector<T> {
    type Elem = T;
    type Slice<'a>
        = CpuSlice<'a, T>
    where
        Self: 'a;

    fn backend_id(&self) -> BackendId {
        self.backend
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn slice(&self, range: Range<usize>) -> Result<CpuSlice<'_, T>, Im2RowError> {
        let Range { start, end } = range;
        match self.data.get(start..end) {
            Some(data) => Ok(CpuSlice {
                backend: self.backend,
                data,
            }),
            None => Err(Im2RowError::SliceOutOfRange {
                start,
                end,
                len: self.data.len(),
            }),
        }
    }
}

/// A gather table resolved to host indices.
#[derive(Debug)]
pub struct CpuMapper<T> {
    backend: BackendId,
    in_len: usize,
    indices: Vec<usize>,
    _elem: PhantomData<fn() -> T>,
}

fn check_len(expected: usize, got: usize) -> Result<(), Im2RowError> {
    if expected == got {
        Ok(())
    } else {
        Err(Im2RowError::LengthMismatch { expected, got })
    }
}

impl<T: Element> Mapper for CpuMapper<T> {
    type Vector = CpuVector<T>;

    fn backend_id(&self) -> BackendId {
        self.backend
    }

    fn in_len(&self) -> usize {
        self.in_len
    }

    fn out_len(&self) -> usize {
        self.indices.len()
    }

    fn map(&self, src: CpuSlice<'_, T>, dst: &mut CpuVector<T>) -> Result<(), Im2RowError> {
        check_backend(self.backend, src.backend)?;
        check_backend(self.backend, dst.backend)?;
        check_len(self.in_len, src.data.len())?;
        check_len(self.indices.len(), dst.data.len())?;

        // Indices were bounds checked against `in_len` in `make_mapper`.
        for (out, &index) in dst.data.iter_mut().zip(&self.indices) {
            *out = src.data[index];
        }
        Ok(())
    }

    fn map_transpose(
        &self,
        src: &CpuVector<T>,
        dst: &mut CpuVector<T>,
    ) -> Result<(), Im2RowError> {
        check_backend(self.backend, src.backend)?;
        check_backend(self.backend, dst.backend)?;
        check_len(self.indices.len(), src.data.len())?;
        check_len(self.in_len, dst.data.len())?;

        for (&value, &index) in src.data.iter().zip(&self.indices) {
            dst.data[index] += value;
        }
        Ok(())
    }
}

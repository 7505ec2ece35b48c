/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::ops::Deref;

use crate::backend::Backend;
use crate::backend::Element;
use crate::backend::Vector;
use crate::backend::cpu::CpuVector;
use crate::window::WindowSpec;

/// A row-major matrix stored in a backend vector.
///
/// Row `r` holds the input components under window placement `r`.
#[derive(Clone, Debug, PartialEq)]
pub struct RowMatrix<V> {
    data: V,
    rows: usize,
    cols: usize,
}

impl<V: Vector> RowMatrix<V> {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn data(&self) -> &V {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut V {
        &mut self.data
    }

    pub fn into_data(self) -> V {
        self.data
    }
}

impl<T: Element> RowMatrix<CpuVector<T>> {
    /// Row `row`, or `None` past the last row.
    pub fn row(&self, row: usize) -> Option<&[T]> {
        if row >= self.rows {
            return None;
        }
        let start = row * self.cols;
        self.data.as_slice().get(start..start + self.cols)
    }

    /// Mutable row `row`, or `None` past the last row.
    pub fn row_mut(&mut self, row: usize) -> Option<&mut [T]> {
        if row >= self.rows {
            return None;
        }
        let start = row * self.cols;
        self.data.as_mut_slice().get_mut(start..start + self.cols)
    }

    /// Iterates over the rows in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        // Window volume is never zero.
        self.data.as_slice().chunks_exact(self.cols).take(self.rows)
    }

    /// All cells in row-major order.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.data.as_mut_slice()
    }
}

/// A [`RowMatrix`] lent out for one step of a batch pass.
///
/// Dereferences to the matrix for reading. Cells may be changed in
/// place, but the storage and shape cannot be replaced, so the next
/// sample is always mapped into a matrix of the expected shape.
#[derive(Debug)]
pub struct RowMatrixMut<'a, V> {
    matrix: &'a mut RowMatrix<V>,
}

impl<'a, V> RowMatrixMut<'a, V> {
    pub(crate) fn new(matrix: &'a mut RowMatrix<V>) -> Self {
        Self { matrix }
    }
}

impl<V> Deref for RowMatrixMut<'_, V> {
    type Target = RowMatrix<V>;

    fn deref(&self) -> &RowMatrix<V> {
        self.matrix
    }
}

impl<T: Element> RowMatrixMut<'_, CpuVector<T>> {
    /// See [`RowMatrix::row_mut`].
    pub fn row_mut(&mut self, row: usize) -> Option<&mut [T]> {
        self.matrix.row_mut(row)
    }

    /// See [`RowMatrix::as_mut_slice`].
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.matrix.as_mut_slice()
    }
}

/// Allocates a row matrix shaped for `spec` from `backend`.
pub fn make_output<B: Backend>(backend: &B, spec: &WindowSpec) -> RowMatrix<B::Vector> {
    let rows = spec.num_placements();
    let cols = spec.window_volume();
    RowMatrix {
        data: backend.make_vector(rows * cols),
        rows,
        cols,
    }
}

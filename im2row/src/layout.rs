/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Affine description of the im2row gather.
//!
//! Every entry of the row matrix is addressed by a five-dimensional
//! coordinate `(py, px, sub_y, sub_x, sub_z)`: the vertical and
//! horizontal placement index, then the position inside the window
//! and the channel. The source offset of that entry is affine in the
//! coordinate:
//!
//! ```text
//! offset = py·(stride_y·W·D) + px·(stride_x·D) + sub_y·(W·D) + sub_x·D + sub_z
//!        = ((py·stride_y + sub_y)·W + px·stride_x + sub_x)·D + sub_z
//! ```
//!
//! Walking the coordinates in row-major order therefore produces the
//! gather table in exactly the order the row matrix is laid out.

use crate::error::Im2RowError;
use crate::window::WindowSpec;

mod sealed {
    // Private trait; only types in this crate can implement it.
    pub trait Sealed {}
}

/// A map from integer coordinates to linear offsets of the form
/// `f(x) = dot(strides, x)`.
pub trait AffineMap: sealed::Sealed {
    /// The number of dimensions in the domain of the map.
    fn rank(&self) -> usize;

    /// The shape of the domain.
    fn sizes(&self) -> &[usize];

    /// Maps a coordinate to a linear offset.
    fn offset_of(&self, coord: &[usize]) -> Result<usize, Im2RowError>;
}

const RANK: usize = 5;

/// The five-dimensional affine layout of one [`WindowSpec`]'s
/// gather.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchLayout {
    sizes: [usize; RANK],
    strides: [usize; RANK],
}

impl PatchLayout {
    pub fn new(spec: &WindowSpec) -> Self {
        let input = spec.input();
        let row = input.width * input.depth;
        Self {
            sizes: [
                spec.num_y(),
                spec.num_x(),
                spec.window_height(),
                spec.window_width(),
                input.depth,
            ],
            strides: [
                spec.stride_y() * row,
                spec.stride_x() * input.depth,
                row,
                input.depth,
                1,
            ],
        }
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Number of coordinates in the domain.
    pub fn len(&self) -> usize {
        self.sizes.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All offsets in row-major coordinate order.
    pub fn offsets(&self) -> Offsets {
        Offsets {
            sizes: self.sizes,
            strides: self.strides,
            coord: [0; RANK],
            offset: 0,
            remaining: self.len(),
        }
    }
}

impl sealed::Sealed for PatchLayout {}

impl AffineMap for PatchLayout {
    fn rank(&self) -> usize {
        RANK
    }

    fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    fn offset_of(&self, coord: &[usize]) -> Result<usize, Im2RowError> {
        if coord.len() != RANK {
            return Err(Im2RowError::LengthMismatch {
                expected: RANK,
                got: coord.len(),
            });
        }
        for (&index, &len) in coord.iter().zip(&self.sizes) {
            if index >= len {
                return Err(Im2RowError::IndexOutOfRange { index, len });
            }
        }

        // Dot product ∑ᵢ (strideᵢ × coordᵢ)
        Ok(self
            .strides
            .iter()
            .zip(coord)
            .map(|(s, i)| s * i)
            .sum::<usize>())
    }
}

/// Row-major iterator over the offsets of a [`PatchLayout`].
///
/// Offsets are maintained incrementally: advancing one dimension adds
/// its stride, and wrapping it back to zero subtracts the distance it
/// travelled. The running offset never exceeds the largest offset of
/// the layout.
#[derive(Clone, Debug)]
pub struct Offsets {
    sizes: [usize; RANK],
    strides: [usize; RANK],
    coord: [usize; RANK],
    offset: usize,
    remaining: usize,
}

impl Iterator for Offsets {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.offset;
        self.remaining -= 1;
        if self.remaining > 0 {
            for dim in (0..RANK).rev() {
                if self.coord[dim] + 1 < self.sizes[dim] {
                    self.coord[dim] += 1;
                    self.offset += self.strides[dim];
                    break;
                }
                self.offset -= self.strides[dim] * self.coord[dim];
                self.coord[dim] = 0;
            }
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Offsets {}

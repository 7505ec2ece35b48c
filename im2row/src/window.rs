/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Sliding-window geometry.
//!
//! A [`WindowSpec`] describes a window of `window_width` by
//! `window_height` slid over a channel-innermost input tensor of
//! `input_width × input_height × input_depth` with strides `stride_x`
//! and `stride_y`. Every placement of the window becomes one row of
//! the row matrix produced by [`crate::Im2Row`]:
//!
//! ```text
//! input (4 × 4, depth 1), window 2 × 2, stride 2
//!
//!   +----+----+----+----+
//!   |  0 |  1 |  2 |  3 |      row 0: [0, 1, 4, 5]
//!   |  4 |  5 |  6 |  7 |      row 1: [2, 3, 6, 7]
//!   +----+----+----+----+      row 2: [8, 9, 12, 13]
//!   |  8 |  9 | 10 | 11 |      row 3: [10, 11, 14, 15]
//!   | 12 | 13 | 14 | 15 |
//!   +----+----+----+----+
//! ```
//!
//! Windows larger than the input are accepted and have zero
//! placements along the offending axis.

use serde::Deserialize;
use serde::Serialize;

use crate::error::Im2RowError;

/// Extents of a channel-innermost tensor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dims {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl Dims {
    /// Total number of components.
    pub fn len(&self) -> usize {
        self.width * self.height * self.depth
    }

    /// Whether any extent is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable description of a sliding window over an input tensor.
///
/// All fields are positive; this is checked by [`WindowSpec::new`]
/// and on deserialization.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawWindowSpec")]
pub struct WindowSpec {
    window_width: usize,
    window_height: usize,
    stride_x: usize,
    stride_y: usize,
    input_width: usize,
    input_height: usize,
    input_depth: usize,
}

// Unvalidated mirror of `WindowSpec` used as the serde source.
#[derive(Deserialize)]
struct RawWindowSpec {
    window_width: usize,
    window_height: usize,
    stride_x: usize,
    stride_y: usize,
    input_width: usize,
    input_height: usize,
    input_depth: usize,
}

impl TryFrom<RawWindowSpec> for WindowSpec {
    type Error = Im2RowError;

    fn try_from(raw: RawWindowSpec) -> Result<Self, Self::Error> {
        WindowSpec::new(
            Dims {
                width: raw.input_width,
                height: raw.input_height,
                depth: raw.input_depth,
            },
            (raw.window_width, raw.window_height),
            (raw.stride_x, raw.stride_y),
        )
    }
}

fn checked_product(field: &'static str, factors: &[usize]) -> Result<usize, Im2RowError> {
    factors
        .iter()
        .try_fold(1usize, |acc, &factor| acc.checked_mul(factor))
        .ok_or(Im2RowError::Overflow { field })
}

/// Number of window placements along one axis.
fn placements(input: usize, window: usize, stride: usize) -> usize {
    if window > input {
        0
    } else {
        1 + (input - window) / stride
    }
}

impl WindowSpec {
    /// Creates a spec for `window = (width, height)` slid over `input`
    /// with `stride = (x, y)`.
    pub fn new(
        input: Dims,
        window: (usize, usize),
        stride: (usize, usize),
    ) -> Result<Self, Im2RowError> {
        let (window_width, window_height) = window;
        let (stride_x, stride_y) = stride;
        for (field, value) in [
            ("window_width", window_width),
            ("window_height", window_height),
            ("stride_x", stride_x),
            ("stride_y", stride_y),
            ("input_width", input.width),
            ("input_height", input.height),
            ("input_depth", input.depth),
        ] {
            if value == 0 {
                return Err(Im2RowError::ZeroExtent { field });
            }
        }
        let spec = Self {
            window_width,
            window_height,
            stride_x,
            stride_y,
            input_width: input.width,
            input_height: input.height,
            input_depth: input.depth,
        };
        spec.check_sizes()?;
        Ok(spec)
    }

    // Every product computed from the spec (sizes, table length and
    // layout strides) must fit in `usize`.
    fn check_sizes(&self) -> Result<(), Im2RowError> {
        let depth = self.input_depth;
        checked_product("input_size", &[self.input_width, self.input_height, depth])?;
        let volume = checked_product(
            "window_volume",
            &[self.window_width, self.window_height, depth],
        )?;
        checked_product("row_matrix", &[self.num_x(), self.num_y(), volume])?;
        checked_product("stride_x", &[self.stride_x, depth])?;
        checked_product("stride_y", &[self.stride_y, self.input_width, depth])?;
        Ok(())
    }

    pub fn window_width(&self) -> usize {
        self.window_width
    }

    pub fn window_height(&self) -> usize {
        self.window_height
    }

    pub fn stride_x(&self) -> usize {
        self.stride_x
    }

    pub fn stride_y(&self) -> usize {
        self.stride_y
    }

    /// The input tensor extents.
    pub fn input(&self) -> Dims {
        Dims {
            width: self.input_width,
            height: self.input_height,
            depth: self.input_depth,
        }
    }

    /// Number of horizontal window placements. This is also the width
    /// of the output of a convolution or pooling layer over this
    /// window.
    pub fn num_x(&self) -> usize {
        placements(self.input_width, self.window_width, self.stride_x)
    }

    /// Number of vertical window placements. This is also the height
    /// of the output of a convolution or pooling layer over this
    /// window.
    pub fn num_y(&self) -> usize {
        placements(self.input_height, self.window_height, self.stride_y)
    }

    /// Total number of placements, i.e. rows of the row matrix.
    pub fn num_placements(&self) -> usize {
        self.num_x() * self.num_y()
    }

    /// Number of components in one input tensor.
    pub fn input_size(&self) -> usize {
        self.input().len()
    }

    /// Number of components covered by one window, i.e. columns of
    /// the row matrix.
    pub fn window_volume(&self) -> usize {
        self.window_width * self.window_height * self.input_depth
    }

    /// Dimensions of a layer output with `depth` channels per
    /// placement.
    pub fn output_dims(&self, depth: usize) -> Dims {
        Dims {
            width: self.num_x(),
            height: self.num_y(),
            depth,
        }
    }

    /// The input-space `(x, y)` origin of the window for row `row` of
    /// the row matrix, or `None` if there is no such row.
    pub fn placement(&self, row: usize) -> Option<(usize, usize)> {
        let num_x = self.num_x();
        if row >= self.num_placements() {
            return None;
        }
        Some((
            (row % num_x) * self.stride_x,
            (row / num_x) * self.stride_y,
        ))
    }
}

/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use crate::error::Im2RowError;
use crate::layout::PatchLayout;
use crate::window::WindowSpec;

/// Source offsets for every cell of a row matrix, in row-major order.
///
/// Row `r` lists the input components covered by window placement
/// `r` (see [`WindowSpec::placement`]): window rows first, then
/// window columns, then channels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatherIndexTable {
    offsets: Vec<usize>,
    rows: usize,
    cols: usize,
}

impl GatherIndexTable {
    /// Enumerates the gather for `spec`.
    pub fn build(spec: &WindowSpec) -> Self {
        let layout = PatchLayout::new(spec);
        Self {
            offsets: layout.offsets().collect(),
            rows: spec.num_placements(),
            cols: spec.window_volume(),
        }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// The offsets gathered into row `row`.
    pub fn row(&self, row: usize) -> Option<&[usize]> {
        if row >= self.rows {
            return None;
        }
        let start = row * self.cols;
        self.offsets.get(start..start + self.cols)
    }

    /// Checks that the table has one entry per row matrix cell and
    /// that every entry addresses a component of a single input
    /// tensor.
    pub fn verify(&self, spec: &WindowSpec) -> Result<(), Im2RowError> {
        let expected = spec.num_placements() * spec.window_volume();
        if self.offsets.len() != expected || self.rows * self.cols != expected {
            return Err(Im2RowError::LengthMismatch {
                expected,
                got: self.offsets.len(),
            });
        }
        let len = spec.input_size();
        match self.offsets.iter().find(|&&index| index >= len) {
            Some(&index) => Err(Im2RowError::IndexOutOfRange { index, len }),
            None => Ok(()),
        }
    }
}

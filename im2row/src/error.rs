/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use crate::backend::BackendId;

/// Errors produced while building or applying an im2row mapping.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Im2RowError {
    /// A window, stride, or input extent was zero.
    #[error("invalid window spec: {field} must be positive")]
    ZeroExtent { field: &'static str },

    /// A size derived from the window spec does not fit in `usize`.
    #[error("invalid window spec: {field} overflows usize")]
    Overflow { field: &'static str },

    /// The batch does not consist of whole input tensors.
    #[error("input length {len} not divisible by {input_size}")]
    BatchLength { len: usize, input_size: usize },

    /// A vector or mapper was used with a backend it does not belong to.
    #[error("backend mismatch: expected {expected}, got {got}")]
    BackendMismatch { expected: BackendId, got: BackendId },

    /// A buffer has the wrong number of elements for a mapper.
    #[error("length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    /// A gather offset points outside of the source tensor.
    #[error("index {index} out of range {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// A sub-range does not fit in the vector it was taken from.
    #[error("range {start}..{end} out of bounds for length {len}")]
    SliceOutOfRange { start: usize, end: usize, len: usize },
}

/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Reshapes channel-innermost 3-D tensors into row matrices, one row
//! per sliding-window placement.
//!
//! Convolution and pooling layers use [`Im2Row`] to turn their
//! forward pass into a matrix multiply or a row-wise reduction:
//!
//! ```
//! use im2row::CpuBackend;
//! use im2row::Dims;
//! use im2row::Im2Row;
//! use im2row::WindowSpec;
//!
//! let spec = WindowSpec::new(
//!     Dims {
//!         width: 4,
//!         height: 4,
//!         depth: 1,
//!     },
//!     (2, 2),
//!     (2, 2),
//! )?;
//! let im2row = Im2Row::new(spec);
//! let backend = CpuBackend::<f32>::new();
//! let batch = backend.vector_from((0..16).map(|x| x as f32).collect());
//!
//! let mut maxima = Vec::new();
//! im2row.for_each_sample(&backend, &batch, |_, matrix| {
//!     for row in matrix.iter_rows() {
//!         maxima.push(row.iter().copied().fold(f32::MIN, f32::max));
//!     }
//! })?;
//! assert_eq!(maxima, vec![5.0, 7.0, 13.0, 15.0]);
//! # Ok::<(), im2row::Im2RowError>(())
//! ```
//!
//! The gather from input tensor to row matrix is computed once per
//! window geometry as a [`GatherIndexTable`], compiled by a
//! [`Backend`] into a [`Mapper`], and cached for the most recently
//! used backend.

pub mod backend;
mod cache;
pub mod config;
mod error;
mod layout;
mod mapping;
mod output;
mod table;
mod window;

#[cfg(test)]
mod strategy;

pub use backend::Backend;
pub use backend::BackendId;
pub use backend::Element;
pub use backend::Mapper;
pub use backend::SliceOf;
pub use backend::Vector;
pub use backend::cpu::CpuBackend;
pub use backend::cpu::CpuMapper;
pub use backend::cpu::CpuSlice;
pub use backend::cpu::CpuVector;
pub use cache::MapperCache;
pub use error::Im2RowError;
pub use layout::AffineMap;
pub use layout::Offsets;
pub use layout::PatchLayout;
pub use mapping::Im2Row;
pub use output::RowMatrix;
pub use output::RowMatrixMut;
pub use output::make_output;
pub use table::GatherIndexTable;
pub use window::Dims;
pub use window::WindowSpec;

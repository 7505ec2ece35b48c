/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Property-based generators for [`WindowSpec`].
//!
//! The main entry point is [`gen_window_spec`], which generates valid
//! window geometries over small inputs, including windows that do not
//! fit the input at all.
//!
//! ```
//! use proptest::prelude::*;
//!
//! use crate::strategy::gen_window_spec;
//!
//! proptest! {
//!     #[test]
//!     fn test_spec(spec in gen_window_spec(8, 3)) {
//!         // Use `spec` to build tables or mappers.
//!     }
//! }
//! ```
//!
//! This module is only included in test builds (`#[cfg(test)]`).

use proptest::prelude::*;

use crate::window::Dims;
use crate::window::WindowSpec;

/// Generates a `WindowSpec` whose input width and height lie in
/// `1..=max_extent` and whose depth lies in `1..=max_depth`.
///
/// Window extents range up to `max_extent + 2`, so some generated
/// windows are larger than their input and have no placements.
/// Strides range over `1..=3`.
pub fn gen_window_spec(max_extent: usize, max_depth: usize) -> BoxedStrategy<WindowSpec> {
    (
        1..=max_extent,
        1..=max_extent,
        1..=max_depth,
        1..=max_extent + 2,
        1..=max_extent + 2,
        1..=3usize,
        1..=3usize,
    )
        .prop_map(|(width, height, depth, ww, wh, sx, sy)| {
            WindowSpec::new(
                Dims {
                    width,
                    height,
                    depth,
                },
                (ww, wh),
                (sx, sy),
            )
            .unwrap()
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counts window origins along one axis by stepping until the
    // window would cross the input edge.
    fn scan(input: usize, window: usize, stride: usize) -> usize {
        let mut origin = 0;
        let mut count = 0;
        while origin + window <= input {
            count += 1;
            origin += stride;
        }
        count
    }

    proptest! {
        #[test]
        fn placements_match_scan(spec in gen_window_spec(9, 3)) {
            let input = spec.input();
            let num_x = scan(input.width, spec.window_width(), spec.stride_x());
            let num_y = scan(input.height, spec.window_height(), spec.stride_y());
            prop_assert_eq!(spec.num_x(), num_x);
            prop_assert_eq!(spec.num_y(), num_y);
            prop_assert_eq!(spec.num_placements(), num_x * num_y);
        }

        #[test]
        fn oversize_window_has_no_placements(spec in gen_window_spec(6, 2)) {
            let input = spec.input();
            if spec.window_width() > input.width {
                prop_assert_eq!(spec.num_x(), 0);
                prop_assert_eq!(spec.num_placements(), 0);
            }
            if spec.window_height() > input.height {
                prop_assert_eq!(spec.num_y(), 0);
                prop_assert_eq!(spec.num_placements(), 0);
            }
        }

        #[test]
        fn placements_are_row_major(spec in gen_window_spec(7, 1)) {
            let mut expected = Vec::new();
            for y in 0..spec.num_y() {
                for x in 0..spec.num_x() {
                    expected.push((x * spec.stride_x(), y * spec.stride_y()));
                }
            }
            let actual: Vec<_> = (0..spec.num_placements())
                .map(|row| spec.placement(row).unwrap())
                .collect();
            prop_assert_eq!(actual, expected);
            prop_assert_eq!(spec.placement(spec.num_placements()), None);
        }
    }
}

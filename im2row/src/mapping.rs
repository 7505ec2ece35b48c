/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::sync::Arc;

use crate::backend::Backend;
use crate::backend::Mapper;
use crate::backend::Vector;
use crate::backend::check_backend;
use crate::cache::MapperCache;
use crate::config;
use crate::error::Im2RowError;
use crate::output::RowMatrix;
use crate::output::RowMatrixMut;
use crate::output::make_output;
use crate::table::GatherIndexTable;
use crate::window::Dims;
use crate::window::WindowSpec;

/// Maps (possibly overlapping) windows of input tensors to rows of a
/// matrix.
///
/// Row `r` of the produced matrix corresponds to the `r`-th output
/// position of a convolution or pooling layer with the same window,
/// so a layer can run its forward pass as one row-wise reduction or
/// one matrix multiply per input tensor.
///
/// The compiled gather is cached for the most recently used backend.
/// An `Im2Row` can be shared across threads.
#[derive(Debug)]
pub struct Im2Row {
    spec: WindowSpec,
    mappers: MapperCache,
}

impl Im2Row {
    pub fn new(spec: WindowSpec) -> Self {
        Self {
            spec,
            mappers: MapperCache::new(),
        }
    }

    pub fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    /// See [`WindowSpec::num_x`].
    pub fn num_x(&self) -> usize {
        self.spec.num_x()
    }

    /// See [`WindowSpec::num_y`].
    pub fn num_y(&self) -> usize {
        self.spec.num_y()
    }

    /// See [`WindowSpec::input_size`].
    pub fn input_size(&self) -> usize {
        self.spec.input_size()
    }

    /// See [`WindowSpec::output_dims`].
    pub fn output_dims(&self, depth: usize) -> Dims {
        self.spec.output_dims(depth)
    }

    /// Returns the mapper for `backend`, building and caching it on
    /// first use. A mapper cached for a different backend is
    /// replaced.
    pub fn mapper<B: Backend>(&self, backend: &B) -> Result<Arc<B::Mapper>, Im2RowError> {
        let id = backend.id();
        self.mappers.get_or_build(id, || {
            let table = GatherIndexTable::build(&self.spec);
            if config::global::get().verify_tables {
                table.verify(&self.spec)?;
            }
            tracing::debug!(
                backend = %id,
                rows = table.rows(),
                cols = table.cols(),
                entries = table.len(),
                "compiling im2row gather table"
            );
            backend.make_mapper(self.spec.input_size(), &table)
        })
    }

    /// Allocates a row matrix for the output of a mapping.
    pub fn make_out<B: Backend>(&self, backend: &B) -> RowMatrix<B::Vector> {
        make_output(backend, &self.spec)
    }

    /// Maps every input tensor in `batch` to a row matrix and calls
    /// `step(index, matrix)` for each, in order. Returns the number of
    /// tensors mapped.
    ///
    /// One matrix is reused for the whole batch: `step` may read it and
    /// change its cells in place through [`RowMatrixMut`], but the
    /// borrow ends when `step` returns and the next tensor overwrites
    /// it.
    ///
    /// Fails without calling `step` if `batch` belongs to another
    /// backend or is not a whole number of input tensors.
    pub fn for_each_sample<B, F>(
        &self,
        backend: &B,
        batch: &B::Vector,
        mut step: F,
    ) -> Result<usize, Im2RowError>
    where
        B: Backend,
        F: FnMut(usize, RowMatrixMut<'_, B::Vector>),
    {
        self.try_for_each_sample(backend, batch, |index, matrix| {
            step(index, matrix);
            Ok::<(), Im2RowError>(())
        })
    }

    /// Like [`Im2Row::for_each_sample`], but `step` may fail. The
    /// first error stops the pass and is returned.
    pub fn try_for_each_sample<B, F, E>(
        &self,
        backend: &B,
        batch: &B::Vector,
        mut step: F,
    ) -> Result<usize, E>
    where
        B: Backend,
        F: FnMut(usize, RowMatrixMut<'_, B::Vector>) -> Result<(), E>,
        E: From<Im2RowError>,
    {
        let input_size = self.spec.input_size();
        check_backend(backend.id(), batch.backend_id())?;
        if batch.len() % input_size != 0 {
            return Err(Im2RowError::BatchLength {
                len: batch.len(),
                input_size,
            }
            .into());
        }

        let samples = batch.len() / input_size;
        let mapper = self.mapper(backend)?;
        let mut matrix = self.make_out(backend);
        tracing::trace!(samples, input_size, "mapping batch");

        for index in 0..samples {
            let sample = batch.slice(index * input_size..(index + 1) * input_size)?;
            mapper.map(sample, matrix.data_mut())?;
            step(index, RowMatrixMut::new(&mut matrix))?;
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::thread;

    use proptest::prelude::*;

    use super::*;
    use crate::backend::BackendId;
    use crate::backend::cpu::CpuBackend;
    use crate::backend::cpu::CpuMapper;
    use crate::backend::cpu::CpuVector;
    use crate::strategy::gen_window_spec;
    use crate::window::Dims;

    // A host backend that counts mapper compilations.
    #[derive(Default)]
    struct CountingBackend {
        inner: CpuBackend<i64>,
        builds: AtomicUsize,
    }

    impl CountingBackend {
        fn builds(&self) -> usize {
            self.builds.load(Ordering::SeqCst)
        }

        fn vector_from(&self, data: Vec<i64>) -> CpuVector<i64> {
            self.inner.vector_from(data)
        }
    }

    impl Backend for CountingBackend {
        type Elem = i64;
        type Vector = CpuVector<i64>;
        type Mapper = CpuMapper<i64>;

        fn id(&self) -> BackendId {
            self.inner.id()
        }

        fn make_vector(&self, len: usize) -> CpuVector<i64> {
            self.inner.make_vector(len)
        }

        fn make_mapper(
            &self,
            in_len: usize,
            table: &GatherIndexTable,
        ) -> Result<CpuMapper<i64>, Im2RowError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            self.inner.make_mapper(in_len, table)
        }
    }

    fn four_by_four() -> Im2Row {
        Im2Row::new(
            WindowSpec::new(
                Dims {
                    width: 4,
                    height: 4,
                    depth: 1,
                },
                (2, 2),
                (2, 2),
            )
            .unwrap(),
        )
    }

    fn iota(len: usize) -> Vec<i64> {
        (0..len as i64).collect()
    }

    #[test]
    fn test_for_each_sample_in_order() {
        let im2row = four_by_four();
        assert_eq!((im2row.num_x(), im2row.num_y(), im2row.input_size()), (2, 2, 16));
        assert_eq!(
            im2row.output_dims(3),
            Dims {
                width: 2,
                height: 2,
                depth: 3
            }
        );
        let backend = CountingBackend::default();
        let batch = backend.vector_from(iota(48));

        let mut calls = Vec::new();
        let samples = im2row
            .for_each_sample(&backend, &batch, |index, matrix| {
                assert_eq!((matrix.rows(), matrix.cols()), (4, 4));
                calls.push((index, matrix.data().as_slice().to_vec()));
            })
            .unwrap();

        assert_eq!(samples, 3);
        assert_eq!(
            calls.iter().map(|(index, _)| *index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        for (index, data) in &calls {
            let base = 16 * *index as i64;
            let expected: Vec<i64> = [0, 1, 4, 5, 2, 3, 6, 7, 8, 9, 12, 13, 10, 11, 14, 15]
                .iter()
                .map(|offset| base + offset)
                .collect();
            assert_eq!(data, &expected);
        }
        assert_eq!(backend.builds(), 1);
    }

    #[test]
    fn test_bad_batch_length_has_no_side_effects() {
        let im2row = four_by_four();
        let backend = CountingBackend::default();
        let batch = backend.vector_from(iota(40));

        let mut calls = 0;
        let err = im2row
            .for_each_sample(&backend, &batch, |_, _| calls += 1)
            .unwrap_err();
        assert_eq!(
            err,
            Im2RowError::BatchLength {
                len: 40,
                input_size: 16
            }
        );
        assert_eq!(calls, 0);
        assert_eq!(backend.builds(), 0);
    }

    #[test]
    fn test_foreign_batch_rejected() {
        let im2row = four_by_four();
        let backend = CountingBackend::default();
        let other = CpuBackend::<i64>::new();
        let batch = other.vector_from(iota(16));

        let err = im2row
            .for_each_sample(&backend, &batch, |_, _| panic!("step called"))
            .unwrap_err();
        assert_eq!(
            err,
            Im2RowError::BackendMismatch {
                expected: backend.id(),
                got: other.id()
            }
        );
        assert_eq!(backend.builds(), 0);
    }

    #[test]
    fn test_empty_batch() {
        let im2row = four_by_four();
        let backend = CountingBackend::default();
        let batch = backend.vector_from(Vec::new());
        let samples = im2row
            .for_each_sample(&backend, &batch, |_, _| panic!("step called"))
            .unwrap();
        assert_eq!(samples, 0);
    }

    #[test]
    fn test_step_may_mutate_shared_matrix() {
        let im2row = four_by_four();
        let backend = CountingBackend::default();
        let batch = backend.vector_from(iota(32));

        let mut seen = Vec::new();
        im2row
            .for_each_sample(&backend, &batch, |_, mut matrix| {
                assert_eq!((matrix.rows(), matrix.cols()), (4, 4));
                assert_eq!(matrix.data().len(), 16);
                seen.push(matrix.row(3).unwrap().to_vec());
                matrix.row_mut(3).unwrap().fill(-2);
                matrix.as_mut_slice().fill(-1);
            })
            .unwrap();
        assert_eq!(seen, vec![vec![10, 11, 14, 15], vec![26, 27, 30, 31]]);
    }

    #[test]
    fn test_try_for_each_sample_stops_on_error() {
        let im2row = four_by_four();
        let backend = CountingBackend::default();
        let batch = backend.vector_from(iota(48));

        #[derive(Debug, PartialEq)]
        enum StepError {
            Mapping(Im2RowError),
            Rejected(usize),
        }
        impl From<Im2RowError> for StepError {
            fn from(err: Im2RowError) -> Self {
                StepError::Mapping(err)
            }
        }

        let mut seen = Vec::new();
        let result = im2row.try_for_each_sample(&backend, &batch, |index, _| {
            seen.push(index);
            if index == 1 {
                Err(StepError::Rejected(index))
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err(StepError::Rejected(1)));
        assert_eq!(seen, vec![0, 1]);

        let short = backend.vector_from(iota(8));
        let result =
            im2row.try_for_each_sample(&backend, &short, |_, _| Ok::<(), StepError>(()));
        assert_eq!(
            result,
            Err(StepError::Mapping(Im2RowError::BatchLength {
                len: 8,
                input_size: 16
            }))
        );
    }

    #[test]
    fn test_zero_placements_still_visit_samples() {
        let im2row = Im2Row::new(
            WindowSpec::new(
                Dims {
                    width: 3,
                    height: 3,
                    depth: 2,
                },
                (4, 1),
                (2, 1),
            )
            .unwrap(),
        );
        assert_eq!(im2row.num_x(), 0);
        let backend = CountingBackend::default();
        let batch = backend.vector_from(iota(36));

        let mut visited = Vec::new();
        let samples = im2row
            .for_each_sample(&backend, &batch, |index, matrix| {
                assert_eq!(matrix.rows(), 0);
                assert_eq!(matrix.iter_rows().count(), 0);
                visited.push(index);
            })
            .unwrap();
        assert_eq!(samples, 2);
        assert_eq!(visited, vec![0, 1]);
    }

    #[test]
    fn test_mapper_cached_per_backend() {
        let im2row = four_by_four();
        let backend = CountingBackend::default();

        let first = im2row.mapper(&backend).unwrap();
        let second = im2row.mapper(&backend).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.builds(), 1);

        // Repeated applications of the mapper are deterministic.
        let src = backend.vector_from(iota(16));
        let mut a = im2row.make_out(&backend);
        let mut b = im2row.make_out(&backend);
        first.map(src.slice(0..16).unwrap(), a.data_mut()).unwrap();
        second.map(src.slice(0..16).unwrap(), b.data_mut()).unwrap();
        first.map(src.slice(0..16).unwrap(), b.data_mut()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_backend_switch_rebuilds() {
        let im2row = four_by_four();
        let a = CountingBackend::default();
        let b = CountingBackend::default();

        let gather = |backend: &CountingBackend| {
            let mapper = im2row.mapper(backend).unwrap();
            let src = backend.vector_from(iota(16));
            let mut out = im2row.make_out(backend);
            mapper.map(src.slice(0..16).unwrap(), out.data_mut()).unwrap();
            out.into_data().into_vec()
        };

        let from_a = gather(&a);
        let from_b = gather(&b);
        let from_a_again = gather(&a);

        assert_eq!((a.builds(), b.builds()), (2, 1));
        assert_eq!(from_a, from_b);
        assert_eq!(from_a, from_a_again);
    }

    #[test]
    fn test_backends_of_different_element_types() {
        let im2row = four_by_four();
        let single = CpuBackend::<f32>::new();
        let double = CpuBackend::<f64>::new();

        for _ in 0..2 {
            let batch = single.vector_from((0..16).map(|x| x as f32).collect());
            let mut rows = Vec::new();
            im2row
                .for_each_sample(&single, &batch, |_, m| rows.push(m.row(3).unwrap().to_vec()))
                .unwrap();
            assert_eq!(rows, vec![vec![10.0f32, 11.0, 14.0, 15.0]]);

            let batch = double.vector_from((0..16).map(|x| x as f64).collect());
            let mut rows = Vec::new();
            im2row
                .for_each_sample(&double, &batch, |_, m| rows.push(m.row(0).unwrap().to_vec()))
                .unwrap();
            assert_eq!(rows, vec![vec![0.0f64, 1.0, 4.0, 5.0]]);
        }
    }

    #[test]
    fn test_concurrent_mapper_builds_once() {
        let im2row = four_by_four();
        let backend = CountingBackend::default();

        let mappers: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| im2row.mapper(&backend).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(backend.builds(), 1);
        assert!(mappers.iter().all(|m| Arc::ptr_eq(m, &mappers[0])));
    }

    fn dot(a: &[i64], b: &[i64]) -> i64 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    proptest! {
        #[test]
        fn each_sample_sees_only_its_own_data(
            spec in gen_window_spec(7, 2),
            samples in 0usize..4,
        ) {
            let im2row = Im2Row::new(spec);
            let backend = CountingBackend::default();
            let size = spec.input_size();
            let batch = backend.vector_from(iota(samples * size));
            let table = GatherIndexTable::build(&spec);

            let mut seen = 0;
            let count = im2row.for_each_sample(&backend, &batch, |index, matrix| {
                let base = (index * size) as i64;
                let expected: Vec<i64> =
                    table.offsets().iter().map(|&o| base + o as i64).collect();
                assert_eq!(matrix.data().as_slice(), &expected[..]);
                assert_eq!(index, seen);
                seen += 1;
            }).unwrap();
            prop_assert_eq!(count, samples);
            prop_assert_eq!(seen, samples);
        }

        #[test]
        fn map_transpose_is_adjoint(spec in gen_window_spec(7, 2)) {
            let im2row = Im2Row::new(spec);
            let backend = CountingBackend::default();
            let mapper = im2row.mapper(&backend).unwrap();

            let x = backend.vector_from(iota(spec.input_size()).iter().map(|v| 3 * v + 1).collect());
            let y = backend.vector_from(iota(mapper.out_len()).iter().map(|v| v % 7 - 3).collect());

            let mut mx = im2row.make_out(&backend);
            mapper.map(x.slice(0..x.len()).unwrap(), mx.data_mut()).unwrap();
            let mut mty = backend.make_vector(spec.input_size());
            mapper.map_transpose(&y, &mut mty).unwrap();

            prop_assert_eq!(
                dot(mx.data().as_slice(), y.as_slice()),
                dot(x.as_slice(), mty.as_slice())
            );
        }
    }
}

/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Single-slot, backend-keyed mapper cache.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::BackendId;

type Entry = (BackendId, Arc<dyn Any + Send + Sync>);

/// Holds at most one compiled mapper together with the backend it
/// was built for.
///
/// The lookup and any build or replacement happen under one lock:
/// concurrent callers for the same backend build once and never
/// observe a half-built entry. Values are type-erased, so one cache
/// may hold mappers for backends of different element types in turn.
#[derive(Default)]
pub struct MapperCache {
    slot: Mutex<Option<Entry>>,
}

impl MapperCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value for `key`, or runs `build`, stores its
    /// result in place of any previous entry and returns it.
    ///
    /// If `build` fails the previous entry is kept.
    pub fn get_or_build<M, E, F>(&self, key: BackendId, build: F) -> Result<Arc<M>, E>
    where
        M: Send + Sync + 'static,
        F: FnOnce() -> Result<M, E>,
    {
        let mut slot = self.slot.lock();
        if let Some((cached, value)) = slot.as_ref() {
            if *cached == key {
                if let Ok(mapper) = Arc::clone(value).downcast::<M>() {
                    tracing::trace!(backend = %key, "mapper cache hit");
                    return Ok(mapper);
                }
            } else {
                tracing::debug!(
                    cached = %cached,
                    requested = %key,
                    "replacing cached mapper for another backend"
                );
            }
        }

        let mapper = Arc::new(build()?);
        *slot = Some((key, Arc::clone(&mapper) as Arc<dyn Any + Send + Sync>));
        Ok(mapper)
    }

    /// The backend the current entry was built for, if any.
    pub fn cached_key(&self) -> Option<BackendId> {
        self.slot.lock().as_ref().map(|(key, _)| *key)
    }

    /// Drops the current entry.
    pub fn clear(&self) {
        self.slot.lock().take();
    }
}

impl fmt::Debug for MapperCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapperCache")
            .field("cached_key", &self.cached_key())
            .finish()
    }
}

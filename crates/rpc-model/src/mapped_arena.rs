// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! A `typed_generational_arena::Arena` paired with a name index.
//!
//! Resources are referenced by name all over a request (relationship destinations, embedded
//! types, calculation return types), so every lookup goes through the map rather than a linear
//! scan. Iteration follows insertion order.

use std::{collections::HashMap, ops};

use typed_generational_arena::{Arena, IgnoreGeneration, Index};

pub type SerializableSlab<T> = Arena<T, usize, IgnoreGeneration>;
pub type SerializableSlabIndex<T> = Index<T, usize, IgnoreGeneration>;

#[derive(Debug, Clone)]
pub struct MappedArena<V> {
    values: SerializableSlab<V>,
    map: HashMap<String, SerializableSlabIndex<V>>,
}

impl<V> MappedArena<V> {
    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn get_id(&self, key: &str) -> Option<SerializableSlabIndex<V>> {
        self.map.get(key).copied()
    }

    pub fn get_by_key(&self, key: &str) -> Option<&V> {
        self.get_id(key).map(|id| &self[id])
    }

    /// Insert a value under a new key. An existing key is left untouched and the value is
    /// handed back.
    pub fn insert(&mut self, key: &str, value: V) -> Result<SerializableSlabIndex<V>, V> {
        if self.map.contains_key(key) {
            return Err(value);
        }

        let id = self.values.insert(value);
        self.map.insert(key.to_string(), id);
        Ok(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &V> {
        self.values.iter().map(|(_, v)| v)
    }
}

impl<V> Default for MappedArena<V> {
    fn default() -> Self {
        MappedArena {
            values: SerializableSlab::new(),
            map: HashMap::default(),
        }
    }
}

impl<V> ops::Index<SerializableSlabIndex<V>> for MappedArena<V> {
    type Output = V;

    #[inline]
    fn index(&self, id: SerializableSlabIndex<V>) -> &V {
        &self.values[id]
    }
}

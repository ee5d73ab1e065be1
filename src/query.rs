// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Query engine: compiles a fetch type plus `.with`/`.without` filters into
//! a [`QueryDescriptor`], resolves it to a cached list of matching archetype
//! indices, and iterates their chunks directly.
//!
//! The cache lives on [`World`] and is kept current incrementally: it
//! subscribes to [`ArchetypeCreated`](crate::event::ArchetypeCreated) and,
//! on every new archetype, checks it against every descriptor already
//! cached and appends it to the lists that match, so a query compiled
//! before an archetype existed still sees it on the next lookup without a
//! full rescan.

use std::marker::PhantomData;
use std::ptr::NonNull;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::archetype::{Archetype, Chunk};
use crate::component::Component;
use crate::entity::EntityId;
use crate::registry::ComponentId;
use crate::world::World;

const MAX_QUERY_COMPONENTS: usize = 8;

/// Canonical, order-independent key for a compiled query: the union of
/// every type a fetch reads or writes, plus whatever `.with`/`.without`
/// added, each sorted and deduplicated so equal queries hash equal
/// regardless of how their type list was spelled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryDescriptor {
    required: SmallVec<[ComponentId; MAX_QUERY_COMPONENTS]>,
    excluded: SmallVec<[ComponentId; MAX_QUERY_COMPONENTS]>,
}

impl QueryDescriptor {
    fn new(mut required: SmallVec<[ComponentId; MAX_QUERY_COMPONENTS]>, mut excluded: SmallVec<[ComponentId; MAX_QUERY_COMPONENTS]>) -> Self {
        required.sort_unstable();
        required.dedup();
        excluded.sort_unstable();
        excluded.dedup();
        Self { required, excluded }
    }

    fn matches(&self, archetype: &Archetype) -> bool {
        self.required.iter().all(|&id| archetype.has(id)) && self.excluded.iter().all(|&id| !archetype.has(id))
    }

    fn matches_ids(&self, ids: &[ComponentId]) -> bool {
        self.required.iter().all(|id| ids.contains(id)) && self.excluded.iter().all(|id| !ids.contains(id))
    }
}

/// World-owned cache of `descriptor -> matching archetype indices`.
#[derive(Default)]
pub struct QueryCache {
    entries: FxHashMap<QueryDescriptor, Vec<usize>>,
    hits: u64,
    misses: u64,
}

/// Hit-rate snapshot for [`QueryCache`], exposed via [`World::query_cache_stats`](crate::world::World::query_cache_stats).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryCacheStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl QueryCacheStats {
    /// `0.0` when the cache has never been queried.
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

impl QueryCache {
    pub(crate) fn get_or_build(&mut self, descriptor: &QueryDescriptor, archetypes: &[Archetype]) -> Vec<usize> {
        if let Some(existing) = self.entries.get(descriptor) {
            self.hits += 1;
            return existing.clone();
        }
        self.misses += 1;
        let matches: Vec<usize> = archetypes
            .iter()
            .enumerate()
            .filter_map(|(i, a)| descriptor.matches(a).then_some(i))
            .collect();
        self.entries.insert(descriptor.clone(), matches.clone());
        matches
    }

    /// Extend every cached descriptor's match list with `index` if the new
    /// archetype's component set satisfies it. Driven by
    /// [`ArchetypeCreated`](crate::event::ArchetypeCreated) instead of a
    /// direct call so the cache stays an ordinary subscriber rather than
    /// something the archetype manager has to know about.
    pub(crate) fn notify_new_archetype(&mut self, index: usize, component_ids: &[ComponentId]) {
        for (descriptor, list) in self.entries.iter_mut() {
            if descriptor.matches_ids(component_ids) {
                list.push(index);
            }
        }
    }

    pub(crate) fn stats(&self) -> QueryCacheStats {
        QueryCacheStats {
            cache_hits: self.hits,
            cache_misses: self.misses,
        }
    }
}

/// Implemented by every fetchable query element (`&T`, `&mut T`, `Entity`,
/// `With<T>`, `Without<T>`, and tuples of these) to contribute its required
/// and excluded component ids to a [`QueryDescriptor`].
pub trait QueryFilter {
    fn collect_ids(world: &World, required: &mut SmallVec<[ComponentId; MAX_QUERY_COMPONENTS]>, excluded: &mut SmallVec<[ComponentId; MAX_QUERY_COMPONENTS]>);

    fn descriptor(world: &World) -> QueryDescriptor {
        let mut required = SmallVec::new();
        let mut excluded = SmallVec::new();
        Self::collect_ids(world, &mut required, &mut excluded);
        QueryDescriptor::new(required, excluded)
    }
}

/// Read-only data fetch from a matched archetype's chunks.
///
/// # Safety
/// `slot` must have been produced by `slot()` for the same archetype being
/// fetched from, and `row` must be `< chunk.count()`.
pub unsafe trait Fetch<'w>: QueryFilter {
    type Item;
    type Slot: Copy;

    fn slot(world: &World, archetype: &Archetype) -> Option<Self::Slot>;
    unsafe fn fetch(chunk: &'w Chunk, slot: Self::Slot, row: usize) -> Self::Item;
}

/// Mutable data fetch. `chunk` is a raw pointer because sibling tuple
/// elements (e.g. `(&Position, &mut Velocity)`) each independently reborrow
/// it for their own column; callers must not name the same component type
/// mutably more than once in one query.
///
/// # Safety
/// Same contract as [`Fetch`], plus: `chunk` must point to a live `Chunk`
/// for the duration `'w`, and no two slots derived for the same query may
/// alias the same column.
pub unsafe trait FetchMut<'w>: QueryFilter {
    type Item;
    type Slot: Copy;

    fn slot(world: &World, archetype: &Archetype) -> Option<Self::Slot>;
    unsafe fn fetch(chunk: *mut Chunk, slot: Self::Slot, row: usize) -> Self::Item;
}

impl<T: Component> QueryFilter for &T {
    fn collect_ids(world: &World, required: &mut SmallVec<[ComponentId; MAX_QUERY_COMPONENTS]>, _excluded: &mut SmallVec<[ComponentId; MAX_QUERY_COMPONENTS]>) {
        if let Some(info) = world.registry().get_by_type::<T>() {
            required.push(info.id);
        }
    }
}

unsafe impl<'w, T: Component> Fetch<'w> for &'w T {
    type Item = &'w T;
    type Slot = usize;

    fn slot(world: &World, archetype: &Archetype) -> Option<usize> {
        let info = world.registry().get_by_type::<T>()?;
        archetype.column_index_of(info.id)
    }

    unsafe fn fetch(chunk: &'w Chunk, slot: usize, row: usize) -> &'w T {
        chunk.as_slice::<T>(slot).get(row).expect("row within chunk count")
    }
}

unsafe impl<'w, T: Component> FetchMut<'w> for &'w T {
    type Item = &'w T;
    type Slot = usize;

    fn slot(world: &World, archetype: &Archetype) -> Option<usize> {
        <&T as Fetch>::slot(world, archetype)
    }

    unsafe fn fetch(chunk: *mut Chunk, slot: usize, row: usize) -> &'w T {
        let chunk = unsafe { &*chunk };
        chunk.as_slice::<T>(slot).get(row).expect("row within chunk count")
    }
}

impl<T: Component> QueryFilter for &mut T {
    fn collect_ids(world: &World, required: &mut SmallVec<[ComponentId; MAX_QUERY_COMPONENTS]>, _excluded: &mut SmallVec<[ComponentId; MAX_QUERY_COMPONENTS]>) {
        if let Some(info) = world.registry().get_by_type::<T>() {
            required.push(info.id);
        }
    }
}

unsafe impl<'w, T: Component> FetchMut<'w> for &'w mut T {
    type Item = &'w mut T;
    type Slot = usize;

    fn slot(world: &World, archetype: &Archetype) -> Option<usize> {
        let info = world.registry().get_by_type::<T>()?;
        archetype.column_index_of(info.id)
    }

    unsafe fn fetch(chunk: *mut Chunk, slot: usize, row: usize) -> &'w mut T {
        let chunk = unsafe { &mut *chunk };
        chunk.as_mut_slice::<T>(slot).get_mut(row).expect("row within chunk count")
    }
}

/// Marker for fetching the [`EntityId`] of the current row.
pub struct Entity;

impl QueryFilter for Entity {
    fn collect_ids(_world: &World, _required: &mut SmallVec<[ComponentId; MAX_QUERY_COMPONENTS]>, _excluded: &mut SmallVec<[ComponentId; MAX_QUERY_COMPONENTS]>) {}
}

unsafe impl<'w> Fetch<'w> for Entity {
    type Item = EntityId;
    type Slot = ();

    fn slot(_world: &World, _archetype: &Archetype) -> Option<()> {
        Some(())
    }

    unsafe fn fetch(chunk: &'w Chunk, _slot: (), row: usize) -> EntityId {
        chunk.entity_ids()[row]
    }
}

unsafe impl<'w> FetchMut<'w> for Entity {
    type Item = EntityId;
    type Slot = ();

    fn slot(_world: &World, _archetype: &Archetype) -> Option<()> {
        Some(())
    }

    unsafe fn fetch(chunk: *mut Chunk, _slot: (), row: usize) -> EntityId {
        let chunk = unsafe { &*chunk };
        chunk.entity_ids()[row]
    }
}

/// Filter requiring the presence of `T` without fetching its value.
pub struct With<T>(PhantomData<T>);

impl<T: Component> QueryFilter for With<T> {
    fn collect_ids(world: &World, required: &mut SmallVec<[ComponentId; MAX_QUERY_COMPONENTS]>, _excluded: &mut SmallVec<[ComponentId; MAX_QUERY_COMPONENTS]>) {
        if let Some(info) = world.registry().get_by_type::<T>() {
            required.push(info.id);
        }
    }
}

unsafe impl<'w, T: Component> Fetch<'w> for With<T> {
    type Item = ();
    type Slot = ();
    fn slot(_world: &World, _archetype: &Archetype) -> Option<()> {
        Some(())
    }
    unsafe fn fetch(_chunk: &'w Chunk, _slot: (), _row: usize) {}
}

unsafe impl<'w, T: Component> FetchMut<'w> for With<T> {
    type Item = ();
    type Slot = ();
    fn slot(_world: &World, _archetype: &Archetype) -> Option<()> {
        Some(())
    }
    unsafe fn fetch(_chunk: *mut Chunk, _slot: (), _row: usize) {}
}

/// Filter requiring the absence of `T`.
pub struct Without<T>(PhantomData<T>);

impl<T: Component> QueryFilter for Without<T> {
    fn collect_ids(world: &World, _required: &mut SmallVec<[ComponentId; MAX_QUERY_COMPONENTS]>, excluded: &mut SmallVec<[ComponentId; MAX_QUERY_COMPONENTS]>) {
        if let Some(info) = world.registry().get_by_type::<T>() {
            excluded.push(info.id);
        }
    }
}

unsafe impl<'w, T: Component> Fetch<'w> for Without<T> {
    type Item = ();
    type Slot = ();
    fn slot(_world: &World, _archetype: &Archetype) -> Option<()> {
        Some(())
    }
    unsafe fn fetch(_chunk: &'w Chunk, _slot: (), _row: usize) {}
}

unsafe impl<'w, T: Component> FetchMut<'w> for Without<T> {
    type Item = ();
    type Slot = ();
    fn slot(_world: &World, _archetype: &Archetype) -> Option<()> {
        Some(())
    }
    unsafe fn fetch(_chunk: *mut Chunk, _slot: (), _row: usize) {}
}

macro_rules! impl_query_filter_tuple {
    ($($T:ident),+) => {
        #[allow(non_snake_case)]
        impl<$($T: QueryFilter),+> QueryFilter for ($($T,)+) {
            fn collect_ids(world: &World, required: &mut SmallVec<[ComponentId; MAX_QUERY_COMPONENTS]>, excluded: &mut SmallVec<[ComponentId; MAX_QUERY_COMPONENTS]>) {
                $($T::collect_ids(world, required, excluded);)+
            }
        }
    };
}

impl_query_filter_tuple!(A);
impl_query_filter_tuple!(A, B);
impl_query_filter_tuple!(A, B, C);
impl_query_filter_tuple!(A, B, C, D);

macro_rules! impl_fetch_tuple {
    ($($T:ident),+) => {
        #[allow(non_snake_case)]
        unsafe impl<'w, $($T: Fetch<'w>),+> Fetch<'w> for ($($T,)+) {
            type Item = ($($T::Item,)+);
            type Slot = ($($T::Slot,)+);

            fn slot(world: &World, archetype: &Archetype) -> Option<Self::Slot> {
                Some(($($T::slot(world, archetype)?,)+))
            }

            unsafe fn fetch(chunk: &'w Chunk, slot: Self::Slot, row: usize) -> Self::Item {
                let ($($T,)+) = slot;
                ($(unsafe { <$T as Fetch<'w>>::fetch(chunk, $T, row) },)+)
            }
        }
    };
}

impl_fetch_tuple!(A);
impl_fetch_tuple!(A, B);
impl_fetch_tuple!(A, B, C);
impl_fetch_tuple!(A, B, C, D);

macro_rules! impl_fetch_mut_tuple {
    ($($T:ident),+) => {
        #[allow(non_snake_case)]
        unsafe impl<'w, $($T: FetchMut<'w>),+> FetchMut<'w> for ($($T,)+) {
            type Item = ($($T::Item,)+);
            type Slot = ($($T::Slot,)+);

            fn slot(world: &World, archetype: &Archetype) -> Option<Self::Slot> {
                Some(($($T::slot(world, archetype)?,)+))
            }

            unsafe fn fetch(chunk: *mut Chunk, slot: Self::Slot, row: usize) -> Self::Item {
                let ($($T,)+) = slot;
                ($(unsafe { <$T as FetchMut<'w>>::fetch(chunk, $T, row) },)+)
            }
        }
    };
}

impl_fetch_mut_tuple!(A);
impl_fetch_mut_tuple!(A, B);
impl_fetch_mut_tuple!(A, B, C);
impl_fetch_mut_tuple!(A, B, C, D);

/// Read-only query over `&'w World`, compiled to `Q` on first use and
/// cached on the world by [`QueryDescriptor`].
pub struct Query<'w, Q: QueryFilter + Fetch<'w>> {
    world: &'w World,
    extra_required: SmallVec<[ComponentId; 4]>,
    extra_excluded: SmallVec<[ComponentId; 4]>,
    _marker: PhantomData<Q>,
}

impl<'w, Q: QueryFilter + Fetch<'w>> Query<'w, Q> {
    pub fn new(world: &'w World) -> Self {
        Self {
            world,
            extra_required: SmallVec::new(),
            extra_excluded: SmallVec::new(),
            _marker: PhantomData,
        }
    }

    pub fn with<U: Component>(mut self) -> Self {
        if let Some(info) = self.world.registry().get_by_type::<U>() {
            self.extra_required.push(info.id);
        }
        self
    }

    pub fn without<U: Component>(mut self) -> Self {
        if let Some(info) = self.world.registry().get_by_type::<U>() {
            self.extra_excluded.push(info.id);
        }
        self
    }

    fn descriptor(&self) -> QueryDescriptor {
        let mut required = SmallVec::new();
        let mut excluded = SmallVec::new();
        Q::collect_ids(self.world, &mut required, &mut excluded);
        required.extend(self.extra_required.iter().copied());
        excluded.extend(self.extra_excluded.iter().copied());
        QueryDescriptor::new(required, excluded)
    }

    fn matched_archetypes(&self) -> Vec<usize> {
        self.world.query_matches(&self.descriptor())
    }

    pub fn count(&self) -> usize {
        self.matched_archetypes()
            .into_iter()
            .filter_map(|i| self.world.archetypes().get(i))
            .map(|a| a.count())
            .sum()
    }

    pub fn iter(&self) -> QueryIter<'w, Q> {
        let matches = self.matched_archetypes();
        QueryIter::new(self.world, matches)
    }

    pub fn for_each(&self, mut f: impl FnMut(Q::Item)) {
        for item in self.iter() {
            f(item);
        }
    }

    /// Iterate matched archetypes (not rows) in parallel via rayon, falling
    /// back to [`for_each`](Self::for_each) when the total row count is
    /// below `min_entity_count` — avoids paying thread dispatch overhead
    /// for small matches.
    #[cfg(feature = "parallel")]
    pub fn for_each_parallel(&self, min_entity_count: usize, f: impl Fn(Q::Item) + Sync)
    where
        Q::Item: Send,
    {
        let matches = self.matched_archetypes();
        let total: usize = matches.iter().filter_map(|&i| self.world.archetypes().get(i)).map(|a| a.count()).sum();
        if total < min_entity_count {
            for idx in matches {
                if let Some(archetype) = self.world.archetypes().get(idx) {
                    run_archetype_fetch::<Q>(self.world, archetype, &f);
                }
            }
            return;
        }

        use rayon::prelude::*;
        matches.par_iter().for_each(|&idx| {
            if let Some(archetype) = self.world.archetypes().get(idx) {
                run_archetype_fetch::<Q>(self.world, archetype, &f);
            }
        });
    }
}

fn run_archetype_fetch<'w, Q: Fetch<'w>>(world: &'w World, archetype: &'w Archetype, f: &(impl Fn(Q::Item) + Sync)) {
    let Some(slot) = Q::slot(world, archetype) else { return };
    for chunk in archetype.chunks() {
        for row in 0..chunk.count() {
            let item = unsafe { Q::fetch(chunk, slot, row) };
            f(item);
        }
    }
}

/// Immutable chunk-by-chunk iterator backing [`Query::iter`].
pub struct QueryIter<'w, Q: Fetch<'w>> {
    world: &'w World,
    matches: Vec<usize>,
    match_pos: usize,
    slot: Option<Q::Slot>,
    chunk_idx: usize,
    row: usize,
}

impl<'w, Q: Fetch<'w>> QueryIter<'w, Q> {
    fn new(world: &'w World, matches: Vec<usize>) -> Self {
        Self {
            world,
            matches,
            match_pos: 0,
            slot: None,
            chunk_idx: 0,
            row: 0,
        }
    }

    fn current_archetype(&self) -> Option<&'w Archetype> {
        self.matches.get(self.match_pos).and_then(|&i| self.world.archetypes().get(i))
    }
}

impl<'w, Q: Fetch<'w>> Iterator for QueryIter<'w, Q> {
    type Item = Q::Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let archetype = self.current_archetype()?;

            if self.slot.is_none() {
                self.slot = Q::slot(self.world, archetype);
                self.chunk_idx = 0;
                self.row = 0;
                if self.slot.is_none() {
                    self.match_pos += 1;
                    continue;
                }
            }

            if self.chunk_idx >= archetype.chunk_count() {
                self.slot = None;
                self.match_pos += 1;
                continue;
            }

            let chunk = &archetype.chunks()[self.chunk_idx];
            if self.row >= chunk.count() {
                self.chunk_idx += 1;
                self.row = 0;
                continue;
            }

            let row = self.row;
            self.row += 1;
            return Some(unsafe { Q::fetch(chunk, self.slot.unwrap(), row) });
        }
    }
}

/// Mutable query over `&'w mut World`.
pub struct QueryMut<'w, Q: QueryFilter + FetchMut<'w>> {
    world: &'w mut World,
    extra_required: SmallVec<[ComponentId; 4]>,
    extra_excluded: SmallVec<[ComponentId; 4]>,
    _marker: PhantomData<Q>,
}

impl<'w, Q: QueryFilter + FetchMut<'w>> QueryMut<'w, Q> {
    pub fn new(world: &'w mut World) -> Self {
        Self {
            world,
            extra_required: SmallVec::new(),
            extra_excluded: SmallVec::new(),
            _marker: PhantomData,
        }
    }

    pub fn with<U: Component>(mut self) -> Self {
        if let Some(info) = self.world.registry().get_by_type::<U>() {
            self.extra_required.push(info.id);
        }
        self
    }

    pub fn without<U: Component>(mut self) -> Self {
        if let Some(info) = self.world.registry().get_by_type::<U>() {
            self.extra_excluded.push(info.id);
        }
        self
    }

    fn descriptor(&self) -> QueryDescriptor {
        let mut required = SmallVec::new();
        let mut excluded = SmallVec::new();
        Q::collect_ids(self.world, &mut required, &mut excluded);
        required.extend(self.extra_required.iter().copied());
        excluded.extend(self.extra_excluded.iter().copied());
        QueryDescriptor::new(required, excluded)
    }

    pub fn count(&self) -> usize {
        self.world
            .query_matches(&self.descriptor())
            .into_iter()
            .filter_map(|i| self.world.archetypes().get(i))
            .map(|a| a.count())
            .sum()
    }

    pub fn iter(&'w mut self) -> QueryIterMut<'w, Q> {
        let matches = self.world.query_matches(&self.descriptor());
        let mut archetypes = Vec::with_capacity(matches.len());
        for idx in matches {
            if let Some(ptr) = self.world.archetype_ptr_mut(idx) {
                archetypes.push(ptr);
            }
        }
        QueryIterMut::new(self.world, archetypes)
    }

    pub fn for_each(&'w mut self, mut f: impl FnMut(Q::Item)) {
        let mut iter = self.iter();
        while let Some(item) = iter.next() {
            f(item);
        }
    }

    /// Parallel mutation across matched archetypes via rayon. Each
    /// archetype is processed by a single thread; distinct archetypes are
    /// disjoint allocations so concurrent mutation across them is sound.
    /// Falls back to [`for_each`](Self::for_each) below `min_entity_count`.
    #[cfg(feature = "parallel")]
    pub fn for_each_parallel(&mut self, min_entity_count: usize, f: impl Fn(Q::Item) + Send + Sync)
    where
        Q::Item: Send,
    {
        let descriptor = self.descriptor();
        let matches = self.world.query_matches(&descriptor);
        let total: usize = matches.iter().filter_map(|&i| self.world.archetypes().get(i)).map(|a| a.count()).sum();

        if total < min_entity_count {
            for &idx in &matches {
                if let Some(ptr) = self.world.archetype_ptr_mut(idx) {
                    run_archetype_fetch_mut::<Q>(self.world, ptr, &f);
                }
            }
            return;
        }

        use rayon::prelude::*;
        let world_ptr = self.world as *mut World as usize;
        matches.par_iter().for_each(|&idx| {
            // SAFETY: each index names a distinct archetype; distinct
            // archetypes never share a chunk, so concurrent mutation
            // through this cast is disjoint per thread.
            let world = unsafe { &mut *(world_ptr as *mut World) };
            if let Some(ptr) = world.archetype_ptr_mut(idx) {
                run_archetype_fetch_mut::<Q>(world, ptr, &f);
            }
        });
    }
}

fn run_archetype_fetch_mut<'w, 'a, Q: FetchMut<'w>>(world: &'a World, archetype: NonNull<Archetype>, f: &(impl Fn(Q::Item) + Sync)) {
    // SAFETY: caller (`QueryMut::for_each_parallel`) guarantees `archetype`
    // is a unique, currently-unaliased pointer for the duration of this
    // call.
    let archetype_ref = unsafe { &*archetype.as_ptr() };
    let Some(slot) = Q::slot(world, archetype_ref) else { return };
    for chunk_idx in 0..archetype_ref.chunk_count() {
        let chunk_ptr = unsafe { (*archetype.as_ptr()).chunk_mut(chunk_idx) as *mut Chunk };
        let count = unsafe { (*chunk_ptr).count() };
        for row in 0..count {
            let item = unsafe { Q::fetch(chunk_ptr, slot, row) };
            f(item);
        }
    }
}

/// Mutable chunk-by-chunk iterator backing [`QueryMut::iter`].
pub struct QueryIterMut<'w, Q: FetchMut<'w>> {
    world: *const World,
    archetypes: Vec<NonNull<Archetype>>,
    arch_pos: usize,
    slot: Option<Q::Slot>,
    chunk_idx: usize,
    row: usize,
    _marker: PhantomData<&'w mut Q>,
}

impl<'w, Q: FetchMut<'w>> QueryIterMut<'w, Q> {
    fn new(world: &'w World, archetypes: Vec<NonNull<Archetype>>) -> Self {
        Self {
            world: world as *const World,
            archetypes,
            arch_pos: 0,
            slot: None,
            chunk_idx: 0,
            row: 0,
            _marker: PhantomData,
        }
    }
}

impl<'w, Q: FetchMut<'w>> Iterator for QueryIterMut<'w, Q> {
    type Item = Q::Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let archetype_ptr = *self.archetypes.get(self.arch_pos)?;
            // SAFETY: `archetype_ptr` was produced by `World::archetype_ptr_mut`
            // and remains valid for `'w`; no other reference to it exists
            // while this iterator is alive.
            let archetype = unsafe { &*archetype_ptr.as_ptr() };
            let world = unsafe { &*self.world };

            if self.slot.is_none() {
                self.slot = Q::slot(world, archetype);
                self.chunk_idx = 0;
                self.row = 0;
                if self.slot.is_none() {
                    self.arch_pos += 1;
                    continue;
                }
            }

            if self.chunk_idx >= archetype.chunk_count() {
                self.slot = None;
                self.arch_pos += 1;
                continue;
            }

            let chunk_ptr = unsafe { (*archetype_ptr.as_ptr()).chunk_mut(self.chunk_idx) as *mut Chunk };
            let count = unsafe { (*chunk_ptr).count() };
            if self.row >= count {
                self.chunk_idx += 1;
                self.row = 0;
                continue;
            }

            let row = self.row;
            self.row += 1;
            return Some(unsafe { Q::fetch(chunk_ptr, self.slot.unwrap(), row) });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        x: f32,
    }

    #[test]
    fn query_matches_only_archetypes_with_the_component() {
        let mut world = World::new();
        world.spawn_bundle((Position { x: 1.0 },)).unwrap();
        world.spawn().unwrap();
        let q = Query::<&Position>::new(&world);
        assert_eq!(q.count(), 1);
    }

    #[test]
    fn cache_stats_count_hits_and_misses_per_descriptor() {
        let mut world = World::new();
        world.spawn_bundle((Position { x: 1.0 },)).unwrap();
        Query::<&Position>::new(&world).count(); // miss: first lookup for this descriptor
        Query::<&Position>::new(&world).count(); // hit: same descriptor, already cached
        Query::<&Velocity>::new(&world).count(); // miss: a different descriptor
        let stats = world.query_cache_stats();
        assert_eq!(stats.cache_misses, 2);
        assert_eq!(stats.cache_hits, 1);
        assert!((stats.hit_rate() - (1.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn query_sees_archetypes_created_after_the_first_lookup() {
        let mut world = World::new();
        assert_eq!(Query::<&Position>::new(&world).count(), 0);
        world.spawn_bundle((Position { x: 1.0 },)).unwrap();
        assert_eq!(Query::<&Position>::new(&world).count(), 1);
    }

    #[test]
    fn with_and_without_narrow_the_match() {
        let mut world = World::new();
        world.spawn_bundle((Position { x: 1.0 }, Velocity { x: 2.0 })).unwrap();
        world.spawn_bundle((Position { x: 3.0 },)).unwrap();

        assert_eq!(Query::<&Position>::new(&world).with::<Velocity>().count(), 1);
        assert_eq!(Query::<&Position>::new(&world).without::<Velocity>().count(), 1);
    }

    #[test]
    fn tuple_fetch_reads_both_columns() {
        let mut world = World::new();
        world.spawn_bundle((Position { x: 1.0 }, Velocity { x: 2.0 })).unwrap();
        let q = Query::<(&Position, &Velocity)>::new(&world);
        let items: Vec<_> = q.iter().collect();
        assert_eq!(items, vec![(&Position { x: 1.0 }, &Velocity { x: 2.0 })]);
    }

    #[test]
    fn query_mut_writes_through_the_fetch() {
        let mut world = World::new();
        world.spawn_bundle((Position { x: 1.0 },)).unwrap();
        let mut q = QueryMut::<&mut Position>::new(&mut world);
        q.for_each(|pos| pos.x += 1.0);
        assert_eq!(Query::<&Position>::new(&world).iter().next().unwrap().x, 2.0);
    }

    #[test]
    fn entity_fetch_returns_the_row_owner() {
        let mut world = World::new();
        let e = world.spawn_bundle((Position { x: 1.0 },)).unwrap();
        let q = Query::<(Entity, &Position)>::new(&world);
        let (fetched, _) = q.iter().next().unwrap();
        assert_eq!(fetched, e);
    }
}

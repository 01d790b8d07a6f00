//! Robin-Hood linear probing: every resident tracks its displacement from
//! its home slot, and a newcomer "steals" the slot of any resident closer
//! to its own home, carrying the richer resident forward to find a new
//! spot. See `spec.md` §4.4.
//!
//! Deletion here is a REDESIGN vs. the reference implementation: the source
//! performs exactly one backward-shift step before returning, which breaks
//! the contiguous-displacement invariant lookup depends on whenever two or
//! more entries need to shift. `erase_at_pos` below repeats the shift until
//! it reaches an empty slot or a displacement-zero resident, per the
//! explicit REDESIGN FLAG.

use std::hash::{BuildHasher, Hash};
use std::ptr;

use crate::alloc::{ByteAllocator, RawTableLayout, SystemByteAllocator};
use crate::error::TableError;
use crate::hash::XxHash32Builder;
use crate::primes;
use crate::{HashTable, Position};

/// Robin-Hood open-addressing table. Backing arrays are sized
/// `capacity + max_distance` ("padded capacity") so probe sequences walk
/// forward without wrapping.
pub struct RobinHoodTable<K, V, S = XxHash32Builder, A: ByteAllocator = SystemByteAllocator> {
    hash_builder: S,
    alloc: A,
    ptr: *mut u8,
    layout: std::alloc::Layout,
    distances: *mut i8,
    keys: *mut K,
    values: *mut V,
    capacity: u32,
    max_distance: u32,
    padded_capacity: u32,
    len: u32,
}

impl<K, V, S, A> RobinHoodTable<K, V, S, A>
where
    K: Eq + Hash,
    S: BuildHasher,
    A: ByteAllocator,
{
    pub fn with_hasher_and_alloc(capacity_hint: u32, hash_builder: S, alloc: A) -> Self {
        let mut table = Self {
            hash_builder,
            alloc,
            ptr: ptr::null_mut(),
            layout: std::alloc::Layout::new::<()>(),
            distances: ptr::null_mut(),
            keys: ptr::null_mut(),
            values: ptr::null_mut(),
            capacity: 0,
            max_distance: 0,
            padded_capacity: 0,
            len: 0,
        };
        if capacity_hint > 0 {
            let _ = table.allocate(primes::next_prime(capacity_hint));
        }
        table
    }

    fn hash_of(&self, key: &K) -> u32 {
        self.hash_builder.hash_one(key) as u32
    }

    fn allocate(&mut self, cap: u32) -> Result<(), TableError> {
        let max_distance = primes::log2_ceil(cap);
        let padded = cap + max_distance;
        let raw = RawTableLayout::new::<i8, K, V>(padded as usize);
        let ptr = self.alloc.alloc(raw.layout);
        if ptr.is_null() {
            return Err(TableError::CapacityExhausted);
        }
        let distances = raw.metadata_ptr::<i8>(ptr);
        unsafe {
            for i in 0..padded as usize {
                distances.add(i).write(-1);
            }
        }
        self.ptr = ptr;
        self.layout = raw.layout;
        self.distances = distances;
        self.keys = raw.keys_ptr::<K>(ptr);
        self.values = raw.values_ptr::<V>(ptr);
        self.capacity = cap;
        self.max_distance = max_distance;
        self.padded_capacity = padded;
        Ok(())
    }

    fn first_occupied_from(&self, start: u32) -> u32 {
        let mut i = start;
        while i < self.padded_capacity {
            if unsafe { *self.distances.add(i as usize) } >= 0 {
                return i;
            }
            i += 1;
        }
        self.padded_capacity
    }

    fn find_pos(&self, hash: u32, key: &K) -> u32 {
        if self.capacity == 0 {
            return self.padded_capacity;
        }
        let pos = hash % self.capacity;
        let pend = pos + self.max_distance;
        let mut i = pos;
        while i != pend {
            let d = unsafe { *self.distances.add(i as usize) };
            if d >= 0 && unsafe { &*self.keys.add(i as usize) } == key {
                return i;
            }
            i += 1;
        }
        self.padded_capacity
    }

    fn expand(&mut self, capacity_hint: u32) -> Result<(), TableError>
    where
        S: Clone,
        A: Clone,
    {
        if self.capacity != 0 && primes::is_at_capacity_ceiling(self.capacity) {
            return Err(TableError::CapacityExhausted);
        }
        let new_capacity = primes::next_prime(capacity_hint.max(1));

        let mut new_table =
            Self::with_hasher_and_alloc(0, self.hash_builder.clone(), self.alloc.clone());
        new_table.allocate(new_capacity)?;

        let mut pos = self.first_occupied_from(0);
        while pos < self.padded_capacity {
            let next_pos = self.first_occupied_from(pos + 1);
            let key = unsafe { self.keys.add(pos as usize).read() };
            let value = unsafe { self.values.add(pos as usize).read() };
            unsafe {
                self.distances.add(pos as usize).write(-1);
            }
            new_table.try_insert(key, value)?;
            pos = next_pos;
        }

        std::mem::swap(self, &mut new_table);
        Ok(())
    }

    fn try_insert(&mut self, key: K, value: V) -> Result<bool, TableError>
    where
        S: Clone,
        A: Clone,
    {
        let mut hash = self.hash_of(&key);

        if self.capacity == 0 {
            self.expand(self.capacity + 1)?;
        } else if self.find_pos(hash, &key) != self.padded_capacity {
            return Ok(false);
        }

        let mut pos = hash % self.capacity;
        let mut end = pos + self.max_distance;
        let mut cand_key = key;
        let mut cand_value = value;

        loop {
            let mut d: i32 = 0;
            let mut i = pos;
            while i != end {
                // SAFETY: i stays within [pos, pos + max_distance) <= padded_capacity.
                let resident_d = unsafe { *self.distances.add(i as usize) };
                if resident_d < 0 {
                    unsafe {
                        self.distances.add(i as usize).write(d as i8);
                        self.keys.add(i as usize).write(cand_key);
                        self.values.add(i as usize).write(cand_value);
                    }
                    self.len += 1;
                    return Ok(true);
                }
                if (resident_d as i32) < d {
                    unsafe {
                        std::mem::swap(&mut *self.keys.add(i as usize), &mut cand_key);
                        std::mem::swap(&mut *self.values.add(i as usize), &mut cand_value);
                        self.distances.add(i as usize).write(d as i8);
                    }
                    d = resident_d as i32;
                }
                i += 1;
                d += 1;
            }

            self.expand(self.capacity + 1)?;
            hash = self.hash_of(&cand_key);
            pos = hash % self.capacity;
            end = pos + self.max_distance;
        }
    }

    /// REDESIGN: full backward-shift loop (see module docs), not the
    /// reference implementation's single step.
    fn erase_at_pos(&mut self, pos: u32) {
        unsafe {
            self.keys.add(pos as usize).drop_in_place();
            self.values.add(pos as usize).drop_in_place();
            self.distances.add(pos as usize).write(-1);
        }
        self.len -= 1;

        let mut cur = pos;
        loop {
            let next = cur + 1;
            if next >= self.padded_capacity {
                break;
            }
            let next_d = unsafe { *self.distances.add(next as usize) };
            if next_d < 1 {
                break;
            }
            unsafe {
                let moved_key = self.keys.add(next as usize).read();
                let moved_value = self.values.add(next as usize).read();
                self.keys.add(cur as usize).write(moved_key);
                self.values.add(cur as usize).write(moved_value);
                self.distances.add(cur as usize).write(next_d - 1);
                self.distances.add(next as usize).write(-1);
            }
            cur = next;
        }
    }

    fn try_erase(&mut self, key: &K) -> bool {
        if self.capacity == 0 {
            return false;
        }
        let hash = self.hash_of(key);
        let pos = self.find_pos(hash, key);
        if pos == self.padded_capacity {
            return false;
        }
        self.erase_at_pos(pos);
        true
    }

    fn try_erase_at(&mut self, pos: Position) -> bool {
        let idx = pos.index();
        if idx >= self.padded_capacity {
            return false;
        }
        if unsafe { *self.distances.add(idx as usize) } < 0 {
            return false;
        }
        self.erase_at_pos(idx);
        true
    }

    fn try_find(&self, key: &K) -> Position {
        if self.capacity == 0 {
            return Position::new(self.padded_capacity);
        }
        let hash = self.hash_of(key);
        Position::new(self.find_pos(hash, key))
    }

    fn clear_impl(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        for i in 0..self.padded_capacity as usize {
            unsafe {
                if *self.distances.add(i) >= 0 {
                    self.keys.add(i).drop_in_place();
                    self.values.add(i).drop_in_place();
                }
                self.distances.add(i).write(-1);
            }
        }
        self.len = 0;
    }
}

impl<K, V, S, A> HashTable<K, V> for RobinHoodTable<K, V, S, A>
where
    K: Eq + Hash,
    S: BuildHasher + Default + Clone,
    A: ByteAllocator + Default + Clone,
{
    fn new() -> Self {
        Self::with_hasher_and_alloc(0, S::default(), A::default())
    }

    fn with_capacity(capacity_hint: u32) -> Self {
        Self::with_hasher_and_alloc(capacity_hint, S::default(), A::default())
    }

    fn initialize(&mut self, capacity_hint: u32) {
        *self = HashTable::with_capacity(capacity_hint);
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn len(&self) -> u32 {
        self.len
    }

    fn clear(&mut self) {
        self.clear_impl();
    }

    fn insert(&mut self, key: K, value: V) -> Result<bool, TableError> {
        self.try_insert(key, value)
    }

    fn erase(&mut self, key: &K) -> bool {
        self.try_erase(key)
    }

    fn erase_at(&mut self, pos: Position) -> bool {
        self.try_erase_at(pos)
    }

    fn find(&self, key: &K) -> Position {
        self.try_find(key)
    }

    fn get_key(&self, pos: Position) -> &K {
        debug_assert!(pos.index() < self.padded_capacity);
        debug_assert!(unsafe { *self.distances.add(pos.index() as usize) } >= 0);
        unsafe { &*self.keys.add(pos.index() as usize) }
    }

    fn get_value(&self, pos: Position) -> &V {
        debug_assert!(pos.index() < self.padded_capacity);
        debug_assert!(unsafe { *self.distances.add(pos.index() as usize) } >= 0);
        unsafe { &*self.values.add(pos.index() as usize) }
    }

    fn get_value_mut(&mut self, pos: Position) -> &mut V {
        debug_assert!(pos.index() < self.padded_capacity);
        debug_assert!(unsafe { *self.distances.add(pos.index() as usize) } >= 0);
        unsafe { &mut *self.values.add(pos.index() as usize) }
    }

    fn begin(&self) -> Position {
        Position::new(self.first_occupied_from(0))
    }

    fn next(&self, pos: Position) -> Position {
        Position::new(self.first_occupied_from(pos.index() + 1))
    }

    fn end(&self) -> Position {
        Position::new(self.padded_capacity)
    }

    fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }
}

impl<K, V, S, A: ByteAllocator> Drop for RobinHoodTable<K, V, S, A> {
    fn drop(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        for i in 0..self.padded_capacity as usize {
            unsafe {
                if *self.distances.add(i) >= 0 {
                    self.keys.add(i).drop_in_place();
                    self.values.add(i).drop_in_place();
                }
            }
        }
        unsafe { self.alloc.dealloc(self.ptr, self.layout) };
    }
}

//! Separate chaining inside the slot array: each slot is simultaneously a
//! *home* (the head of the chain of entries whose hash maps here) and,
//! independently, an *entry* (a live key/value with a `next` link to the
//! following entry sharing its own home). See `spec.md` §4.2.

use std::hash::{BuildHasher, Hash};
use std::ptr;

use crate::alloc::{ByteAllocator, RawTableLayout, SystemByteAllocator};
use crate::error::TableError;
use crate::hash::XxHash32Builder;
use crate::primes;
use crate::{HashTable, Position};

const OCCUPY_FLAG: u32 = 0x8000_0000;

#[derive(Clone, Copy)]
struct Bucket {
    /// Head of the chain of entries homed at this slot, or -1.
    index: i32,
    /// Next entry sharing *this* entry's home, or -1. Doubles as the
    /// free-list link when this slot is unoccupied.
    next: i32,
    /// Masked 31-bit hash OR'd with [`OCCUPY_FLAG`]; 0 when unoccupied.
    hash: u32,
}

const EMPTY_BUCKET: Bucket = Bucket {
    index: -1,
    next: -1,
    hash: 0,
};

/// Chained-bucket open-addressing table.
///
/// Generic over the hash builder `S` (default [`XxHash32Builder`]) and the
/// byte allocator `A` (default [`SystemByteAllocator`]), mirroring the
/// teacher's `LinkedOpenAddressing<K, V, S = RandomState>` pattern.
pub struct ChainedTable<K, V, S = XxHash32Builder, A: ByteAllocator = SystemByteAllocator> {
    hash_builder: S,
    alloc: A,
    ptr: *mut u8,
    layout: std::alloc::Layout,
    buckets: *mut Bucket,
    keys: *mut K,
    values: *mut V,
    capacity: u32,
    len: u32,
    free_list: i32,
    empty: u32,
}

impl<K, V, S, A> ChainedTable<K, V, S, A>
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
            buckets: ptr::null_mut(),
            keys: ptr::null_mut(),
            values: ptr::null_mut(),
            capacity: 0,
            len: 0,
            free_list: -1,
            empty: 0,
        };
        if capacity_hint > 0 {
            // Construction-time allocation failure has no Result to report
            // through in this constructor form; fall back to an empty table
            // (the first insert will retry and surface CapacityExhausted).
            let _ = table.allocate(primes::next_prime(capacity_hint));
        }
        table
    }

    fn hash_of(&self, key: &K) -> u32 {
        self.hash_builder.hash_one(key) as u32
    }

    fn allocate(&mut self, cap: u32) -> Result<(), TableError> {
        let raw = RawTableLayout::new::<Bucket, K, V>(cap as usize);
        let ptr = self.alloc.alloc(raw.layout);
        if ptr.is_null() {
            return Err(TableError::CapacityExhausted);
        }
        let buckets = raw.metadata_ptr::<Bucket>(ptr);
        // SAFETY: buckets points to cap freshly-allocated, properly aligned Bucket slots.
        unsafe {
            for i in 0..cap as usize {
                buckets.add(i).write(EMPTY_BUCKET);
            }
        }
        self.ptr = ptr;
        self.layout = raw.layout;
        self.buckets = buckets;
        self.keys = raw.keys_ptr::<K>(ptr);
        self.values = raw.values_ptr::<V>(ptr);
        self.capacity = cap;
        self.free_list = -1;
        self.empty = 0;
        Ok(())
    }

    fn expand(&mut self) -> Result<(), TableError>
    where
        S: Clone,
        A: Clone,
    {
        let new_capacity = if self.capacity == 0 {
            primes::next_prime(1)
        } else {
            if primes::is_at_capacity_ceiling(self.capacity) {
                return Err(TableError::CapacityExhausted);
            }
            primes::next_prime(self.capacity + 1)
        };

        let mut new_table =
            Self::with_hasher_and_alloc(0, self.hash_builder.clone(), self.alloc.clone());
        new_table.allocate(new_capacity)?;

        let mut pos = self.first_occupied_from(0);
        while pos < self.capacity {
            let next_pos = self.first_occupied_from(pos + 1);
            // SAFETY: pos names an occupied slot; move the live key/value out
            // and mark the source unoccupied so Drop won't double-drop it.
            let key = unsafe { self.keys.add(pos as usize).read() };
            let value = unsafe { self.values.add(pos as usize).read() };
            unsafe {
                (*self.buckets.add(pos as usize)).hash = 0;
            }
            let inserted = new_table.try_insert(key, value)?;
            debug_assert!(inserted, "rehash must not encounter duplicate keys");
            pos = next_pos;
        }

        std::mem::swap(self, &mut new_table);
        Ok(())
    }

    fn first_occupied_from(&self, start: u32) -> u32 {
        let mut i = start;
        while i < self.capacity {
            // SAFETY: i < self.capacity, buckets has self.capacity live entries.
            if unsafe { (*self.buckets.add(i as usize)).hash } & OCCUPY_FLAG != 0 {
                return i;
            }
            i += 1;
        }
        self.capacity
    }

    fn try_insert(&mut self, key: K, value: V) -> Result<bool, TableError>
    where
        S: Clone,
        A: Clone,
    {
        loop {
            if self.capacity == 0 {
                self.expand()?;
                continue;
            }

            let full_hash = self.hash_of(&key);
            let home = (full_hash % self.capacity) as usize;
            let stored_hash = (full_hash & !OCCUPY_FLAG) | OCCUPY_FLAG;

            // SAFETY: home < self.capacity.
            let mut cur = unsafe { (*self.buckets.add(home)).index };
            while cur != -1 {
                // SAFETY: cur was linked into this chain, so it is < self.capacity.
                let b = unsafe { *self.buckets.add(cur as usize) };
                if b.hash == stored_hash && unsafe { &*self.keys.add(cur as usize) } == &key {
                    return Ok(false);
                }
                cur = b.next;
            }

            let slot = if self.free_list != -1 {
                let s = self.free_list;
                self.free_list = unsafe { (*self.buckets.add(s as usize)).next };
                s as u32
            } else if self.empty < self.capacity {
                let s = self.empty;
                self.empty += 1;
                s
            } else {
                self.expand()?;
                continue;
            };

            // SAFETY: slot < self.capacity, either freshly bumped or reclaimed
            // from the free-list, and not aliased by any live key/value.
            unsafe {
                let home_bucket = self.buckets.add(home);
                let slot_bucket = self.buckets.add(slot as usize);
                (*slot_bucket).next = (*home_bucket).index;
                (*home_bucket).index = slot as i32;
                (*slot_bucket).hash = stored_hash;
                self.keys.add(slot as usize).write(key);
                self.values.add(slot as usize).write(value);
            }
            self.len += 1;
            return Ok(true);
        }
    }

    fn remove_at(&mut self, home: usize, target: u32) -> bool {
        let mut prev: i32 = -1;
        // SAFETY: home < self.capacity.
        let mut cur = unsafe { (*self.buckets.add(home)).index };
        while cur != -1 {
            if cur as u32 == target {
                // SAFETY: cur < self.capacity, linked into the home chain.
                let next = unsafe { (*self.buckets.add(cur as usize)).next };
                unsafe {
                    if prev == -1 {
                        (*self.buckets.add(home)).index = next;
                    } else {
                        (*self.buckets.add(prev as usize)).next = next;
                    }
                    self.keys.add(cur as usize).drop_in_place();
                    self.values.add(cur as usize).drop_in_place();
                    let b = self.buckets.add(cur as usize);
                    (*b).next = self.free_list;
                    (*b).hash = 0;
                    (*b).index = -1;
                }
                self.free_list = cur;
                self.len -= 1;
                return true;
            }
            prev = cur;
            cur = unsafe { (*self.buckets.add(cur as usize)).next };
        }
        false
    }

    fn try_erase(&mut self, key: &K) -> bool {
        if self.capacity == 0 {
            return false;
        }
        let home = (self.hash_of(key) % self.capacity) as usize;
        let mut cur = unsafe { (*self.buckets.add(home)).index };
        while cur != -1 {
            if unsafe { &*self.keys.add(cur as usize) } == key {
                return self.remove_at(home, cur as u32);
            }
            cur = unsafe { (*self.buckets.add(cur as usize)).next };
        }
        false
    }

    fn try_erase_at(&mut self, pos: Position) -> bool {
        let idx = pos.index();
        if idx >= self.capacity {
            return false;
        }
        let occupied = unsafe { (*self.buckets.add(idx as usize)).hash } & OCCUPY_FLAG != 0;
        if !occupied {
            return false;
        }
        let home =
            (self.hash_of(unsafe { &*self.keys.add(idx as usize) }) % self.capacity) as usize;
        self.remove_at(home, idx)
    }

    fn try_find(&self, key: &K) -> Position {
        if self.capacity == 0 {
            return Position::new(self.capacity);
        }
        let full_hash = self.hash_of(key);
        let home = (full_hash % self.capacity) as usize;
        let stored_hash = (full_hash & !OCCUPY_FLAG) | OCCUPY_FLAG;
        let mut cur = unsafe { (*self.buckets.add(home)).index };
        while cur != -1 {
            let b = unsafe { *self.buckets.add(cur as usize) };
            if b.hash == stored_hash && unsafe { &*self.keys.add(cur as usize) } == key {
                return Position::new(cur as u32);
            }
            cur = b.next;
        }
        Position::new(self.capacity)
    }

    fn clear_impl(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        for i in 0..self.capacity as usize {
            // SAFETY: i < capacity; buckets[i].hash's occupancy flag accurately
            // reflects whether keys[i]/values[i] hold live objects.
            unsafe {
                if (*self.buckets.add(i)).hash & OCCUPY_FLAG != 0 {
                    self.keys.add(i).drop_in_place();
                    self.values.add(i).drop_in_place();
                }
                self.buckets.add(i).write(EMPTY_BUCKET);
            }
        }
        self.free_list = -1;
        self.empty = 0;
        self.len = 0;
    }
}

impl<K, V, S, A> HashTable<K, V> for ChainedTable<K, V, S, A>
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
        debug_assert!(pos.index() < self.capacity);
        debug_assert!(unsafe { (*self.buckets.add(pos.index() as usize)).hash } & OCCUPY_FLAG != 0);
        unsafe { &*self.keys.add(pos.index() as usize) }
    }

    fn get_value(&self, pos: Position) -> &V {
        debug_assert!(pos.index() < self.capacity);
        debug_assert!(unsafe { (*self.buckets.add(pos.index() as usize)).hash } & OCCUPY_FLAG != 0);
        unsafe { &*self.values.add(pos.index() as usize) }
    }

    fn get_value_mut(&mut self, pos: Position) -> &mut V {
        debug_assert!(pos.index() < self.capacity);
        debug_assert!(unsafe { (*self.buckets.add(pos.index() as usize)).hash } & OCCUPY_FLAG != 0);
        unsafe { &mut *self.values.add(pos.index() as usize) }
    }

    fn begin(&self) -> Position {
        Position::new(self.first_occupied_from(0))
    }

    fn next(&self, pos: Position) -> Position {
        Position::new(self.first_occupied_from(pos.index() + 1))
    }

    fn end(&self) -> Position {
        Position::new(self.capacity)
    }

    fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }
}

impl<K, V, S, A: ByteAllocator> Drop for ChainedTable<K, V, S, A> {
    fn drop(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        for i in 0..self.capacity as usize {
            unsafe {
                if (*self.buckets.add(i)).hash & OCCUPY_FLAG != 0 {
                    self.keys.add(i).drop_in_place();
                    self.values.add(i).drop_in_place();
                }
            }
        }
        unsafe { self.alloc.dealloc(self.ptr, self.layout) };
    }
}

//! Hopscotch hashing: a per-home-slot bitmap tracks which of the next `H`
//! slots hold entries whose home is this slot, so lookup never walks a
//! chain — it scans a bounded bitmap. See `spec.md` §4.3.

use std::hash::{BuildHasher, Hash};
use std::ptr;

use crate::alloc::{ByteAllocator, RawTableLayout, SystemByteAllocator};
use crate::error::TableError;
use crate::hash::XxHash32Builder;
use crate::primes;
use crate::{HashTable, Position};

/// Neighborhood width: `8 * size_of::<u32>() - 1`.
const H: u32 = 31;
/// Linear-probe search range before giving up and expanding.
const INSERT_RANGE: u32 = 8 * H;

/// Low bit: occupancy. Remaining 31 bits: hop bitmap, bit `d` set means the
/// slot `d` past this slot (home) holds an entry whose home is here.
#[derive(Clone, Copy)]
struct HopInfo(u32);

const EMPTY_HOP_INFO: HopInfo = HopInfo(0);

impl HopInfo {
    fn occupied(self) -> bool {
        self.0 & 1 != 0
    }

    fn set_occupied(&mut self) {
        self.0 |= 1;
    }

    fn clear_occupied(&mut self) {
        self.0 &= !1;
    }

    fn hop_bits(self) -> u32 {
        self.0 >> 1
    }

    fn set_hop_bits(&mut self, bits: u32) {
        self.0 = (bits << 1) | (self.0 & 1);
    }

    fn set_hop_bit(&mut self, d: u32) {
        self.0 |= 1 << (d + 1);
    }

    fn clear_hop_bit(&mut self, d: u32) {
        self.0 &= !(1 << (d + 1));
    }
}

/// Hopscotch open-addressing table.
pub struct HopscotchTable<K, V, S = XxHash32Builder, A: ByteAllocator = SystemByteAllocator> {
    hash_builder: S,
    alloc: A,
    ptr: *mut u8,
    layout: std::alloc::Layout,
    metadata: *mut HopInfo,
    keys: *mut K,
    values: *mut V,
    capacity: u32,
    len: u32,
}

impl<K, V, S, A> HopscotchTable<K, V, S, A>
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
            metadata: ptr::null_mut(),
            keys: ptr::null_mut(),
            values: ptr::null_mut(),
            capacity: 0,
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
        let raw = RawTableLayout::new::<HopInfo, K, V>(cap as usize);
        let ptr = self.alloc.alloc(raw.layout);
        if ptr.is_null() {
            return Err(TableError::CapacityExhausted);
        }
        let metadata = raw.metadata_ptr::<HopInfo>(ptr);
        unsafe {
            for i in 0..cap as usize {
                metadata.add(i).write(EMPTY_HOP_INFO);
            }
        }
        self.ptr = ptr;
        self.layout = raw.layout;
        self.metadata = metadata;
        self.keys = raw.keys_ptr::<K>(ptr);
        self.values = raw.values_ptr::<V>(ptr);
        self.capacity = cap;
        Ok(())
    }

    fn clamp(&self, x: u32) -> u32 {
        if x < self.capacity { x } else { x - self.capacity }
    }

    fn backward(&self, pos: u32, offset: u32) -> u32 {
        if offset <= pos {
            pos - offset
        } else {
            self.capacity - offset + pos
        }
    }

    fn circular_distance(&self, home: u32, pos: u32) -> u32 {
        if home <= pos {
            pos - home
        } else {
            self.capacity - home + pos
        }
    }

    fn first_occupied_from(&self, start: u32) -> u32 {
        let mut i = start;
        while i < self.capacity {
            if unsafe { (*self.metadata.add(i as usize)).occupied() } {
                return i;
            }
            i += 1;
        }
        self.capacity
    }

    fn find_pos(&self, key: &K, full_hash: u32) -> u32 {
        if self.capacity == 0 {
            return self.capacity;
        }
        let home = full_hash % self.capacity;
        let mut bits = unsafe { (*self.metadata.add(home as usize)).hop_bits() };
        let mut d = 0u32;
        while bits != 0 {
            if bits & 1 != 0 {
                let p = self.clamp(home + d);
                if unsafe { &*self.keys.add(p as usize) } == key {
                    return p;
                }
            }
            bits >>= 1;
            d += 1;
        }
        self.capacity
    }

    /// The heart of `moveEmpty`: shift the empty slot `*pos` backward by
    /// displacing the first eligible resident found scanning the window
    /// `[pos - (window-1), pos]`, widest offset first.
    fn move_empty(&mut self, pos: &mut u32, distance: &mut u32) {
        let size = self.capacity.min(H);
        let offset = size - 1;
        let mut n = self.backward(*pos, offset);
        let mut i = offset as i64;
        while i >= 0 {
            let hop = unsafe { (*self.metadata.add(n as usize)).hop_bits() };
            let mut j = 0u32;
            while (j as i64) <= i {
                if hop & (1 << j) != 0 {
                    let next_pos = self.clamp(n + j);
                    unsafe {
                        let moved_key = self.keys.add(next_pos as usize).read();
                        let moved_value = self.values.add(next_pos as usize).read();
                        self.keys.add(*pos as usize).write(moved_key);
                        self.values.add(*pos as usize).write(moved_value);
                        (*self.metadata.add(*pos as usize)).set_occupied();
                        (*self.metadata.add(next_pos as usize)).clear_occupied();

                        let mut new_hop = hop;
                        new_hop &= !(1 << j);
                        new_hop |= 1 << (i as u32);
                        (*self.metadata.add(n as usize)).set_hop_bits(new_hop);
                    }
                    *distance -= i as u32 - j;
                    *pos = next_pos;
                    return;
                }
                j += 1;
            }
            n = self.clamp(n + 1);
            i -= 1;
        }
        *pos = self.capacity;
        *distance = 0;
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
            let key = unsafe { self.keys.add(pos as usize).read() };
            let value = unsafe { self.values.add(pos as usize).read() };
            unsafe {
                (*self.metadata.add(pos as usize)).clear_occupied();
            }
            let full_hash = new_table.hash_of(&key);
            new_table.insert_found_free(key, value, full_hash)?;
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
        if self.capacity == 0 {
            self.expand()?;
        }
        let full_hash = self.hash_of(&key);
        if self.find_pos(&key, full_hash) != self.capacity {
            return Ok(false);
        }
        self.insert_found_free(key, value, full_hash)
    }

    /// Assumes `key` is not already present; places it via the linear-probe
    /// + `moveEmpty` displacement search, expanding and retrying as needed.
    fn insert_found_free(&mut self, key: K, value: V, hash: u32) -> Result<bool, TableError>
    where
        S: Clone,
        A: Clone,
    {
        let mut start_pos = hash % self.capacity;
        let (final_pos, final_d) = loop {
            let range = self.capacity.min(INSERT_RANGE);
            let mut pos = start_pos;
            let mut d = 0u32;
            loop {
                if !unsafe { (*self.metadata.add(pos as usize)).occupied() } {
                    break;
                }
                pos = self.clamp(pos + 1);
                d += 1;
                if d >= range {
                    break;
                }
            }

            if d >= range {
                self.expand()?;
                start_pos = hash % self.capacity;
                continue;
            }

            let window = self.capacity.min(H);
            while d >= window {
                self.move_empty(&mut pos, &mut d);
                if pos == self.capacity {
                    break;
                }
            }

            if pos == self.capacity {
                self.expand()?;
                start_pos = hash % self.capacity;
                continue;
            }

            break (pos, d);
        };

        unsafe {
            (*self.metadata.add(final_pos as usize)).set_occupied();
            self.keys.add(final_pos as usize).write(key);
            self.values.add(final_pos as usize).write(value);
            (*self.metadata.add(start_pos as usize)).set_hop_bit(final_d);
        }
        self.len += 1;
        Ok(true)
    }

    fn erase_resolved(&mut self, pos: u32, home: u32) -> bool {
        let d = self.circular_distance(home, pos);
        unsafe {
            (*self.metadata.add(pos as usize)).clear_occupied();
            self.keys.add(pos as usize).drop_in_place();
            self.values.add(pos as usize).drop_in_place();
            (*self.metadata.add(home as usize)).clear_hop_bit(d);
        }
        self.len -= 1;
        true
    }

    fn try_erase(&mut self, key: &K) -> bool {
        if self.capacity == 0 {
            return false;
        }
        let full_hash = self.hash_of(key);
        let home = full_hash % self.capacity;
        let pos = self.find_pos(key, full_hash);
        if pos == self.capacity {
            return false;
        }
        self.erase_resolved(pos, home)
    }

    fn try_erase_at(&mut self, pos: Position) -> bool {
        let idx = pos.index();
        if idx >= self.capacity {
            return false;
        }
        if !unsafe { (*self.metadata.add(idx as usize)).occupied() } {
            return false;
        }
        let home = self.hash_of(unsafe { &*self.keys.add(idx as usize) }) % self.capacity;
        self.erase_resolved(idx, home)
    }

    fn try_find(&self, key: &K) -> Position {
        let full_hash = self.hash_of(key);
        Position::new(self.find_pos(key, full_hash))
    }

    fn clear_impl(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        for i in 0..self.capacity as usize {
            unsafe {
                if (*self.metadata.add(i)).occupied() {
                    self.keys.add(i).drop_in_place();
                    self.values.add(i).drop_in_place();
                }
                self.metadata.add(i).write(EMPTY_HOP_INFO);
            }
        }
        self.len = 0;
    }
}

impl<K, V, S, A> HashTable<K, V> for HopscotchTable<K, V, S, A>
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
        debug_assert!(unsafe { (*self.metadata.add(pos.index() as usize)).occupied() });
        unsafe { &*self.keys.add(pos.index() as usize) }
    }

    fn get_value(&self, pos: Position) -> &V {
        debug_assert!(pos.index() < self.capacity);
        debug_assert!(unsafe { (*self.metadata.add(pos.index() as usize)).occupied() });
        unsafe { &*self.values.add(pos.index() as usize) }
    }

    fn get_value_mut(&mut self, pos: Position) -> &mut V {
        debug_assert!(pos.index() < self.capacity);
        debug_assert!(unsafe { (*self.metadata.add(pos.index() as usize)).occupied() });
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

impl<K, V, S, A: ByteAllocator> Drop for HopscotchTable<K, V, S, A> {
    fn drop(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        for i in 0..self.capacity as usize {
            unsafe {
                if (*self.metadata.add(i)).occupied() {
                    self.keys.add(i).drop_in_place();
                    self.values.add(i).drop_in_place();
                }
            }
        }
        unsafe { self.alloc.dealloc(self.ptr, self.layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> HopscotchTable<String, i32> {
        HashTable::new()
    }

    #[test]
    fn empty_find() {
        let t = table();
        assert_eq!(HashTable::find(&t, &"a".to_string()), HashTable::end(&t));
    }

    #[test]
    fn single_element_roundtrip() {
        let mut t = table();
        assert_eq!(t.insert("k".to_string(), 1).unwrap(), true);
        let p = t.find(&"k".to_string());
        assert_ne!(p, t.end());
        assert_eq!(*t.get_value(p), 1);
        assert!(t.erase(&"k".to_string()));
        assert_eq!(t.find(&"k".to_string()), t.end());
        assert_eq!(t.len(), 0);
    }

    #[test]
    fn duplicate_rejection() {
        let mut t = table();
        assert_eq!(t.insert("k".to_string(), 1).unwrap(), true);
        assert_eq!(t.insert("k".to_string(), 2).unwrap(), false);
        assert_eq!(*t.get_value(t.find(&"k".to_string())), 1);
    }

    #[test]
    fn forced_growth_keeps_every_key_findable() {
        let mut t = table();
        for i in 0..200 {
            assert_eq!(t.insert(format!("key-{i}"), i).unwrap(), true);
        }
        assert_eq!(t.len(), 200);
        for i in 0..200 {
            let p = t.find(&format!("key-{i}"));
            assert_ne!(p, t.end());
            assert_eq!(*t.get_value(p), i);
        }
    }

    #[test]
    fn hop_bitmap_matches_occupied_slots() {
        let mut t: HopscotchTable<i32, i32> = HashTable::with_capacity(17);
        for i in 0..17 {
            t.insert(i, i).unwrap();
        }
        for home in 0..t.capacity() {
            let hop = unsafe { (*t.metadata.add(home as usize)).hop_bits() };
            let mut bits = hop;
            let mut d = 0u32;
            while bits != 0 {
                if bits & 1 != 0 {
                    let p = t.clamp(home + d);
                    assert!(unsafe { (*t.metadata.add(p as usize)).occupied() });
                }
                bits >>= 1;
                d += 1;
            }
        }
    }

    #[test]
    fn saturated_single_home_still_findable() {
        #[derive(Clone, Default)]
        struct ConstantHasher;
        impl BuildHasher for ConstantHasher {
            type Hasher = ConstantHasherImpl;
            fn build_hasher(&self) -> ConstantHasherImpl {
                ConstantHasherImpl
            }
        }
        struct ConstantHasherImpl;
        impl std::hash::Hasher for ConstantHasherImpl {
            fn write(&mut self, _bytes: &[u8]) {}
            fn finish(&self) -> u64 {
                7
            }
        }

        let mut t: HopscotchTable<i32, i32, ConstantHasher> =
            HopscotchTable::with_hasher_and_alloc(5, ConstantHasher, SystemByteAllocator);
        for i in 0..64 {
            assert_eq!(t.insert(i, i * 2).unwrap(), true);
        }
        assert_eq!(t.len(), 64);
        for i in 0..64 {
            let p = t.find(&i);
            assert_ne!(p, t.end());
            assert_eq!(*t.get_value(p), i * 2);
        }
    }
}

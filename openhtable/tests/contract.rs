//! The same behavioral contract, exercised identically against all three
//! table variants. Each boundary scenario corresponds to one named in
//! `spec.md` §8.

use openhtable::{ChainedTable, HashTable, HopscotchTable, RobinHoodTable};

fn empty_find<T: HashTable<String, String>>() {
    let mut t = T::new();
    assert_eq!(t.find(&"a".to_string()), t.end());
    assert!(!t.erase(&"a".to_string()));
    assert_eq!(t.len(), 0);
}

fn single_element<T: HashTable<String, String>>() {
    let mut t = T::new();
    assert_eq!(t.insert("k".to_string(), "v".to_string()).unwrap(), true);
    let p = t.find(&"k".to_string());
    assert_ne!(p, t.end());
    assert_eq!(t.get_value(p), "v");
    assert!(t.erase(&"k".to_string()));
    assert_eq!(t.find(&"k".to_string()), t.end());
    assert_eq!(t.len(), 0);
}

fn duplicate_rejection<T: HashTable<String, String>>() {
    let mut t = T::new();
    assert_eq!(t.insert("k".to_string(), "v1".to_string()).unwrap(), true);
    assert_eq!(t.insert("k".to_string(), "v2".to_string()).unwrap(), false);
    let p = t.find(&"k".to_string());
    assert_eq!(t.get_value(p), "v1");
}

fn forced_growth<T: HashTable<String, u32>>() {
    let mut t = T::new();
    for i in 0..200u32 {
        assert_eq!(t.insert(format!("key-{i}"), i).unwrap(), true);
    }
    assert_eq!(t.len(), 200);
    for i in 0..200u32 {
        let p = t.find(&format!("key-{i}"));
        assert_ne!(p, t.end());
        assert_eq!(*t.get_value(p), i);
    }
    assert!(t.capacity() >= 200);
}

fn clear_then_reuse<T: HashTable<String, String>>() {
    let mut t = T::new();
    for i in 0..20 {
        t.insert(format!("k{i}"), format!("v{i}")).unwrap();
    }
    t.clear();
    assert_eq!(t.len(), 0);
    for i in 0..20 {
        assert_eq!(t.find(&format!("k{i}")), t.end());
    }
    assert_eq!(t.insert("k".to_string(), "v".to_string()).unwrap(), true);
    assert_ne!(t.find(&"k".to_string()), t.end());
}

fn iteration_visits_exactly_len_entries<T: HashTable<String, u32>>() {
    let mut t = T::new();
    for i in 0..50u32 {
        t.insert(format!("k{i}"), i).unwrap();
    }
    let mut seen = std::collections::HashSet::new();
    let mut pos = t.begin();
    while pos != t.end() {
        seen.insert(t.get_key(pos).clone());
        pos = t.next(pos);
    }
    assert_eq!(seen.len(), t.len() as usize);
    assert_eq!(seen.len(), 50);
}

fn insert_then_expand_then_find<T: HashTable<String, u32>>() {
    let mut t = T::new();
    for i in 0..5_000u32 {
        t.insert(format!("k{i}"), i * 3).unwrap();
    }
    for i in 0..5_000u32 {
        let p = t.find(&format!("k{i}"));
        assert_ne!(p, t.end());
        assert_eq!(*t.get_value(p), i * 3);
    }
}

fn swap_exchanges_contents<T: HashTable<String, u32>>() {
    let mut a = T::new();
    let mut b = T::new();
    a.insert("a".to_string(), 1).unwrap();
    b.insert("b".to_string(), 2).unwrap();
    a.swap(&mut b);
    assert_ne!(a.find(&"b".to_string()), a.end());
    assert_eq!(a.find(&"a".to_string()), a.end());
    assert_ne!(b.find(&"a".to_string()), b.end());
    assert_eq!(b.find(&"b".to_string()), b.end());
}

macro_rules! contract_suite {
    ($module:ident, $ty_str:ty, $ty_u32:ty) => {
        mod $module {
            use super::*;

            #[test]
            fn empty_find_case() {
                empty_find::<$ty_str>();
            }

            #[test]
            fn single_element_case() {
                single_element::<$ty_str>();
            }

            #[test]
            fn duplicate_rejection_case() {
                duplicate_rejection::<$ty_str>();
            }

            #[test]
            fn forced_growth_case() {
                forced_growth::<$ty_u32>();
            }

            #[test]
            fn clear_then_reuse_case() {
                clear_then_reuse::<$ty_str>();
            }

            #[test]
            fn iteration_visits_exactly_len_entries_case() {
                iteration_visits_exactly_len_entries::<$ty_u32>();
            }

            #[test]
            fn insert_then_expand_then_find_case() {
                insert_then_expand_then_find::<$ty_u32>();
            }

            #[test]
            fn swap_exchanges_contents_case() {
                swap_exchanges_contents::<$ty_u32>();
            }
        }
    };
}

contract_suite!(
    chained,
    ChainedTable<String, String>,
    ChainedTable<String, u32>
);
contract_suite!(
    hopscotch,
    HopscotchTable<String, String>,
    HopscotchTable<String, u32>
);
contract_suite!(
    robinhood,
    RobinHoodTable<String, String>,
    RobinHoodTable<String, u32>
);

#[test]
fn hopscotch_saturation_all_keys_on_one_home() {
    use std::hash::{BuildHasher, Hasher};

    struct ConstantHasherImpl;
    impl Hasher for ConstantHasherImpl {
        fn write(&mut self, _bytes: &[u8]) {}
        fn finish(&self) -> u64 {
            7
        }
    }
    #[derive(Clone, Default)]
    struct ConstantHasher;
    impl BuildHasher for ConstantHasher {
        type Hasher = ConstantHasherImpl;
        fn build_hasher(&self) -> ConstantHasherImpl {
            ConstantHasherImpl
        }
    }

    let mut t: HopscotchTable<u32, u32, ConstantHasher> =
        HopscotchTable::with_hasher_and_alloc(5, ConstantHasher, Default::default());
    for i in 0..64u32 {
        assert_eq!(t.insert(i, i * 10).unwrap(), true);
    }
    for i in 0..64u32 {
        let p = t.find(&i);
        assert_ne!(p, t.end());
        assert_eq!(*t.get_value(p), i * 10);
    }
}

#[test]
fn robinhood_displacement_chain_from_adjacent_homes() {
    use std::hash::{BuildHasher, Hasher};

    struct SequentialHasher(u32);
    impl Hasher for SequentialHasher {
        fn write(&mut self, _bytes: &[u8]) {}
        fn write_u32(&mut self, i: u32) {
            self.0 = i;
        }
        fn finish(&self) -> u64 {
            self.0 as u64
        }
    }
    #[derive(Clone, Default)]
    struct SequentialBuilder;
    impl BuildHasher for SequentialBuilder {
        type Hasher = SequentialHasher;
        fn build_hasher(&self) -> SequentialHasher {
            SequentialHasher(0)
        }
    }

    let mut t: RobinHoodTable<u32, u32, SequentialBuilder> =
        RobinHoodTable::with_hasher_and_alloc(11, SequentialBuilder, Default::default());
    for i in 0..8u32 {
        assert_eq!(t.insert(i, i * 100).unwrap(), true);
    }
    for i in 0..8u32 {
        let p = t.find(&i);
        assert_ne!(p, t.end());
        assert_eq!(*t.get_value(p), i * 100);
    }
}

use super::*;

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::ops::ControlFlow;

fn validate_tree(t: &Art) {
    let issues = t.verify_integrity();
    assert!(issues.is_empty(), "integrity issues: {:#?}\n{}", issues, t.dump());
}

#[derive(Clone, Debug)]
enum Op {
    Insert(Vec<u8>, Vec<u8>),
    Remove(Vec<u8>),
    Get(Vec<u8>),
    LowerBound(Vec<u8>),
    Range(Vec<u8>, Vec<u8>),
    Prefix(Vec<u8>),
}

fn key_strategy() -> impl Strategy<Value = Vec<u8>> + Clone {
    // A narrow alphabet forces shared prefixes, terminals and splits; the
    // occasional long run crosses the inline prefix limit.
    prop_oneof![
        6 => prop::collection::vec(prop::sample::select(vec![0u8, b'a', b'b', b'c', 0xFF]), 0..=8),
        2 => prop::collection::vec(any::<u8>(), 0..=24),
        1 => (0usize..=3, 14usize..=20).prop_map(|(tail, run)| {
            let mut k = vec![b'p'; run];
            k.extend(std::iter::repeat(b'z').take(tail));
            k
        }),
    ]
}

fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=12)
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let key = key_strategy();
    let op = prop_oneof![
        45 => (key.clone(), value_strategy()).prop_map(|(k, v)| Op::Insert(k, v)),
        25 => key.clone().prop_map(Op::Remove),
        10 => key.clone().prop_map(Op::Get),
        10 => key.clone().prop_map(Op::LowerBound),
        5 => (key.clone(), key.clone()).prop_map(|(a, b)| Op::Range(a, b)),
        5 => key.clone().prop_map(Op::Prefix),
    ];
    prop::collection::vec(op, 0..=600)
}

fn collect_range(t: &Art, start: &[u8], end: &[u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let _: ControlFlow<()> = t.range(start, end, |leaf| {
        out.push(leaf.key().to_vec());
        ControlFlow::Continue(())
    });
    out
}

fn collect_prefix(t: &Art, prefix: &[u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let _: ControlFlow<()> = t.for_each_prefix(prefix, |leaf| {
        out.push(leaf.key().to_vec());
        ControlFlow::Continue(())
    });
    out
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence(ops in ops_strategy()) {
        let mut t = Art::new();
        let mut m: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(key, value) => {
                    let old_t = t.insert(&key, &value);
                    let old_m = m.insert(key, value);
                    prop_assert_eq!(old_t, old_m);
                }
                Op::Remove(key) => {
                    let old_t = t.remove(&key);
                    let old_m = m.remove(key.as_slice());
                    prop_assert_eq!(old_t, old_m);
                }
                Op::Get(key) => {
                    let got_t = t.get(&key).map(<[u8]>::to_vec);
                    let got_m = m.get(key.as_slice()).cloned();
                    prop_assert_eq!(got_t, got_m);
                }
                Op::LowerBound(key) => {
                    let got_t = t.lower_bound(&key).map(|l| l.key().to_vec());
                    let got_m = m.range(key.clone()..).next().map(|(k, _)| k.clone());
                    prop_assert_eq!(got_t, got_m);

                    let floor_t = t.cursor().seek_floor(&key).map(|l| l.key().to_vec());
                    let floor_m = m.range(..=key).next_back().map(|(k, _)| k.clone());
                    prop_assert_eq!(floor_t, floor_m);
                }
                Op::Range(start, end) => {
                    let got_t = collect_range(&t, &start, &end);
                    let got_m: Vec<Vec<u8>> = if start < end {
                        m.range(start..end).map(|(k, _)| k.clone()).collect()
                    } else {
                        Vec::new()
                    };
                    prop_assert_eq!(got_t, got_m);
                }
                Op::Prefix(prefix) => {
                    let got_t = collect_prefix(&t, &prefix);
                    let got_m: Vec<Vec<u8>> = m
                        .range(prefix.clone()..)
                        .take_while(|(k, _)| k.starts_with(&prefix))
                        .map(|(k, _)| k.clone())
                        .collect();
                    prop_assert_eq!(got_t, got_m);
                }
            }

            prop_assert_eq!(t.len(), m.len());
        }

        validate_tree(&t);
        let got: Vec<(Vec<u8>, Vec<u8>)> = t.iter().map(|l| (l.key().to_vec(), l.value().to_vec())).collect();
        let expected: Vec<(Vec<u8>, Vec<u8>)> = m.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        prop_assert_eq!(got, expected);

        let backwards: Vec<Vec<u8>> = {
            let mut cursor = t.cursor();
            let mut out = Vec::new();
            let mut leaf = cursor.seek_last();
            while let Some(l) = leaf {
                out.push(l.key().to_vec());
                leaf = cursor.move_prev();
            }
            out
        };
        let expected_back: Vec<Vec<u8>> = m.keys().rev().cloned().collect();
        prop_assert_eq!(backwards, expected_back);
    }

    #[test]
    fn prop_merge_matches_union(
        left in prop::collection::btree_set(key_strategy(), 0..60),
        right in prop::collection::btree_set(key_strategy(), 0..60),
    ) {
        let mut a = Art::new();
        let mut b = Art::new();
        for k in &left {
            a.insert(k, b"L");
        }
        for k in &right {
            b.insert(k, b"R");
        }
        let got: Vec<(Vec<u8>, Vec<u8>)> = MergeIter::new([a.iter(), b.iter()])
            .map(|l| (l.key().to_vec(), l.value().to_vec()))
            .collect();
        let mut expected: BTreeMap<Vec<u8>, Vec<u8>> = right.iter().map(|k| (k.clone(), b"R".to_vec())).collect();
        for k in &left {
            expected.insert(k.clone(), b"L".to_vec());
        }
        prop_assert_eq!(got, expected.into_iter().collect::<Vec<_>>());
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

fn small_set() -> Vec<Vec<u8>> {
    vec![
        b"".to_vec(),
        b"a".to_vec(),
        b"b".to_vec(),
        b"aa".to_vec(),
        b"ab".to_vec(),
        b"aab".to_vec(),
        b"ba".to_vec(),
    ]
}

#[test]
fn exhaustive_insert_order_small_set() {
    let keys = small_set();

    for_each_permutation(&keys, |perm| {
        let mut t = Art::new();
        let mut m: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

        for (i, k) in perm.into_iter().enumerate() {
            let v = vec![i as u8];
            assert_eq!(t.insert(&k, &v), m.insert(k, v));
        }

        validate_tree(&t);
        let got: Vec<(Vec<u8>, Vec<u8>)> = t.iter().map(|l| (l.key().to_vec(), l.value().to_vec())).collect();
        let expected: Vec<(Vec<u8>, Vec<u8>)> = m.into_iter().collect();
        assert_eq!(got, expected);
    });
}

#[test]
fn exhaustive_remove_order_small_set() {
    let keys = small_set();

    // Insert in a fixed order, then remove in all permutations.
    for_each_permutation(&keys, |perm| {
        let mut t = Art::new();
        let mut m: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        for (i, k) in keys.iter().enumerate() {
            let v = vec![i as u8];
            assert_eq!(t.insert(k, &v), m.insert(k.clone(), v));
        }

        for k in perm {
            assert_eq!(t.remove(&k), m.remove(k.as_slice()));
            assert_eq!(t.len(), m.len());
            validate_tree(&t);
        }
        assert_eq!(t.len(), 0);
        assert!(t.root_ptr().is_empty());
    });
}

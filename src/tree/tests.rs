use super::*;

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::encoding::PointerWidth;
use crate::error::ConfigError;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn assert_consistent(t: &Art) {
    let issues = t.verify_integrity();
    assert!(issues.is_empty(), "integrity issues: {:#?}\n{}", issues, t.dump());
}

fn keys_of(t: &Art) -> Vec<Vec<u8>> {
    t.iter().map(|l| l.key().to_vec()).collect()
}

fn root_kind(t: &Art) -> NodeKind {
    t.root_info().expect("root should be an internal node").kind
}

/// Single-byte keys `0..n`.
fn fill_bytes(t: &mut Art, n: usize) {
    for b in 0..n {
        t.insert(&[b as u8], &[b as u8, 0xEE]);
    }
}

#[test]
fn test_basic() {
    let mut t = Art::new();
    t.insert(b"hello", b"1");
    t.insert(b"world", b"2");
    assert_eq!(t.get(b"hello"), Some(&b"1"[..]));
    assert_eq!(t.get(b"world"), Some(&b"2"[..]));
    assert_eq!(t.get(b"missing"), None);
    assert_eq!(t.get(b"hell"), None);
    assert_eq!(t.get(b"hello!"), None);
    assert_eq!(t.len(), 2);
    assert!(t.contains_key(b"hello"));
    assert_consistent(&t);
}

#[test]
fn test_empty_tree() {
    let mut t = Art::new();
    assert!(t.is_empty());
    assert_eq!(t.get(b"a"), None);
    assert!(t.minimum().is_none());
    assert!(t.maximum().is_none());
    assert!(t.lower_bound(b"").is_none());
    assert_eq!(t.remove(b"a"), None);
    assert_eq!(t.iter().count(), 0);
    assert!(t.cursor().seek_first().is_none());
    assert!(t.root_info().is_none());
    assert_consistent(&t);
}

#[test]
fn test_drained_tree_is_consistent() {
    let mut t = Art::new();
    t.insert(b"a", b"1");
    assert_eq!(t.remove(b"a"), Some(b"1".to_vec()));
    assert!(t.root_ptr().is_empty());
    assert_eq!(t.verify_integrity(), Vec::<String>::new());

    for k in [&b"x"[..], b"xy", b"xz", b""] {
        t.insert(k, k);
    }
    for k in [&b"xy"[..], b"", b"x", b"xz"] {
        t.remove(k);
    }
    assert!(t.root_ptr().is_empty());
    assert_consistent(&t);
}

#[test]
fn test_empty_key() {
    let mut t = Art::new();
    t.insert(b"", b"root");
    assert_eq!(t.get(b""), Some(&b"root"[..]));
    t.insert(b"a", b"1");
    // The empty key becomes the terminal of the root.
    let info = t.root_info().unwrap();
    assert_eq!(info.terminal.as_deref(), Some(&b""[..]));
    assert_eq!(keys_of(&t), vec![b"".to_vec(), b"a".to_vec()]);
    assert_eq!(t.remove(b""), Some(b"root".to_vec()));
    assert!(t.root_ptr().is_leaf());
    assert_consistent(&t);
}

#[test]
fn test_update() {
    let mut t = Art::new();
    assert_eq!(t.insert(b"key", b"1"), None);
    assert_eq!(t.insert(b"key", b"2"), Some(b"1".to_vec()));
    assert_eq!(t.get(b"key"), Some(&b"2"[..]));
    assert_eq!(t.len(), 1);
}

#[test]
fn test_insert_without_replace_keeps_value() {
    let mut t = Art::new();
    t.insert(b"key", b"first");
    let previous = t.insert_with(b"key", b"second", LeafOptions::default(), false);
    assert_eq!(previous, Some(b"first".to_vec()));
    assert_eq!(t.get(b"key"), Some(&b"first"[..]));
    assert_eq!(t.len(), 1);
}

#[test]
fn test_remove() {
    let mut t = Art::new();
    t.insert(b"a", b"1");
    t.insert(b"b", b"2");
    t.insert(b"c", b"3");

    assert_eq!(t.remove(b"b"), Some(b"2".to_vec()));
    assert_eq!(t.get(b"b"), None);
    assert_eq!(t.len(), 2);
    assert_eq!(t.get(b"a"), Some(&b"1"[..]));
    assert_eq!(t.get(b"c"), Some(&b"3"[..]));
    assert_eq!(t.remove(b"b"), None);
    assert_eq!(t.remove(b"zz"), None);
    assert_consistent(&t);
}

#[test]
fn test_many() {
    let mut t = Art::new();
    for i in 0..1000u64 {
        let key = format!("key{:05}", i);
        t.insert(key.as_bytes(), &i.to_be_bytes());
    }
    assert_eq!(t.len(), 1000);
    for i in 0..1000u64 {
        let key = format!("key{:05}", i);
        assert_eq!(t.get(key.as_bytes()), Some(&i.to_be_bytes()[..]), "Failed at {}", i);
    }
    assert_consistent(&t);
}

#[test]
fn test_prefix_keys() {
    let mut t = Art::new();
    t.insert(b"a", &[1]);
    t.insert(b"ab", &[2]);
    t.insert(b"abc", &[3]);
    assert_consistent(&t);

    let lb = t.lower_bound(b"ab").unwrap();
    assert_eq!((lb.key(), lb.value()), (&b"ab"[..], &[2u8][..]));
    assert_eq!(t.maximum().unwrap().key(), b"abc");
    assert_eq!(t.minimum().unwrap().key(), b"a");

    let mut seen = Vec::new();
    let flow: ControlFlow<()> = t.range(b"a", b"abc", |leaf| {
        seen.push(leaf.key().to_vec());
        ControlFlow::Continue(())
    });
    assert!(flow.is_continue());
    assert_eq!(seen, vec![b"a".to_vec(), b"ab".to_vec()]);

    // Dropping the outer terminal merges the root into its only child.
    assert_eq!(t.remove(b"a"), Some(vec![1]));
    let info = t.root_info().unwrap();
    assert_eq!(info.prefix, b"ab".to_vec());
    assert_eq!(info.terminal.as_deref(), Some(&b"ab"[..]));
    assert_eq!(t.get(b"ab"), Some(&[2u8][..]));
    assert_eq!(t.get(b"abc"), Some(&[3u8][..]));
    assert_consistent(&t);
}

#[test]
fn test_prefix_compression() {
    let mut t = Art::new();
    t.insert(b"https://example.com/page1", b"1");
    t.insert(b"https://example.com/page2", b"2");
    t.insert(b"https://example.com/page3", b"3");
    t.insert(b"https://other.com/page1", b"4");

    assert_eq!(t.get(b"https://example.com/page1"), Some(&b"1"[..]));
    assert_eq!(t.get(b"https://example.com/page3"), Some(&b"3"[..]));
    assert_eq!(t.get(b"https://other.com/page1"), Some(&b"4"[..]));
    assert_eq!(t.get(b"https://example.com/page4"), None);
    assert_eq!(t.get(b"https://"), None);

    let info = t.root_info().unwrap();
    assert_eq!(info.prefix, b"https://".to_vec());
    assert_eq!(info.occupants, 2);
    assert_consistent(&t);
}

#[test]
fn test_growth_boundaries() {
    let mut t = Art::new();
    fill_bytes(&mut t, 4);
    assert_eq!(root_kind(&t), NodeKind::Node4);
    t.insert(&[4], b"x");
    assert_eq!(root_kind(&t), NodeKind::Node16);

    fill_bytes(&mut t, 16);
    assert_eq!(root_kind(&t), NodeKind::Node16);
    t.insert(&[16], b"x");
    assert_eq!(root_kind(&t), NodeKind::Node48);

    fill_bytes(&mut t, 48);
    assert_eq!(root_kind(&t), NodeKind::Node48);
    t.insert(&[48], b"x");
    assert_eq!(root_kind(&t), NodeKind::Node256);

    fill_bytes(&mut t, 256);
    let info = t.root_info().unwrap();
    assert_eq!(info.kind, NodeKind::Node256);
    assert_eq!(info.occupants, 256);
    assert_eq!(t.statistics().node256_occupants, 256);
    for b in 0..=255u8 {
        assert!(t.contains_key(&[b]), "missing {}", b);
    }
    assert_consistent(&t);
}

#[test]
fn test_node16_shrinks_to_node4() {
    let mut t = Art::new();
    for k in ["0", "1", "2", "3", "4"] {
        t.insert(k.as_bytes(), k.as_bytes());
    }
    assert_eq!(root_kind(&t), NodeKind::Node16);

    t.remove(b"1");
    assert_eq!(root_kind(&t), NodeKind::Node16);
    t.remove(b"3");
    let info = t.root_info().unwrap();
    assert_eq!(info.kind, NodeKind::Node4);
    assert_eq!(info.occupants, 3);
    for k in ["0", "2", "4"] {
        assert_eq!(t.get(k.as_bytes()), Some(k.as_bytes()));
    }
    assert_consistent(&t);
}

#[test]
fn test_node48_shrinks_at_twelve() {
    let mut t = Art::new();
    fill_bytes(&mut t, 17);
    assert_eq!(root_kind(&t), NodeKind::Node48);
    for b in (13..17u8).rev() {
        t.remove(&[b]);
    }
    assert_eq!(root_kind(&t), NodeKind::Node48);
    t.remove(&[12]);
    let info = t.root_info().unwrap();
    assert_eq!(info.kind, NodeKind::Node16);
    assert_eq!(info.occupants, 12);
    assert_consistent(&t);
}

#[test]
fn test_node256_shrinks_at_thirty_seven() {
    let mut t = Art::new();
    fill_bytes(&mut t, 49);
    assert_eq!(root_kind(&t), NodeKind::Node256);
    for b in 38..49u8 {
        t.remove(&[b]);
    }
    assert_eq!(root_kind(&t), NodeKind::Node256);
    assert_eq!(t.statistics().node256_occupants, 38);
    t.remove(&[0]);
    let info = t.root_info().unwrap();
    assert_eq!(info.kind, NodeKind::Node48);
    assert_eq!(info.occupants, 37);
    assert_eq!(t.statistics().node256_occupants, 0);
    for b in 1..38u8 {
        assert_eq!(t.get(&[b]), Some(&[b, 0xEE][..]));
    }
    assert_consistent(&t);
}

#[test]
fn test_split_then_collapse_to_leaf() {
    let mut t = Art::new();
    t.insert(b"xx", b"1");
    t.insert(b"xy", b"2");
    let info = t.root_info().unwrap();
    assert_eq!(info.kind, NodeKind::Node4);
    assert_eq!(info.prefix, b"x".to_vec());
    assert_eq!(info.prefix_len, 1);
    assert_eq!(
        info.children.iter().map(|c| c.0).collect::<Vec<_>>(),
        vec![b'x', b'y']
    );

    t.remove(b"xy");
    assert!(t.root_ptr().is_leaf());
    assert_eq!(t.get(b"xx"), Some(&b"1"[..]));
    assert_eq!(t.statistics().interior_nodes(), 0);
    assert_consistent(&t);
}

#[test]
fn test_nested_collapse_updates_parent() {
    let mut t = Art::new();
    t.insert(b"axx", b"1");
    t.insert(b"axy", b"2");
    t.insert(b"b", b"3");
    let before = t.root_info().unwrap();
    assert!(before.children[0].1.is_node());

    t.remove(b"axy");
    let after = t.root_info().unwrap();
    assert_eq!(after.children.len(), 2);
    assert!(after.children.iter().all(|c| c.1.is_leaf()));
    assert_eq!(t.get(b"axx"), Some(&b"1"[..]));
    assert_consistent(&t);
}

#[test]
fn test_collapse_merges_prefixes() {
    let mut t = Art::new();
    t.insert(b"abc1", b"1");
    t.insert(b"abc2", b"2");
    t.insert(b"ad", b"3");
    let info = t.root_info().unwrap();
    assert_eq!(info.prefix, b"a".to_vec());

    t.remove(b"ad");
    let info = t.root_info().unwrap();
    assert_eq!(info.prefix, b"abc".to_vec());
    assert_eq!(info.prefix_len, 3);
    assert_eq!(info.occupants, 2);
    assert_eq!(t.get(b"abc1"), Some(&b"1"[..]));
    assert_eq!(t.get(b"abc2"), Some(&b"2"[..]));
    assert_consistent(&t);
}

#[test]
fn test_long_prefixes() {
    let shared = [b'p'; 20];
    let key = |tail: &[u8]| [&shared[..], tail].concat();
    let mut t = Art::new();
    t.insert(&key(b"1"), b"1");
    t.insert(&key(b"2"), b"2");
    let info = t.root_info().unwrap();
    assert_eq!(info.prefix_len, 20);
    assert_eq!(info.prefix.len(), MAX_PREFIX_LEN);

    // Diverge past the inline bytes.
    let mut odd = shared[..15].to_vec();
    odd.push(b'X');
    t.insert(&odd, b"3");
    let info = t.root_info().unwrap();
    assert_eq!(info.prefix_len, 15);
    assert_eq!(t.get(&odd), Some(&b"3"[..]));
    assert_eq!(t.get(&key(b"1")), Some(&b"1"[..]));
    // Same inline bytes, different tail.
    let mut miss = shared[..19].to_vec();
    miss.extend_from_slice(b"q1");
    assert_eq!(t.get(&miss), None);
    assert_eq!(t.lower_bound(&shared[..17]).unwrap().key(), &key(b"1")[..]);
    assert!(t.lower_bound(&miss).is_none());
    let mut between = shared[..15].to_vec();
    between.push(b'Y');
    assert_eq!(t.lower_bound(&between).unwrap().key(), &key(b"1")[..]);
    assert_consistent(&t);

    t.remove(&odd);
    let info = t.root_info().unwrap();
    assert_eq!(info.prefix_len, 20);
    assert_eq!(info.prefix, shared[..MAX_PREFIX_LEN].to_vec());
    assert_eq!(t.get(&key(b"2")), Some(&b"2"[..]));
    assert_consistent(&t);
}

#[test]
fn test_iter() {
    let mut t = Art::new();
    t.insert(b"b", b"2");
    t.insert(b"a", b"1");
    t.insert(b"c", b"3");
    t.insert(b"ab", b"4");

    let items: Vec<_> = t.iter().map(|l| (l.key().to_vec(), l.value().to_vec())).collect();
    assert_eq!(
        items,
        vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"ab".to_vec(), b"4".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
            (b"c".to_vec(), b"3".to_vec()),
        ]
    );
    let from: Vec<_> = t.iter_from(b"aa").map(|l| l.key().to_vec()).collect();
    assert_eq!(from, vec![b"ab".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    let bounded: Vec<_> = t.iter_range(b"a", b"b").map(|l| l.key().to_vec()).collect();
    assert_eq!(bounded, vec![b"a".to_vec(), b"ab".to_vec()]);
}

#[test]
fn test_for_each_stops_on_break() {
    let mut t = Art::new();
    fill_bytes(&mut t, 10);
    let mut seen = 0;
    let flow = t.for_each(|leaf| {
        seen += 1;
        if leaf.key() == [3] {
            ControlFlow::Break(leaf.key()[0])
        } else {
            ControlFlow::Continue(())
        }
    });
    assert_eq!(flow, ControlFlow::Break(3));
    assert_eq!(seen, 4);
}

#[test]
fn test_range() {
    let mut t = Art::new();
    for i in 0..100u32 {
        t.insert(format!("k{:03}", i).as_bytes(), &i.to_le_bytes());
    }
    let mut keys = Vec::new();
    let _: ControlFlow<()> = t.range(b"k010", b"k020", |leaf| {
        keys.push(String::from_utf8(leaf.key().to_vec()).unwrap());
        ControlFlow::Continue(())
    });
    let expected: Vec<_> = (10..20).map(|i| format!("k{:03}", i)).collect();
    assert_eq!(keys, expected);

    // Early stop.
    let mut count = 0;
    let flow = t.range(b"k000", b"k100", |_| {
        count += 1;
        if count == 5 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    assert!(flow.is_break());
    assert_eq!(count, 5);

    // Empty and inverted ranges.
    let mut any = false;
    let _: ControlFlow<()> = t.range(b"k050", b"k050", |_| {
        any = true;
        ControlFlow::Continue(())
    });
    let _: ControlFlow<()> = t.range(b"k060", b"k050", |_| {
        any = true;
        ControlFlow::Continue(())
    });
    assert!(!any);
}

#[test]
fn test_for_each_prefix() {
    let mut t = Art::new();
    for k in ["app", "apple", "apply", "banana", "ap", "b"] {
        t.insert(k.as_bytes(), b"");
    }
    let collect = |prefix: &[u8]| {
        let mut out = Vec::new();
        let _: ControlFlow<()> = t.for_each_prefix(prefix, |leaf| {
            out.push(String::from_utf8(leaf.key().to_vec()).unwrap());
            ControlFlow::Continue(())
        });
        out
    };
    assert_eq!(collect(b"app"), vec!["app", "apple", "apply"]);
    assert_eq!(collect(b"appl"), vec!["apple", "apply"]);
    assert_eq!(collect(b"a"), vec!["ap", "app", "apple", "apply"]);
    assert_eq!(collect(b"b"), vec!["b", "banana"]);
    assert_eq!(collect(b"ban"), vec!["banana"]);
    assert_eq!(collect(b"apx"), Vec::<String>::new());
    assert_eq!(collect(b"applesauce"), Vec::<String>::new());
    assert_eq!(collect(b"").len(), 6);
}

#[test]
fn test_cursor_both_directions() {
    let mut t = Art::new();
    for k in ["a", "b", "ba", "c"] {
        t.insert(k.as_bytes(), k.as_bytes());
    }
    let mut cursor = t.cursor();
    assert_eq!(cursor.seek_last().unwrap().key(), b"c");
    assert_eq!(cursor.move_prev().unwrap().key(), b"ba");
    assert_eq!(cursor.move_prev().unwrap().key(), b"b");
    assert_eq!(cursor.move_prev().unwrap().key(), b"a");
    assert!(cursor.move_prev().is_none());
    assert!(!cursor.is_valid());
    // Exhausted until repositioned.
    assert!(cursor.move_next().is_none());

    assert_eq!(cursor.seek(b"bb").unwrap().key(), b"c");
    assert_eq!(cursor.value(), Some(&b"c"[..]));
    assert!(cursor.move_next().is_none());

    assert_eq!(cursor.seek(b"b").unwrap().key(), b"b");
    assert!(cursor.depth() > 0);
    assert_eq!(cursor.move_next().unwrap().key(), b"ba");
    assert_eq!(cursor.move_prev().unwrap().key(), b"b");
    assert_eq!(cursor.key(), Some(&b"b"[..]));
}

#[test]
fn test_seek_floor() {
    let mut t = Art::new();
    for k in [&b"b"[..], b"ba", b"bab", b"bb", b"d"] {
        t.insert(k, k);
    }
    let floor = |probe: &[u8]| t.cursor().seek_floor(probe).map(|l| l.key().to_vec());
    assert_eq!(floor(b"a"), None);
    assert_eq!(floor(b""), None);
    assert_eq!(floor(b"b"), Some(b"b".to_vec()));
    assert_eq!(floor(b"b0"), Some(b"b".to_vec()));
    assert_eq!(floor(b"baa"), Some(b"ba".to_vec()));
    assert_eq!(floor(b"bac"), Some(b"bab".to_vec()));
    assert_eq!(floor(b"bc"), Some(b"bb".to_vec()));
    assert_eq!(floor(b"c"), Some(b"bb".to_vec()));
    assert_eq!(floor(b"zz"), Some(b"d".to_vec()));

    let mut c = t.cursor();
    c.seek_floor(b"bc");
    assert_eq!(c.move_prev().map(|l| l.key().to_vec()), Some(b"bab".to_vec()));
    assert_eq!(c.move_next().map(|l| l.key().to_vec()), Some(b"bb".to_vec()));
    assert_eq!(c.move_next().map(|l| l.key().to_vec()), Some(b"d".to_vec()));
}

#[test]
fn test_seek_floor_matches_btree() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut t = Art::new();
    let mut m: BTreeMap<Vec<u8>, ()> = BTreeMap::new();
    for _ in 0..400 {
        let key: Vec<u8> = if rng.gen_bool(0.2) {
            let mut k = vec![b'p'; rng.gen_range(14..18)];
            k.push(rng.gen_range(b'a'..=b'c'));
            k
        } else {
            (0..rng.gen_range(0..5)).map(|_| b"pqz"[rng.gen_range(0..3)]).collect()
        };
        t.insert(&key, b"");
        m.insert(key, ());
    }
    for _ in 0..2000 {
        let probe: Vec<u8> = (0..rng.gen_range(0..20)).map(|_| b"opqz"[rng.gen_range(0..4)]).collect();
        let expected = m.range(..=probe.clone()).next_back().map(|(k, _)| k.clone());
        let got = t.cursor().seek_floor(&probe).map(|l| l.key().to_vec());
        assert_eq!(got, expected, "floor of {:?}", probe);
    }
}

#[test]
fn test_cursor_distance() {
    let mut t = Art::new();
    for i in 0..100u32 {
        t.insert(format!("k{:03}", i).as_bytes(), b"");
    }
    let mut a = t.cursor();
    a.seek(b"k010");
    let mut b = t.cursor();
    b.seek(b"k050");

    assert_eq!(a.distance(&b), 40);
    assert_eq!(b.distance(&a), -40);
    assert_eq!(a.fast_distance(&b), 40);
    assert_eq!(b.fast_distance(&a), -40);
    assert_eq!(a.distance(&a), 0);
    assert_eq!(a.distance_to(b"k020"), 10);
    // Lands on k011.
    assert_eq!(a.distance_to(b"k0105"), 1);
    assert_eq!(b.distance_to(b"k000"), -50);

    let end = t.cursor();
    assert_eq!(a.distance(&end), 90);
    assert_eq!(a.fast_distance(&end), 90);
    let mut first = t.cursor();
    first.seek_first();
    assert_eq!(first.fast_distance(&end), 100);
    assert_eq!(end.distance(&first), -100);
}

#[test]
fn test_fast_distance_matches_model() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut t = Art::new();
    let mut m: BTreeMap<Vec<u8>, ()> = BTreeMap::new();
    for _ in 0..300 {
        let len = rng.gen_range(0..5);
        let key: Vec<u8> = (0..len).map(|_| b"abc"[rng.gen_range(0..3)]).collect();
        t.insert(&key, b"");
        m.insert(key, ());
    }

    let probes: Vec<Vec<u8>> = m
        .keys()
        .cloned()
        .chain([Vec::new(), b"b".to_vec(), b"bbbbbb".to_vec(), b"d".to_vec()])
        .collect();
    for x in &probes {
        let mut cx = t.cursor();
        cx.seek(x);
        for y in &probes {
            let mut cy = t.cursor();
            cy.seek(y);
            let expected = if x <= y {
                m.range(x.clone()..y.clone()).count() as i64
            } else {
                -(m.range(y.clone()..x.clone()).count() as i64)
            };
            assert_eq!(cx.fast_distance(&cy), expected, "{:?} -> {:?}", x, y);
            assert_eq!(cx.distance(&cy), expected, "{:?} -> {:?}", x, y);
        }
    }
}

#[test]
fn test_cursor_update_in_place() {
    let mut t = Art::new();
    for k in ["a", "b", "c"] {
        t.insert(k.as_bytes(), b"old");
    }
    {
        let mut c = t.cursor_mut();
        assert!(!c.update(b"x"));
        c.seek(b"b");
        assert!(c.update(b"new"));
        assert_eq!(c.value(), Some(&b"new"[..]));
        assert!(c.update(b"much longer value"));
        assert_eq!(c.key(), Some(&b"b"[..]));
        assert!(c.update_expiry(Some(1_700_000_000_000), true));
        let leaf = c.leaf().unwrap();
        assert_eq!(leaf.value(), b"much longer value");
        assert_eq!(leaf.expiry(), Some(1_700_000_000_000));
        assert!(leaf.is_volatile());
        assert_eq!(c.move_next().map(|l| l.key().to_vec()), Some(b"c".to_vec()));
        assert_eq!(c.move_prev().map(|l| l.key().to_vec()), Some(b"b".to_vec()));
    }
    assert_eq!(t.get(b"b"), Some(&b"much longer value"[..]));
    // Only the size-changing updates reallocate.
    assert_eq!(t.statistics().leaf_nodes_replaced, 2);
    assert_eq!(t.len(), 3);
    assert_consistent(&t);
}

#[test]
fn test_cursor_remove() {
    let mut t = Art::new();
    for i in 0..40u8 {
        t.insert(&[b'k', i], &[i]);
    }
    t.insert(b"k", b"terminal");
    assert_eq!(t.cursor_mut().remove(), None);

    let mut removed = Vec::new();
    {
        let mut c = t.cursor_mut();
        c.seek_first();
        while c.is_valid() {
            let key = c.key().map(<[u8]>::to_vec);
            let value = c.remove();
            assert!(value.is_some());
            removed.push(key.unwrap());
            c.move_next();
        }
    }
    assert_eq!(removed.len(), 21);
    assert_eq!(removed[0], b"k".to_vec());
    let expected: Vec<Vec<u8>> = (0..40u8).step_by(2).map(|i| vec![b'k', i]).collect();
    assert_eq!(keys_of(&t), expected);
    assert_eq!(t.len(), 20);
    assert_consistent(&t);
}

#[test]
fn test_merge_iter() {
    let mut left = Art::new();
    left.insert(b"a", b"L");
    left.insert(b"c", b"L");
    left.insert(b"e", b"L");
    let mut right = Art::new();
    right.insert(b"b", b"R");
    right.insert(b"c", b"R");
    right.insert(b"f", b"R");

    let merged: Vec<_> = MergeIter::new([left.iter(), right.iter()])
        .map(|l| (l.key().to_vec(), l.value().to_vec()))
        .collect();
    assert_eq!(
        merged,
        vec![
            (b"a".to_vec(), b"L".to_vec()),
            (b"b".to_vec(), b"R".to_vec()),
            (b"c".to_vec(), b"L".to_vec()),
            (b"e".to_vec(), b"L".to_vec()),
            (b"f".to_vec(), b"R".to_vec()),
        ]
    );

    let bounded: Vec<_> = MergeIter::new([left.iter_range(b"b", b"f"), right.iter_range(b"b", b"f")])
        .map(|l| l.key().to_vec())
        .collect();
    assert_eq!(bounded, vec![b"b".to_vec(), b"c".to_vec(), b"e".to_vec()]);
}

#[test]
fn test_leaf_options_and_tombstones() {
    let mut t = Art::new();
    let options = LeafOptions {
        expiry: Some(1_700_000_000_000),
        volatile: true,
        compressed_size: None,
    };
    t.insert_with(b"session", b"data", options, true);
    t.insert(b"plain", b"v");

    let leaf = t.search(b"session").unwrap();
    assert_eq!(leaf.expiry(), Some(1_700_000_000_000));
    assert!(leaf.is_volatile());
    assert!(!leaf.is_deleted());
    assert_eq!(leaf.options(), options);

    assert!(t.set_deleted(b"session", true));
    assert!(t.search(b"session").unwrap().is_deleted());
    assert!(!t.search(b"plain").unwrap().is_deleted());
    assert!(t.set_deleted(b"session", false));
    assert!(!t.search(b"session").unwrap().is_deleted());
    assert!(!t.set_deleted(b"absent", true));
}

#[test]
fn test_replacement_accounting() {
    let mut t = Art::new();
    t.insert(b"k", b"v1");
    let addr = t.search(b"k").unwrap().address();
    t.insert(b"k", b"v2");
    assert_eq!(t.search(b"k").unwrap().address(), addr);
    assert_eq!(t.statistics().leaf_nodes_replaced, 0);

    t.insert(b"k", b"a longer value");
    assert_eq!(t.get(b"k"), Some(&b"a longer value"[..]));
    assert_eq!(t.statistics().leaf_nodes_replaced, 1);
    assert_eq!(t.statistics().leaf_nodes, 1);
}

#[test]
fn test_statistics() {
    let mut t = Art::new();
    fill_bytes(&mut t, 5);
    let stats = t.statistics();
    assert_eq!(stats.leaf_nodes, 5);
    assert_eq!(stats.node16_nodes, 1);
    assert_eq!(stats.interior_nodes(), 1);
    assert!(stats.bytes_allocated > 0);
    assert!(stats.bytes_interior > 0);
    assert_eq!(stats.pages, 1);
    assert_eq!(stats.node_pages, 1);

    t.clear();
    assert_eq!(t.statistics(), ArtStatistics::default());
    assert!(t.is_empty());
    t.insert(b"again", b"");
    assert_eq!(t.len(), 1);
}

#[test]
fn test_ops_statistics() {
    let mut t = Art::new();
    t.insert(b"a", b"1");
    t.insert(b"b", b"2");
    t.insert_with(b"c", b"3", LeafOptions::default(), false);
    t.get(b"a");
    t.lower_bound(b"a");
    t.minimum();
    t.maximum();
    t.len();
    t.remove(b"c");
    let _: ControlFlow<()> = t.range(b"a", b"z", |_| ControlFlow::Continue(()));

    let ops = t.ops_statistics();
    assert_eq!(ops.set_ops, 2);
    assert_eq!(ops.insert_ops, 1);
    assert_eq!(ops.get_ops, 1);
    assert_eq!(ops.lb_ops, 1);
    assert_eq!(ops.min_ops, 1);
    assert_eq!(ops.max_ops, 1);
    assert_eq!(ops.size_ops, 1);
    assert_eq!(ops.delete_ops, 1);
    assert_eq!(ops.range_ops, 1);
    assert_eq!(ops.iter_range_ops, 2);
}

#[test]
fn test_range_is_not_a_lower_bound() {
    let mut t = Art::new();
    t.insert(b"m", b"1");
    let _: ControlFlow<()> = t.range(b"a", b"z", |_| ControlFlow::Continue(()));
    let ops = t.ops_statistics();
    assert_eq!(ops.range_ops, 1);
    assert_eq!(ops.iter_range_ops, 1);
    assert_eq!(ops.lb_ops, 0);

    t.cursor().seek(b"a");
    assert_eq!(t.ops_statistics().lb_ops, 1);
}

#[test]
fn test_wide_config() {
    let config = ArtConfig {
        pointer_width: PointerWidth::Wide,
        ..ArtConfig::default()
    };
    let mut t = Art::with_config(config).unwrap();
    fill_bytes(&mut t, 20);
    let info = t.root_info().unwrap();
    assert_eq!(info.width, PointerWidth::Wide);
    assert_eq!(info.kind, NodeKind::Node48);
    assert_consistent(&t);
}

#[test]
fn test_far_leaf_widens_node() {
    init_tracing();
    let mut t = Art::new();
    t.insert(b"a", b"1");
    t.insert(b"b", b"2");
    assert_eq!(t.root_info().unwrap().width, PointerWidth::Narrow);

    // Push the next leaf page beyond i32 reach of the node page.
    t.leaves.skip_pages(1 << 14);
    t.insert(b"c", b"3");
    let info = t.root_info().unwrap();
    assert_eq!(info.kind, NodeKind::Node4);
    assert_eq!(info.width, PointerWidth::Wide);
    assert_eq!(info.occupants, 3);
    for (k, v) in [(b"a", b"1"), (b"b", b"2"), (b"c", b"3")] {
        assert_eq!(t.get(k), Some(&v[..]));
    }
    assert_consistent(&t);

    // New nodes fall back on their own as well.
    t.insert(b"cc", b"4");
    assert_eq!(t.get(b"cc"), Some(&b"4"[..]));
    assert_consistent(&t);
}

#[test]
fn test_drain_in_random_order() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let mut keys: Vec<Vec<u8>> = (0..2000)
        .map(|_| {
            let len = rng.gen_range(1..12);
            (0..len).map(|_| rng.gen_range(b'a'..=b'f')).collect()
        })
        .collect();
    keys.sort();
    keys.dedup();

    let mut t = Art::new();
    keys.shuffle(&mut rng);
    for k in &keys {
        assert_eq!(t.insert(k, k), None);
    }
    assert_eq!(t.len(), keys.len());
    assert_consistent(&t);

    keys.shuffle(&mut rng);
    for (i, k) in keys.iter().enumerate() {
        assert_eq!(t.remove(k).as_deref(), Some(&k[..]), "remove {:?}", k);
        if i % 250 == 0 {
            assert_consistent(&t);
        }
    }
    assert!(t.root_ptr().is_empty());
    assert_eq!(t.len(), 0);
    let stats = t.statistics();
    assert_eq!(stats.leaf_nodes, 0);
    assert_eq!(stats.interior_nodes(), 0);
    assert_eq!(t.allocator().live_records(), 0);
    assert_eq!(t.nodes.len(), 0);
}

#[test]
fn test_lower_bound_matches_btree() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut t = Art::new();
    let mut model = BTreeMap::new();
    for _ in 0..500 {
        let len = rng.gen_range(0..8);
        let k: Vec<u8> = (0..len).map(|_| rng.gen_range(b'a'..=b'd')).collect();
        t.insert(&k, &[]);
        model.insert(k, ());
    }
    for _ in 0..500 {
        let len = rng.gen_range(0..9);
        let mut probe: Vec<u8> = (0..len).map(|_| rng.gen_range(b'a'..=b'e')).collect();
        let got = t.lower_bound(&probe).map(|l| l.key().to_vec());
        let want = model.range(probe.clone()..).next().map(|(k, _)| k.clone());
        assert_eq!(got, want, "lower_bound({:?})", probe);

        // Monotone in the probe.
        probe.push(0);
        let bigger = t.lower_bound(&probe).map(|l| l.key().to_vec());
        if let (Some(a), Some(b)) = (&got, &bigger) {
            assert!(a <= b);
        }
    }
}

#[test]
#[should_panic(expected = "stale leaf record")]
fn test_stale_leaf_panics_without_validation() {
    let config = ArtConfig {
        validate_addresses: false,
        ..ArtConfig::default()
    };
    let mut t = Art::with_config(config).unwrap();
    t.insert(b"a", b"1");
    t.insert(b"b", b"2");
    let stale = t.search(b"a").unwrap().address();
    t.remove(b"a");
    // "b" keeps the page open, so the freed bytes are still in place.
    t.leaf(stale);
}

#[test]
fn test_config_errors() {
    let bad = ArtConfig {
        compaction_threshold: 0.0,
        ..ArtConfig::default()
    };
    assert!(matches!(
        Art::with_config(bad),
        Err(ConfigError::CompactionThreshold(_))
    ));
    let huge = ArtConfig {
        initial_capacity: usize::MAX / 2,
        ..ArtConfig::default()
    };
    assert!(matches!(
        Art::with_config(huge),
        Err(ConfigError::InitialCapacity(_))
    ));
}

#[test]
fn test_needs_compaction() {
    let mut t = Art::new();
    for i in 0..100u32 {
        t.insert(format!("key{:03}", i).as_bytes(), &i.to_be_bytes());
    }
    assert!(!t.needs_compaction());
    for i in 0..80u32 {
        t.remove(format!("key{:03}", i).as_bytes());
    }
    assert!(t.needs_compaction());
    assert!(!t.allocator().fragmentation_list(4).is_empty());
}

#[test]
fn test_dump_mentions_every_key() {
    let mut t = Art::new();
    for k in ["alpha", "beta", "alphabet"] {
        t.insert(k.as_bytes(), b"");
    }
    let out = t.dump();
    assert!(out.starts_with("=== ART (3 keys) ==="));
    for k in ["alpha", "beta", "alphabet"] {
        assert!(out.contains(&format!("{:?}", k)), "{}", out);
    }
}

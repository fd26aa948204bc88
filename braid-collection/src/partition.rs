use std::any::Any;
use std::collections::hash_map::{DefaultHasher, Entry};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use braid::deferred::{apply_each, tree_reduce, Delayed};

/// Reduces each partition locally into a keyed map, then maps the result.
pub fn block_reduce<
    A: Any + Sync + Send + Clone,
    K: Any + Sync + Send + Clone + Hash + Eq,
    B,
    C: Any + Sync + Send + Clone,
    D: 'static + Sync + Send + Clone + Fn() -> B,
    F: 'static + Sync + Send + Clone + Fn(&A) -> K,
    O: 'static + Sync + Send + Clone + Fn(&mut B, &A),
    M: 'static + Sync + Send + Clone + Fn(HashMap<K,B>) -> C,
>(
    defs: &[Delayed<Vec<A>>],
    key: F,
    default: D,
    binop: O,
    map: M
) -> Vec<Delayed<C>> {
    apply_each(defs, move |_idx, vs| {
        let mut reducer = HashMap::new();
        for v in vs.iter() {
            let e = reducer.entry(key(v)).or_insert_with(&default);
            binop(e, v);
        }
        map(reducer)
    })
}

/// Buckets every partition into `partitions` groups by the hash function,
/// returning one group of sub-partitions per target bucket.  A partition
/// count of zero is treated as one.
pub fn split_by_key<
    A: Any + Send + Sync + Clone,
    F: 'static + Sync + Send + Clone + Fn(usize, &A) -> usize
>(
    defs: &[Delayed<Vec<A>>],
    partitions: usize,
    hash_function: F
) -> Vec<Vec<Delayed<Vec<A>>>> {
    let partitions = partitions.max(1);

    // Bucket each partition locally
    let stage1 = apply_each(defs, move |_idx, vs| {
        let mut parts = vec![Vec::new(); partitions];
        for (idx, x) in vs.iter().enumerate() {
            let p = hash_function(idx, x) % partitions;
            parts[p].push(x.clone());
        }
        parts
    });

    // Pull bucket `idx` out of every source partition and regroup
    let mut splits = Vec::with_capacity(partitions);
    for idx in 0usize..partitions {
        let mut group = Vec::with_capacity(stage1.len());
        for s in stage1.iter() {
            group.push(s.apply(move |parts| parts[idx].clone()));
        }
        splits.push(group);
    }
    splits
}

/// Re-partitions data into `partitions` new partitions by the given function.
pub fn partition<
    A: Any + Send + Sync + Clone,
    F: 'static + Sync + Send + Clone + Fn(usize, &A) -> usize
>(
    defs: &[Delayed<Vec<A>>],
    partitions: usize,
    key: F
) -> Vec<Delayed<Vec<A>>> {

    let groups = split_by_key(defs, partitions, key);

    let mut new_chunks = Vec::with_capacity(groups.len());
    for group in groups {
        if let Some(d) = concat(&group) {
            new_chunks.push(d);
        }
    }
    new_chunks
}

/// Buckets partitions by a hashed key so equal keys share a bucket.
pub fn partition_by_key<
    A: Any + Sync + Send + Clone,
    K: Any + Sync + Send + Clone + Hash + Eq,
    F: 'static + Sync + Send + Clone + Fn(&A) -> K
>(
    defs: &[Delayed<Vec<A>>],
    n_chunks: usize,
    key: F
) -> Vec<Vec<Delayed<Vec<A>>>> {
    split_by_key(defs, n_chunks, move |_idx, v| {
        let mut hasher = DefaultHasher::new();
        key(v).hash(&mut hasher);
        hasher.finish() as usize
    })
}

fn merge_maps<
    K: Hash + Eq + Clone,
    V: Clone,
    R: 'static + Sync + Send + Clone + Fn(&mut V, &V)
>(
    left: &HashMap<K, V>,
    right: &HashMap<K, V>,
    reduce: R
) -> HashMap<K, V> {
    let mut out = left.clone();
    for (k, v) in right.iter() {
        match out.entry(k.clone()) {
            Entry::Occupied(mut e) => reduce(e.get_mut(), v),
            Entry::Vacant(e) => { e.insert(v.clone()); }
        }
    }
    out
}

/// Groups values by key and reduces each group: `binop` folds items into a
/// per-partition accumulator, `reduce` merges accumulators across partitions.
pub fn fold_by<
    A: Any + Send + Sync + Clone,
    B: Any + Sync + Send + Clone,
    K: Any + Sync + Send + Clone + Hash + Eq,
    D: 'static + Sync + Send + Clone + Fn() -> B,
    F: 'static + Sync + Send + Clone + Fn(&A) -> K,
    O: 'static + Sync + Send + Clone + Fn(&mut B, &A),
    R: 'static + Sync + Send + Clone + Fn(&mut B, &B)
>(
    defs: &[Delayed<Vec<A>>],
    key: F,
    default: D,
    binop: O,
    reduce: R,
    partitions: usize
) -> Vec<Delayed<Vec<(K,B)>>> {

    if defs.is_empty() {
        return Vec::new();
    }

    if partitions == 1 {
        // Cheaper path: no need to round-trip through Vecs or re-split
        let stage1 = block_reduce(defs, key, default, binop, |x| x);

        let merged = tree_reduce(&stage1, move |l, r| merge_maps(l, r, reduce.clone()));
        match merged {
            Some(d) => {
                vec![d.apply(|hm| {
                    hm.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
                })]
            },
            None => Vec::new()
        }
    } else {
        // Local reduce, split by key, then reduce per target partition
        let stage1 = block_reduce(defs, key, default, binop,
                                  |x| x.into_iter().collect::<Vec<(K,B)>>());

        let chunks = partition_by_key(&stage1, partitions, |x: &(K,B)| x.0.clone());

        let grouped: Vec<_> = chunks.into_iter().map(|chunk| {
            apply_each(&chunk, |_idx, vs| {
                let mut hm = HashMap::new();
                for (k, v) in vs.iter() {
                    hm.insert(k.clone(), v.clone());
                }
                hm
            })
        }).collect();

        let merge = move |l: &HashMap<K,B>, r: &HashMap<K,B>| {
            merge_maps(l, r, reduce.clone())
        };
        let mut out = Vec::new();
        for group in grouped {
            if let Some(d) = tree_reduce(&group, merge.clone()) {
                out.push(d.apply(|hm| {
                    hm.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
                }));
            }
        }
        out
    }
}

/// Concatenates a slice of partitions into one, preserving order.  Returns
/// `None` on an empty slice.
pub fn concat<A: Any + Sync + Send + Clone>(
    defs: &[Delayed<Vec<A>>]
) -> Option<Delayed<Vec<A>>> {
    tree_reduce(defs, |x, y| {
        let mut v: Vec<A> = x.clone();
        v.extend_from_slice(y);
        v
    })
}

/// Inner joins two keyed partitions, producing the cross product for keys
/// with multiple values on both sides.
pub fn join_on_key<
    K: Any + Send + Sync + Clone + Hash + Eq,
    A: Any + Send + Sync,
    B: Any + Send + Sync,
    C: Any + Sync + Send + Clone,
    J: 'static + Sync + Send + Clone + Fn(&A, &B) -> C
>(
    left: &Delayed<Vec<(K, A)>>,
    right: &Delayed<Vec<(K, B)>>,
    joiner: J
) -> Delayed<Vec<(K, C)>> {

    left.join(right, move |ls, rs| {
        // Slurp the left side into a multimap
        let mut hm = HashMap::new();
        for (k, lv) in ls.iter() {
            hm.entry(k).or_insert_with(|| Vec::with_capacity(1)).push(lv);
        }
        let mut out = Vec::new();
        for (k, rv) in rs.iter() {
            if let Some(lvs) = hm.get(k) {
                for lv in lvs.iter() {
                    out.push((k.clone(), joiner(lv, rv)));
                }
            }
        }
        out
    })
}

#[cfg(test)]
mod partition_test {
    use super::*;
    use braid::executor::SerialExecutor;

    #[test]
    fn test_split_round_robin() {
        let defs = vec![Delayed::lift(vec![1, 2, 3, 4, 5usize], None)];
        let splits = split_by_key(&defs, 2, |idx, _v| idx);
        assert_eq!(splits.len(), 2);

        let evens = concat(&splits[0]).unwrap().evaluate(&SerialExecutor).unwrap();
        let odds = concat(&splits[1]).unwrap().evaluate(&SerialExecutor).unwrap();
        assert_eq!(evens, vec![1, 3, 5]);
        assert_eq!(odds, vec![2, 4]);
    }

    #[test]
    fn test_zero_partitions_clamps_to_one() {
        let defs = vec![Delayed::lift(vec![1, 2, 3usize], None)];
        let splits = split_by_key(&defs, 0, |idx, _v| idx);
        assert_eq!(splits.len(), 1);
        let all = concat(&splits[0]).unwrap().evaluate(&SerialExecutor).unwrap();
        assert_eq!(all, vec![1, 2, 3]);
    }

    #[test]
    fn test_partition_groups_preserve_items() {
        let defs = vec![
            Delayed::lift(vec![1, 2, 3usize], None),
            Delayed::lift(vec![4, 5, 6usize], None),
        ];
        let parts = partition(&defs, 3, |_idx, v| v % 3);
        let mut all = Vec::new();
        for p in parts.iter() {
            all.extend(p.evaluate(&SerialExecutor).unwrap());
        }
        all.sort();
        assert_eq!(all, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_fold_by_matches_single_partition() {
        let defs = vec![
            Delayed::lift(vec![1, 2, 3, 1usize], None),
            Delayed::lift(vec![2, 1usize], None),
        ];
        for parts in [1usize, 3] {
            let folded = fold_by(&defs,
                                 |x| *x,
                                 || 0usize,
                                 |acc, _x| *acc += 1,
                                 |acc, other| *acc += other,
                                 parts);
            let mut out = Vec::new();
            for d in folded.iter() {
                out.extend(d.evaluate(&SerialExecutor).unwrap());
            }
            out.sort();
            assert_eq!(out, vec![(1, 3), (2, 2), (3, 1)]);
        }
    }

    #[test]
    fn test_join_on_key_cross_product() {
        let left = Delayed::lift(vec![(1usize, "a"), (1, "b"), (2, "c")], None);
        let right = Delayed::lift(vec![(1usize, 10), (3, 30)], None);
        let joined = join_on_key(&left, &right, |l: &&str, r: &i32| format!("{}{}", l, r));
        let mut out = joined.evaluate(&SerialExecutor).unwrap();
        out.sort();
        assert_eq!(out, vec![(1, "a10".to_owned()), (1, "b10".to_owned())]);
    }
}

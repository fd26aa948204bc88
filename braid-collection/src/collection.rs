//! Collection
//! ---
//! An in-memory, partitioned collection built on `Delayed` task graphs.
//! Every combinator is lazy: it only grows the underlying graph, and nothing
//! runs until `evaluate` is called with an executor.
//!

use std::any::Any;
use std::hash::Hash;

use log::debug;

use braid::deferred::{apply_each, tree_reduce, Delayed};
use braid::error::Error;
use braid::executor::Executor;

use crate::partition::{concat, fold_by, join_on_key, partition, partition_by_key};

/// Partitioned collection of values.  Each partition is a `Delayed<Vec<A>>`;
/// combinators compose per-partition task nodes, so independent partitions
/// run in parallel under a parallel executor.
#[derive(Clone)]
pub struct Collection<A> {
    partitions: Vec<Delayed<Vec<A>>>
}

impl <A: Any + Send + Sync + Clone> Collection<A> {

    /// Creates a Collection from a set of Delayed partitions.
    pub fn from_parts(parts: Vec<Delayed<Vec<A>>>) -> Collection<A> {
        Collection { partitions: parts }
    }

    /// Provides raw access to the underlying Delayed partitions.
    pub fn to_parts(&self) -> &[Delayed<Vec<A>>] {
        &self.partitions
    }

    /// Creates a single-partition Collection from a Vec of items.
    /// ```rust
    ///   use braid::executor::SerialExecutor;
    ///   use braid_collection::Collection;
    ///
    ///   let col = Collection::from_vec(vec![1,2,3usize]);
    ///   assert_eq!(col.evaluate(&SerialExecutor).unwrap(), vec![1,2,3usize]);
    /// ```
    pub fn from_vec(vs: Vec<A>) -> Collection<A> {
        Collection {
            partitions: vec![Delayed::lift(vs, Some("Collection"))]
        }
    }

    /// Returns the current number of data partitions.
    pub fn n_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Concatenates two collections, preserving order.
    /// ```rust
    ///   use braid::executor::SerialExecutor;
    ///   use braid_collection::Collection;
    ///
    ///   let one = Collection::from_vec(vec![1,2,3usize]);
    ///   let two = Collection::from_vec(vec![4usize, 5, 6]);
    ///   let cat = one.concat(&two);
    ///   assert_eq!(cat.evaluate(&SerialExecutor).unwrap(), vec![1,2,3,4,5,6]);
    /// ```
    pub fn concat(&self, other: &Collection<A>) -> Collection<A> {
        let mut nps: Vec<_> = self.partitions.to_vec();
        nps.extend_from_slice(&other.partitions);
        Collection { partitions: nps }
    }

    /// Maps a function over the values in the Collection.
    /// ```rust
    ///   use braid::executor::SerialExecutor;
    ///   use braid_collection::Collection;
    ///
    ///   let strings = Collection::from_vec(vec![1,2,3usize])
    ///       .map(|i| format!("{}", i));
    ///   assert_eq!(strings.evaluate(&SerialExecutor).unwrap(),
    ///     vec!["1".to_owned(), "2".into(), "3".into()]);
    /// ```
    pub fn map<
        B: Any + Send + Sync + Clone,
        F: 'static + Sync + Send + Clone + Fn(&A) -> B
    >(&self, f: F) -> Collection<B> {
        self.emit(move |x, emitter| {
            emitter(f(x))
        })
    }

    /// Filters out items that fail the predicate.
    /// ```rust
    ///   use braid::executor::SerialExecutor;
    ///   use braid_collection::Collection;
    ///
    ///   let odds = Collection::from_vec(vec![1,2,3usize])
    ///       .filter(|x| x % 2 == 1);
    ///   assert_eq!(odds.evaluate(&SerialExecutor).unwrap(), vec![1, 3usize]);
    /// ```
    pub fn filter<
        F: 'static + Sync + Send + Clone + Fn(&A) -> bool
    >(&self, f: F) -> Collection<A> {
        self.emit(move |x, emitter| {
            if f(x) {
                emitter(x.clone())
            }
        })
    }

    /// Maps over all items, optionally emitting new values.  Fuses a chain of
    /// map/filter/flat_map steps into a single task per partition.
    /// ```rust
    ///   use braid::executor::SerialExecutor;
    ///   use braid_collection::Collection;
    ///
    ///   let new = Collection::from_vec(vec![1,2,3usize])
    ///       .emit(|item, emitter| {
    ///           if item % 2 == 0 {
    ///               emitter(format!("{}!", item));
    ///           }
    ///       });
    ///   assert_eq!(new.evaluate(&SerialExecutor).unwrap(), vec!["2!".to_owned()]);
    /// ```
    pub fn emit<
        B: Any + Send + Sync + Clone,
        F: 'static + Sync + Send + Clone + Fn(&A, &mut dyn FnMut(B))
    >(&self, f: F) -> Collection<B> {
        let parts = apply_each(&self.partitions, move |_idx, vs| {
            let mut out = Vec::new();
            for v in vs.iter() {
                f(v, &mut |b| out.push(b));
            }
            out
        });
        Collection { partitions: parts }
    }

    /// Re-partitions the collection into the given number of chunks,
    /// distributing data from each old partition uniformly.
    /// ```rust
    ///   use braid_collection::Collection;
    ///
    ///   let col = Collection::from_vec(vec![1,2,3usize]);
    ///   assert_eq!(col.n_partitions(), 1);
    ///   assert_eq!(col.split(2).n_partitions(), 2);
    /// ```
    pub fn split(&self, n_chunks: usize) -> Collection<A> {
        self.partition(n_chunks, |idx, _k| idx)
    }

    /// Re-partitions data into N new partitions by the given function, whose
    /// return value is taken modulo the partition count.
    /// ```rust
    ///   use braid::executor::SerialExecutor;
    ///   use braid_collection::Collection;
    ///
    ///   let col = Collection::from_vec(vec![1,2,3,4usize])
    ///       .partition(2, |_idx, x| x % 2);
    ///   assert_eq!(col.n_partitions(), 2);
    ///   assert_eq!(col.evaluate(&SerialExecutor).unwrap(), vec![2, 4, 1, 3]);
    /// ```
    pub fn partition<
        F: 'static + Sync + Send + Clone + Fn(usize, &A) -> usize
    >(&self, partitions: usize, f: F) -> Collection<A> {
        let chunks = partition(&self.partitions, partitions, f);
        Collection { partitions: chunks }
    }

    /// Re-partitions values by hashing a key, so equal keys land in the same
    /// partition.
    pub fn partition_by_key<
        K: Any + Sync + Send + Clone + Hash + Eq,
        F: 'static + Sync + Send + Clone + Fn(&A) -> K
    >(&self, n_chunks: usize, key: F) -> Collection<A> {
        let groups = partition_by_key(&self.partitions, n_chunks, key);
        let parts = groups.iter()
            .filter_map(|group| concat(group))
            .collect();
        Collection { partitions: parts }
    }

    /// Groups values by key and reduces each group, a "group by" with a
    /// following reducer.  Values are first combined within each partition
    /// with `binop`; each key is then hashed to one of the new partitions
    /// where the partial aggregates are combined with `reduce`.
    /// ```rust
    ///   use braid::executor::SerialExecutor;
    ///   use braid_collection::Collection;
    ///
    ///   // Sum all odds and evens together
    ///   let mut sums = Collection::from_vec(vec![1,2,3,4,5usize])
    ///       .fold_by(|x| x % 2,
    ///                || 0usize,
    ///                |block_acc, item| { *block_acc += *item },
    ///                |part_acc, other| { *part_acc += *other },
    ///                1)
    ///       .evaluate(&SerialExecutor).unwrap();
    ///   sums.sort();
    ///   assert_eq!(sums, vec![(0, 6), (1, 9)]);
    /// ```
    pub fn fold_by<
        K: Any + Sync + Send + Clone + Hash + Eq,
        B: Any + Sync + Send + Clone,
        D: 'static + Sync + Send + Clone + Fn() -> B,
        F: 'static + Sync + Send + Clone + Fn(&A) -> K,
        O: 'static + Sync + Send + Clone + Fn(&mut B, &A),
        R: 'static + Sync + Send + Clone + Fn(&mut B, &B)
    >(
        &self, key: F, default: D, binop: O, reduce: R, partitions: usize
    ) -> Collection<(K,B)> {
        let parts = fold_by(&self.partitions, key, default, binop,
                            reduce, partitions);
        Collection { partitions: parts }
    }

    /// Sorts values within each partition by a key function.  For a global
    /// sort, re-partition into a single partition first.
    /// ```rust
    ///   use braid::executor::SerialExecutor;
    ///   use braid_collection::Collection;
    ///
    ///   let col = Collection::from_vec(vec![1,2,3,4i32]).sort_by(|x| -*x);
    ///   assert_eq!(col.evaluate(&SerialExecutor).unwrap(), vec![4, 3, 2, 1]);
    /// ```
    pub fn sort_by<
        K: Ord,
        F: 'static + Sync + Send + Clone + Fn(&A) -> K
    >(&self, key: F) -> Collection<A> {
        let parts = apply_each(&self.partitions, move |_idx, vs| {
            let mut out = vs.clone();
            out.sort_by_key(|v| key(v));
            out
        });
        Collection { partitions: parts }
    }

    /// Inner joins two collections by key.  Matching keys with multiple
    /// values on both sides produce their cross product.
    /// ```rust
    ///   use braid::executor::SerialExecutor;
    ///   use braid_collection::Collection;
    ///
    ///   let name_age: Vec<(String,u32)> = vec![("Andrew".into(), 33), ("Leah".into(), 12)];
    ///   let name_money: Vec<(String,f32)> = vec![("Leah".into(), 20.50)];
    ///
    ///   let na = Collection::from_vec(name_age);
    ///   let nm = Collection::from_vec(name_money);
    ///   let joined = na.join_on(&nm,
    ///                           |nax| nax.0.clone(),
    ///                           |nmx| nmx.0.clone(),
    ///                           |nax, nmx| (nax.0.clone(), nax.1, nmx.1),
    ///                           1);
    ///   assert_eq!(joined.evaluate(&SerialExecutor).unwrap(),
    ///           vec![("Leah".into(), ("Leah".into(), 12, 20.50))]);
    /// ```
    pub fn join_on<
        K: Any + Sync + Send + Clone + Hash + Eq,
        B: Any + Sync + Send + Clone,
        C: Any + Sync + Send + Clone,
        KF1: 'static + Sync + Send + Clone + Fn(&A) -> K,
        KF2: 'static + Sync + Send + Clone + Fn(&B) -> K,
        J:   'static + Sync + Send + Clone + Fn(&A, &B) -> C,
    >(
        &self,
        other: &Collection<B>,
        key1: KF1,
        key2: KF2,
        joiner: J,
        partitions: usize,
    ) -> Collection<(K,C)> {
        // Group both sides by a common key so matches share a partition
        let left = self.map(move |x| (key1(x), x.clone()))
            .partition_by_key(partitions, |x| x.0.clone());
        let right = other.map(move |x| (key2(x), x.clone()))
            .partition_by_key(partitions, |x| x.0.clone());

        let mut parts = Vec::with_capacity(left.partitions.len());
        for (l, r) in left.partitions.iter().zip(right.partitions.iter()) {
            parts.push(join_on_key(l, r, joiner.clone()));
        }
        Collection { partitions: parts }
    }

    /// Returns a deferred count of the items in the collection.
    /// ```rust
    ///   use braid::executor::SerialExecutor;
    ///   use braid_collection::Collection;
    ///
    ///   let col = Collection::from_vec(vec![1,2,3,4,5usize]).split(3);
    ///   assert_eq!(col.count().evaluate(&SerialExecutor).unwrap(), 5);
    /// ```
    pub fn count(&self) -> Delayed<usize> {
        let sizes = apply_each(&self.partitions, |_idx, vs| vs.len());
        tree_reduce(&sizes, |x, y| x + y)
            .unwrap_or_else(|| Delayed::lift(0usize, Some("Count")))
    }

    /// Executes the Collection under the given executor, returning all items
    /// in partition order.
    pub fn evaluate<E: Executor>(&self, executor: &E) -> Result<Vec<A>, Error> {
        debug!("evaluating collection with {} partitions", self.partitions.len());
        match concat(&self.partitions) {
            Some(d) => d.evaluate(executor),
            None => Ok(Vec::new())
        }
    }
}

impl <A: Any + Send + Sync + Clone> Collection<Vec<A>> {

    /// Flattens a collection of vectors.
    /// ```rust
    ///   use braid::executor::SerialExecutor;
    ///   use braid_collection::Collection;
    ///
    ///   let flat = Collection::from_vec(vec![vec![1usize,2],vec![3,4]]).flatten();
    ///   assert_eq!(flat.evaluate(&SerialExecutor).unwrap(), vec![1, 2, 3, 4]);
    /// ```
    pub fn flatten(&self) -> Collection<A> {
        self.emit(move |xs, emitter| {
            for x in xs.iter() {
                emitter(x.clone());
            }
        })
    }
}

impl <A: Any + Send + Sync + Clone + Hash + Eq> Collection<A> {

    /// Computes the frequency of each distinct item.
    /// ```rust
    ///   use braid::executor::SerialExecutor;
    ///   use braid_collection::Collection;
    ///
    ///   let mut freqs = Collection::from_vec(vec![1, 2, 1, 5, 1, 2])
    ///       .frequencies(1)
    ///       .evaluate(&SerialExecutor).unwrap();
    ///   freqs.sort();
    ///   assert_eq!(freqs, vec![(1, 3), (2, 2), (5, 1)]);
    /// ```
    pub fn frequencies(&self, partitions: usize) -> Collection<(A, usize)> {
        self.fold_by(|s| s.clone(),
                     || 0usize,
                     |acc, _item| *acc += 1,
                     |acc, other| *acc += *other,
                     partitions)
    }
}

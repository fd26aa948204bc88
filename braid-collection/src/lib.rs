//! braid-collection
//! ---
//! braid-collection is a medium-level dataflow library layered on `braid`
//! task graphs.
//!
//! What is it?
//! ---
//! It provides lazy, partitioned collection operators for data processing
//! tasks.  Every combinator builds task nodes per partition, so a collection
//! split across N partitions runs N-wide under a parallel executor, while the
//! whole pipeline stays a plain value until `evaluate` is called with an
//! explicit executor.
//!
//! Example - Word Count
//! ---
//!
//! ```rust
//! use braid::executor::PoolExecutor;
//! use braid_collection::Collection;
//!
//! env_logger::init();
//!
//! let lines = vec![
//!     "a b a".to_owned(),
//!     "b a".to_owned(),
//! ];
//!
//! let counts = Collection::from_vec(lines)
//!     .emit(|line, emitter| {
//!         for word in line.split_whitespace() {
//!             emitter(word.to_owned());
//!         }
//!     })
//!     .frequencies(2);
//!
//! let mut out = counts.evaluate(&PoolExecutor::new(2)).unwrap();
//! out.sort();
//! assert_eq!(out, vec![("a".to_owned(), 3), ("b".to_owned(), 2)]);
//! ```
//!
//! Example - mean by key
//! ---
//! ```rust
//! use braid::executor::SerialExecutor;
//! use braid_collection::Collection;
//!
//! let obs = vec![("a", 2.0f64), ("b", 6.0), ("a", 4.0)];
//! let mut means = Collection::from_vec(obs)
//!     .fold_by(|x| x.0,
//!              || (0usize, 0.0f64),
//!              |acc, x| { acc.0 += 1; acc.1 += x.1 },
//!              |acc, other| { acc.0 += other.0; acc.1 += other.1 },
//!              1)
//!     .evaluate(&SerialExecutor).unwrap();
//! means.sort_by(|x, y| x.0.cmp(&y.0));
//! let means: Vec<_> = means.into_iter()
//!     .map(|(k, (n, total))| (k, total / n as f64))
//!     .collect();
//! assert_eq!(means, vec![("a", 3.0), ("b", 6.0)]);
//! ```

#![warn(missing_docs)]

/// Defines the Collection primitive and its combinators
pub mod collection;

/// Partition-level helper functions
pub mod partition;

pub use crate::collection::Collection;

//! braid
//!
//! `braid` provides primitives for building deferred, composable computations
//! as a directed acyclic graph of task nodes, and executing them with
//! pluggable executors.
//!
//! What is it?
//! ---
//!
//! A `Delayed` wraps a computation without running it.  Composing `Delayed`
//! values builds up a task graph; nothing executes until the graph is handed
//! to an `Executor`.  Within one evaluation every node runs exactly once, no
//! matter how many downstream nodes consume it, so shared work is never
//! repeated.  There is no ambient scheduler: the executor is an ordinary
//! value passed into `evaluate`, and swapping serial execution for a thread
//! pool is a one-argument change.
//!
//! How to Use It?
//! ---
//!
//! `Delayed` objects are built with a handful of functions:
//!
//! 1. `lift` - wraps a concrete value into a `Delayed`
//! 2. `apply` - applies a function to a `Delayed`, producing a new `Delayed`
//! 3. `join` - combines two `Delayed` objects with a joiner function
//! 4. `gather`/`join_many` - feed a whole slice of `Delayed` objects into one node
//!
//! Example - Hello World!
//! ---
//! ```rust
//! use braid::deferred::Delayed;
//! use braid::executor::SerialExecutor;
//!
//! let hello = Delayed::lift("Hello".to_owned(), None);
//! let world = Delayed::lift("World".to_owned(), None);
//! let world_exclaim = world.apply(|w| format!("{}!", w));
//! let hello_world = hello.join(&world_exclaim, |h, w| format!("{} {}", h, w));
//! assert_eq!(hello_world.evaluate(&SerialExecutor).unwrap(), "Hello World!");
//! ```
//!
//! Example - fan out, fan in
//! ---
//! ```rust
//! use braid::deferred::{Delayed, gather};
//! use braid::executor::PoolExecutor;
//!
//! env_logger::init();
//!
//! let nodes: Vec<_> = (0..3usize)
//!     .map(|x| Delayed::lift(x, None).apply(|x| x + 1))
//!     .collect();
//! let total = gather(&nodes).apply(|xs| xs.iter().sum::<usize>());
//! assert_eq!(total.evaluate(&PoolExecutor::new(2)).unwrap(), 6);
//! ```
//!
//! Failures carry the identity of the node that failed:
//! ```rust
//! use braid::deferred::Delayed;
//! use braid::error::Error;
//! use braid::executor::SerialExecutor;
//!
//! let bad = Delayed::lift(0usize, Some("denominator")).apply(|x| 1 / x);
//! match bad.evaluate(&SerialExecutor) {
//!     Err(Error::Evaluation { node, .. }) => {
//!         assert!(node.name().contains("Apply"));
//!     },
//!     other => panic!("expected failure, got {:?}", other),
//! }
//! ```

#![warn(missing_docs)]

/// Contains the Delayed primitive and composition functions
pub mod deferred;

/// Contains the Executor trait and its implementations
pub mod executor;

/// Contains the library error type
pub mod error;

/// Untyped graph implementation
pub mod graph;

/// Task type erasure
pub mod task;

pub use crate::deferred::Delayed;
pub use crate::error::Error;
pub use crate::executor::{Executor, LeveledExecutor, PoolExecutor, SerialExecutor};

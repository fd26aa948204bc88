use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::Error;
use crate::executor::Executor;
use crate::graph::{Args, Graph, Handle, Input};
use crate::task::{DynFn, DynFn2, DynFnMany, Value};

struct Lift<A>(A);

impl <A: Any + Send + Sync + Clone> Input for Lift<A> {
    fn read(&self) -> Value {
        Box::new(self.0.clone())
    }
}

/// A deferred computation producing a value of type `A`.
///
/// Constructing or composing a `Delayed` never executes anything; it only
/// grows the underlying graph.  `evaluate` hands the graph to an explicit
/// `Executor`, runs every ancestor exactly once, and returns the typed
/// result.  A `Delayed` is immutable and can be evaluated any number of
/// times; each call re-executes its ancestors from scratch.
#[derive(Clone)]
pub struct Delayed<A> {
    graph: Graph,
    handle: Arc<Handle>,
    items: PhantomData<A>
}

impl <A: Any + Send + Sync> Delayed<A> {

    /// Identity of this node, for diagnostics.
    pub fn handle(&self) -> &Arc<Handle> {
        &self.handle
    }

    /// Applies a function to the output of this node, producing a new node.
    pub fn apply<
        B: Any + Send + Sync,
        F: Send + Sync + 'static + Fn(&A) -> B
    >(&self, f: F) -> Delayed<B> {
        let mut ng = self.graph.clone();
        let handle = ng.add_task(
            Args::Single(self.handle.clone()), DynFn::new(f), "Apply");
        Delayed {
            graph: ng,
            handle,
            items: PhantomData
        }
    }

    /// Combines two nodes with a joiner function.
    pub fn join<
        B: Any + Send + Sync,
        C: Any + Send + Sync,
        F: Send + Sync + 'static + Fn(&A, &B) -> C
    >(&self, other: &Delayed<B>, f: F) -> Delayed<C> {
        let mut ng = self.graph.merge(&other.graph);
        let handle = ng.add_task(
            Args::Join(self.handle.clone(), other.handle.clone()),
            DynFn2::new(f), "Join");
        Delayed {
            graph: ng,
            handle,
            items: PhantomData
        }
    }
}

impl <A: Any + Send + Sync + Clone> Delayed<A> {

    /// Lifts a concrete value into a `Delayed`.  The optional name shows up
    /// in error messages and logs.
    pub fn lift(a: A, name: Option<&str>) -> Self {
        let mut graph = Graph::new();
        let handle = graph.add_input(Lift(a), name.unwrap_or("Lift"));
        Delayed {
            graph,
            handle,
            items: PhantomData
        }
    }

    /// Executes the graph under the given executor and returns this node's
    /// value.  Fails with the identity of the offending node if any ancestor
    /// fails.
    pub fn evaluate<E: Executor>(&self, executor: &E) -> Result<A, Error> {
        let mut values = executor.compute(&self.graph, &[self.handle.clone()])?;
        let value = values.remove(0);
        Arc::try_unwrap(value)
            .map_err(|_| Error::MissingOutput { node: self.handle.clone() })
            .and_then(|v| {
                v.downcast_ref::<A>()
                    .map(|x| x.clone())
                    .ok_or_else(|| Error::TypeMismatch { node: self.handle.clone() })
            })
    }
}

/// Combines a slice of same-typed nodes with a single function over all of
/// their outputs.  This is the n-ary counterpart to `join`: the whole slice
/// feeds one downstream node.
pub fn join_many<
    A: Any + Send + Sync + Clone,
    B: Any + Send + Sync,
    F: Send + Sync + 'static + Fn(&[A]) -> B
>(defs: &[Delayed<A>], f: F) -> Option<Delayed<B>> {
    let first = defs.first()?;
    let mut graph = first.graph.clone();
    for d in defs[1..].iter() {
        graph = graph.merge(&d.graph);
    }
    let handles = defs.iter().map(|d| d.handle.clone()).collect();
    let handle = graph.add_task(Args::Many(handles), DynFnMany::new(f), "JoinMany");
    Some(Delayed {
        graph,
        handle,
        items: PhantomData
    })
}

/// Collects a slice of nodes into one node producing a `Vec` of their
/// outputs, in order.  An empty slice yields a lifted empty `Vec`.
pub fn gather<A: Any + Send + Sync + Clone>(defs: &[Delayed<A>]) -> Delayed<Vec<A>> {
    join_many(defs, |xs: &[A]| xs.to_vec())
        .unwrap_or_else(|| Delayed::lift(Vec::new(), Some("Gather")))
}

/// Applies a function to each node in a slice, passing along the index.
pub fn apply_each<
    A: Any + Send + Sync + Clone,
    B: Any + Send + Sync,
    F: 'static + Sync + Send + Clone + Fn(usize, &A) -> B
>(defs: &[Delayed<A>], f: F) -> Vec<Delayed<B>> {
    let mut nps = Vec::with_capacity(defs.len());
    for (idx, d) in defs.iter().enumerate() {
        let mf = f.clone();
        nps.push(d.apply(move |vs| mf(idx, vs)));
    }
    nps
}

/// Pairwise reduces a slice of nodes down to a single node.
pub fn tree_reduce<
    A: Any + Send + Sync + Clone,
    F: 'static + Sync + Send + Clone + Fn(&A, &A) -> A
>(defs: &[Delayed<A>], f: F) -> Option<Delayed<A>> {
    tree_reduce_until(defs, 1, f).map(|mut defs| defs.remove(0))
}

/// Pairwise reduces a slice of nodes until at most `parts` remain.
pub fn tree_reduce_until<
    A: Any + Send + Sync + Clone,
    F: 'static + Sync + Send + Clone + Fn(&A, &A) -> A
>(defs: &[Delayed<A>], parts: usize, f: F) -> Option<Vec<Delayed<A>>> {
    if defs.is_empty() {
        None
    } else if defs.len() <= parts {
        Some(defs.to_vec())
    } else {
        let mut pass = Vec::new();
        for i in (0..defs.len() - 1).step_by(2) {
            pass.push(defs[i].join(&defs[i + 1], f.clone()));
        }
        if defs.len() % 2 == 1 {
            pass.push(defs[defs.len() - 1].clone());
        }
        tree_reduce_until(&pass, parts, f)
    }
}

#[cfg(test)]
mod def_test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::executor::{LeveledExecutor, PoolExecutor, SerialExecutor};

    #[test]
    fn test_lift_is_lazy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let node = Delayed::lift(3usize, None)
            .apply(move |x| { c.fetch_add(1, Ordering::SeqCst); x + 1 });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(node.evaluate(&SerialExecutor).unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_leaf_matches_direct_call() {
        let inc = |x: &usize| x + 1;
        let node = Delayed::lift(7usize, None).apply(inc);
        assert_eq!(node.evaluate(&SerialExecutor).unwrap(), inc(&7));
    }

    #[test]
    fn test_diamond() {
        // a = inc(3), b = double(3), c = add(a, b) == 10
        let three = Delayed::lift(3usize, Some("three"));
        let a = three.apply(|x| x + 1);
        let b = three.apply(|x| 2 * x);
        let c = a.join(&b, |x, y| x + y);
        assert_eq!(c.evaluate(&SerialExecutor).unwrap(), 10);
        assert_eq!(c.evaluate(&LeveledExecutor).unwrap(), 10);
        assert_eq!(c.evaluate(&PoolExecutor::new(2)).unwrap(), 10);
    }

    #[test]
    fn test_shared_node_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let shared = Delayed::lift(5usize, None)
            .apply(move |x| { c.fetch_add(1, Ordering::SeqCst); x * 10 });
        let left = shared.apply(|x| x + 1);
        let right = shared.apply(|x| x + 2);
        let root = left.join(&right, |l, r| l + r);

        assert_eq!(root.evaluate(&SerialExecutor).unwrap(), 103);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A second evaluate re-executes ancestors
        assert_eq!(root.evaluate(&SerialExecutor).unwrap(), 103);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_gather_sum() {
        let defs: Vec<_> = (0..3usize)
            .map(|x| Delayed::lift(x, None).apply(|x| x + 1))
            .collect();
        let total = gather(&defs).apply(|xs| xs.iter().sum::<usize>());
        assert_eq!(total.evaluate(&SerialExecutor).unwrap(), 6);
    }

    #[test]
    fn test_gather_empty() {
        let defs: Vec<Delayed<usize>> = Vec::new();
        let total = gather(&defs).apply(|xs| xs.iter().sum::<usize>());
        assert_eq!(total.evaluate(&SerialExecutor).unwrap(), 0);
    }

    #[test]
    fn test_join_many_order() {
        let defs: Vec<_> = (0..5usize).map(|x| Delayed::lift(x, None)).collect();
        let digits = join_many(&defs, |xs: &[usize]| {
            xs.iter().map(|x| x.to_string()).collect::<Vec<_>>().join("")
        }).unwrap();
        assert_eq!(digits.evaluate(&PoolExecutor::new(4)).unwrap(), "01234");
    }

    #[test]
    fn test_failure_names_failing_node() {
        let bad = Delayed::lift(0usize, Some("zero")).apply(|x| 1 / x);
        let bad_handle = bad.handle().clone();
        let root = bad.apply(|x| x + 1);
        match root.evaluate(&SerialExecutor) {
            Err(Error::Evaluation { node, .. }) => assert_eq!(node, bad_handle),
            other => panic!("expected Evaluation error, got {:?}", other.err())
        }
    }

    #[test]
    fn test_tree_reduce() {
        let v: Vec<_> = (0..999usize)
            .map(|x| Delayed::lift(x, None))
            .collect();

        let expected: usize = (0..999usize).sum();
        let agg = tree_reduce(&v, |x, y| x + y).unwrap();
        assert_eq!(agg.evaluate(&LeveledExecutor).unwrap(), expected);
    }

    #[test]
    fn test_fan_out_example() {
        // Mixed pipeline over a small range
        let mut output = Vec::new();
        for x in 0..10usize {
            let v = Delayed::lift(x, None);
            let a = if x % 2 == 0 { v.apply(|x| x + 1) } else { v.apply(|x| 2 * x) };
            let b = v.apply(|x| 2 * x);
            output.push(a.join(&b, |x, y| x + y));
        }
        let total = gather(&output).apply(|xs| xs.iter().sum::<usize>());

        let expected: usize = (0..10usize)
            .map(|x| if x % 2 == 0 { x + 1 + 2 * x } else { 4 * x })
            .sum();
        assert_eq!(total.evaluate(&SerialExecutor).unwrap(), expected);
        assert_eq!(total.evaluate(&LeveledExecutor).unwrap(), expected);
        assert_eq!(total.evaluate(&PoolExecutor::new(3)).unwrap(), expected);
    }
}

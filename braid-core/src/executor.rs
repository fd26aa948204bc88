use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex};

use jobpool::JobPool;
use log::{debug, trace};
use priority_queue::PriorityQueue;
use rayon::prelude::*;

use crate::error::Error;
use crate::graph::{Args, Graph, Handle, Task};
use crate::task::{DynArgs, Value};

type DepGraph = HashMap<Arc<Handle>, HashSet<Arc<Handle>>>;

/// Executors walk a Graph bottom-up and produce the requested outputs.  Each
/// node runs at most once per `compute` call; intermediate values live in a
/// per-call store and are released once their last consumer has read them.
pub trait Executor {
    /// Runs the graph and returns the values of `outputs`, in order.
    fn compute(&self, graph: &Graph, outputs: &[Arc<Handle>]) -> Result<Vec<Arc<Value>>, Error>;
}

/// Per-compute memoization scope.  Counts track how many consumers still need
/// each value; the final read releases it.
struct DataStore {
    data: HashMap<Arc<Handle>, Arc<Value>>,
    counts: HashMap<Arc<Handle>, usize>
}

impl DataStore {
    fn new(counts: HashMap<Arc<Handle>, usize>) -> Self {
        DataStore { data: HashMap::new(), counts }
    }

    fn get(&mut self, handle: &Arc<Handle>) -> Option<Arc<Value>> {
        let remaining = self.counts.get_mut(handle).map(|c| {
            *c = c.saturating_sub(1);
            *c
        }).unwrap_or(0);

        if remaining == 0 {
            self.data.remove(handle)
        } else {
            self.data.get(handle).cloned()
        }
    }

    fn insert(&mut self, handle: Arc<Handle>, value: Arc<Value>) {
        self.data.insert(handle, value);
    }
}

enum Resolved {
    One(Arc<Value>),
    Two(Arc<Value>, Arc<Value>),
    Many(Vec<Arc<Value>>)
}

impl Resolved {
    fn as_dyn_args(&self) -> DynArgs {
        match self {
            Resolved::One(a) => DynArgs::One(&**a),
            Resolved::Two(a, b) => DynArgs::Two(&**a, &**b),
            Resolved::Many(vs) => DynArgs::Many(vs.iter().map(|v| &**v).collect())
        }
    }
}

fn resolve_args(ds: &mut DataStore, node: &Arc<Handle>, args: &Args) -> Result<Resolved, Error> {
    let missing = || Error::MissingDependency { node: node.clone() };
    match args {
        Args::Single(h) => {
            Ok(Resolved::One(ds.get(h).ok_or_else(missing)?))
        },
        Args::Join(l, r) => {
            let left = ds.get(l).ok_or_else(missing)?;
            let right = ds.get(r).ok_or_else(missing)?;
            Ok(Resolved::Two(left, right))
        },
        Args::Many(hs) => {
            let vs: Result<Vec<_>, Error> = hs.iter()
                .map(|h| ds.get(h).ok_or_else(missing))
                .collect();
            Ok(Resolved::Many(vs?))
        }
    }
}

fn catch_panic<F: FnOnce() -> Option<Value>>(
    node: &Arc<Handle>,
    f: F
) -> Result<Option<Value>, Error> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "task panicked".to_owned()
        };
        Error::Evaluation { node: node.clone(), message }
    })
}

/// Pulls a node's arguments out of the store, runs it, and writes the result
/// back.  Panics inside the wrapped callable are converted to
/// `Error::Evaluation` naming the node.
fn run_node(graph: &Graph, handle: &Arc<Handle>, store: &Mutex<DataStore>) -> Result<(), Error> {
    trace!("running {}", handle);
    let resolved = {
        let ds = &mut *store.lock().unwrap();
        match graph.dependencies.get(handle) {
            Some(Some(args)) => Some(resolve_args(ds, handle, args)?),
            _ => None
        }
    };

    let task = graph.tasks.get(handle)
        .ok_or_else(|| Error::MissingDependency { node: handle.clone() })?;

    let out = match &**task {
        Task::Input(input) => {
            catch_panic(handle, || Some(input.read()))?
        },
        Task::Function(f) => {
            let args = resolved
                .ok_or_else(|| Error::MissingDependency { node: handle.clone() })?;
            catch_panic(handle, || f.eval(args.as_dyn_args()))?
        }
    };

    let value = out.ok_or_else(|| Error::TypeMismatch { node: handle.clone() })?;
    store.lock().unwrap().insert(handle.clone(), Arc::new(value));
    Ok(())
}

// Flattens the graph into inbound and outbound edge maps
fn build_dep_graph(graph: &Graph) -> (DepGraph, DepGraph) {
    let mut inbound: DepGraph = HashMap::new();
    let mut outbound: DepGraph = HashMap::new();
    for (output, args) in graph.dependencies.iter() {
        let mut hs = HashSet::new();
        if let Some(args) = args {
            args.each_handle(|h| { hs.insert(h.clone()); });
        }
        for h in hs.iter() {
            outbound.entry(h.clone())
                .or_insert_with(HashSet::new)
                .insert(output.clone());
        }
        inbound.insert(output.clone(), hs);
    }
    (inbound, outbound)
}

/// Groups nodes into levels with no dependencies between members of the same
/// level.  Returns `Error::Cycle` or `Error::MissingDependency` without
/// executing anything when the graph cannot be fully ordered.
fn topo_levels(inbound: &DepGraph) -> Result<Vec<Vec<Arc<Handle>>>, Error> {
    for (node, deps) in inbound.iter() {
        for dep in deps.iter() {
            if !inbound.contains_key(dep) {
                return Err(Error::MissingDependency { node: node.clone() });
            }
        }
    }

    let mut outbound: DepGraph = HashMap::new();
    for (node, deps) in inbound.iter() {
        for dep in deps.iter() {
            outbound.entry(dep.clone())
                .or_insert_with(HashSet::new)
                .insert(node.clone());
        }
    }

    let mut remaining = inbound.clone();
    let mut cur: Vec<Arc<Handle>> = remaining.iter()
        .filter(|(_, deps)| deps.is_empty())
        .map(|(h, _)| h.clone())
        .collect();

    let mut levels = Vec::new();
    while !cur.is_empty() {
        for h in cur.iter() {
            remaining.remove(h);
        }

        let mut next = Vec::new();
        for h in cur.iter() {
            if let Some(consumers) = outbound.get(h) {
                for node in consumers.iter() {
                    if let Some(deps) = remaining.get_mut(node) {
                        deps.remove(h);
                        if deps.is_empty() {
                            next.push(node.clone());
                        }
                    }
                }
            }
        }

        levels.push(cur);
        cur = next;
    }

    if let Some(node) = remaining.keys().next() {
        return Err(Error::Cycle { node: node.clone() });
    }

    debug!("levels: {}, max width: {}",
           levels.len(),
           levels.iter().map(|l| l.len()).max().unwrap_or(0));
    Ok(levels)
}

// Counts every argument reference, not distinct dependencies, so a node that
// joins a handle with itself holds two reads against it.
fn build_store(graph: &Graph, outputs: &[Arc<Handle>]) -> DataStore {
    let mut counts: HashMap<Arc<Handle>, usize> = HashMap::new();
    for args in graph.dependencies.values() {
        if let Some(args) = args {
            args.each_handle(|h| {
                *counts.entry(h.clone()).or_insert(0) += 1;
            });
        }
    }
    // Outputs get one extra read at collection time
    for h in outputs.iter() {
        *counts.entry(h.clone()).or_insert(0) += 1;
    }
    DataStore::new(counts)
}

fn collect_outputs(
    store: &Mutex<DataStore>,
    outputs: &[Arc<Handle>]
) -> Result<Vec<Arc<Value>>, Error> {
    let ds = &mut *store.lock().unwrap();
    outputs.iter()
        .map(|h| ds.get(h).ok_or_else(|| Error::MissingOutput { node: h.clone() }))
        .collect()
}

/// Single-threaded executor.  Runs the graph in topological order on the
/// calling thread; the reference semantics the parallel executors must match.
pub struct SerialExecutor;

impl Executor for SerialExecutor {

    fn compute(&self, graph: &Graph, outputs: &[Arc<Handle>]) -> Result<Vec<Arc<Value>>, Error> {
        debug!("nodes in graph: {}", graph.tasks.len());
        let (inbound, _outbound) = build_dep_graph(graph);
        let levels = topo_levels(&inbound)?;
        let store = Mutex::new(build_store(graph, outputs));

        for level in levels {
            for handle in level {
                run_node(graph, &handle, &store)?;
            }
        }

        collect_outputs(&store, outputs)
    }
}

/// Runs each topological level in parallel with rayon.  A failing node fails
/// the whole compute once its level finishes draining.
pub struct LeveledExecutor;

impl Executor for LeveledExecutor {

    fn compute(&self, graph: &Graph, outputs: &[Arc<Handle>]) -> Result<Vec<Arc<Value>>, Error> {
        debug!("nodes in graph: {}", graph.tasks.len());
        let (inbound, _outbound) = build_dep_graph(graph);
        let levels = topo_levels(&inbound)?;
        let store = Mutex::new(build_store(graph, outputs));

        for (i, level) in levels.into_iter().enumerate() {
            debug!("running level {} ({} tasks)", i, level.len());
            level.par_iter()
                .map(|handle| run_node(graph, handle, &store))
                .collect::<Result<(), Error>>()?;
        }

        collect_outputs(&store, outputs)
    }
}

/// Greedy thread-pool executor: dispatches any node whose dependencies are
/// satisfied, preferring nodes with the highest fan-out.  On failure it stops
/// dispatching, lets in-flight nodes finish, and returns the first error.
pub struct PoolExecutor(usize);

impl PoolExecutor {
    /// Creates an executor with a fixed number of worker threads.
    pub fn new(n_threads: usize) -> Self {
        PoolExecutor(n_threads.max(1))
    }
}

impl Default for PoolExecutor {
    fn default() -> Self {
        let n = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        PoolExecutor::new(n)
    }
}

impl Executor for PoolExecutor {

    fn compute(&self, graph: &Graph, outputs: &[Arc<Handle>]) -> Result<Vec<Arc<Value>>, Error> {
        debug!("nodes in graph: {}", graph.tasks.len());
        let (inbound, mut outbound) = build_dep_graph(graph);

        // Validates acyclicity before anything runs
        topo_levels(&inbound)?;

        let mut queue = PriorityQueue::new();
        let mut waiting: HashMap<Arc<Handle>, usize> = HashMap::new();
        for (node, deps) in inbound.iter() {
            if deps.is_empty() {
                let fanout = outbound.get(node).map(|s| s.len()).unwrap_or(0);
                queue.push(node.clone(), fanout);
            } else {
                waiting.insert(node.clone(), deps.len());
            }
        }

        let store = Arc::new(Mutex::new(build_store(graph, outputs)));
        let shared = Arc::new(graph.clone());
        let mut failure: Option<Error> = None;
        {
            let mut pool = JobPool::new(self.0);
            let mut free = self.0;
            let (tx, rx) = mpsc::channel();
            loop {
                // Dispatch everything ready, unless a failure is draining
                while free > 0 && failure.is_none() {
                    match queue.pop() {
                        Some((handle, _fanout)) => {
                            trace!("dispatching {}", handle);
                            let g = shared.clone();
                            let s = store.clone();
                            let thread_tx = tx.clone();
                            pool.queue(move || {
                                let res = run_node(&g, &handle, &s);
                                thread_tx.send((handle, res))
                                    .expect("result channel closed");
                            });
                            free -= 1;
                        },
                        None => break
                    }
                }

                if free == self.0 {
                    break;
                }

                let (handle, result) = rx.recv().expect("all workers disconnected");
                trace!("{} finished", handle);
                free += 1;
                match result {
                    Ok(()) => {
                        if let Some(consumers) = outbound.remove(&handle) {
                            for node in consumers {
                                let ready = match waiting.get_mut(&node) {
                                    Some(count) => {
                                        *count -= 1;
                                        *count == 0
                                    },
                                    None => false
                                };
                                if ready {
                                    waiting.remove(&node);
                                    let fanout = outbound.get(&node)
                                        .map(|s| s.len())
                                        .unwrap_or(0);
                                    queue.push(node, fanout);
                                }
                            }
                        }
                    },
                    Err(e) => {
                        debug!("{} failed, draining in-flight work", e.node());
                        if failure.is_none() {
                            failure = Some(e);
                        }
                    }
                }
            }
            pool.shutdown();
        }

        if let Some(e) = failure {
            return Err(e);
        }
        collect_outputs(&store, outputs)
    }
}

#[cfg(test)]
mod exec_test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::graph::Input;
    use crate::task::DynFn;

    struct Lit(usize);

    impl Input for Lit {
        fn read(&self) -> Value {
            Box::new(self.0)
        }
    }

    fn unwrap_usize(vs: Vec<Arc<Value>>) -> usize {
        *vs[0].downcast_ref::<usize>().unwrap()
    }

    #[test]
    fn test_linear_chain() {
        let mut g = Graph::new();
        let a = g.add_input(Lit(1), "one");
        let b = g.add_task(Args::Single(a), DynFn::new(|x: &usize| x + 1), "inc");
        let c = g.add_task(Args::Single(b), DynFn::new(|x: &usize| x * 3), "triple");

        let out = SerialExecutor.compute(&g, &[c]).unwrap();
        assert_eq!(unwrap_usize(out), 6);
    }

    #[test]
    fn test_cycle_detected_before_execution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c1 = calls.clone();
        let c2 = calls.clone();

        let mut g = Graph::new();
        let a = g.add_input(Lit(1), "one");
        let b = g.add_task(Args::Single(a),
                           DynFn::new(move |x: &usize| { c1.fetch_add(1, Ordering::SeqCst); x + 1 }),
                           "b");
        let c = g.add_task(Args::Single(b.clone()),
                           DynFn::new(move |x: &usize| { c2.fetch_add(1, Ordering::SeqCst); x + 1 }),
                           "c");
        // Rewire b to also depend on c, closing a loop
        g.dependencies.insert(b.clone(), Some(Arc::new(Args::Single(c.clone()))));

        let err = SerialExecutor.compute(&g, &[c]).unwrap_err();
        assert!(matches!(err, Error::Cycle { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let err = PoolExecutor::new(2).compute(&g, &[b]).unwrap_err();
        assert!(matches!(err, Error::Cycle { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_dependency() {
        let mut g = Graph::new();
        let a = g.add_input(Lit(1), "one");
        let b = g.add_task(Args::Single(a.clone()), DynFn::new(|x: &usize| x + 1), "inc");
        g.dependencies.remove(&a);
        g.tasks.remove(&a);

        let err = SerialExecutor.compute(&g, &[b]).unwrap_err();
        assert!(matches!(err, Error::MissingDependency { .. }));
    }

    #[test]
    fn test_panic_names_the_node() {
        let mut g = Graph::new();
        let a = g.add_input(Lit(0), "zero");
        let b = g.add_task(Args::Single(a),
                           DynFn::new(|x: &usize| 100usize / x),
                           "div");

        for exec in [&SerialExecutor as &dyn Executor,
                     &LeveledExecutor,
                     &PoolExecutor::new(2)] {
            let err = exec.compute(&g, &[b.clone()]).unwrap_err();
            match err {
                Error::Evaluation { node, .. } => assert_eq!(node, b),
                other => panic!("expected Evaluation, got {:?}", other)
            }
        }
    }

    #[test]
    fn test_shared_dependency_released_after_last_read() {
        let mut g = Graph::new();
        let a = g.add_input(Lit(10), "ten");
        let b = g.add_task(Args::Single(a.clone()), DynFn::new(|x: &usize| x + 1), "inc");
        let c = g.add_task(Args::Single(a.clone()), DynFn::new(|x: &usize| x * 2), "dbl");
        let d = g.add_task(Args::Join(b, c),
                           crate::task::DynFn2::new(|x: &usize, y: &usize| x + y),
                           "add");

        let out = PoolExecutor::new(4).compute(&g, &[d]).unwrap();
        assert_eq!(unwrap_usize(out), 31);
    }

    #[test]
    fn test_wide_graph_pool() {
        let mut g = Graph::new();
        let mut handles = Vec::new();
        for i in 0..64usize {
            let a = g.add_input(Lit(i), "i");
            handles.push(g.add_task(Args::Single(a), DynFn::new(|x: &usize| x * x), "sq"));
        }
        let total = g.add_task(
            Args::Many(handles),
            crate::task::DynFnMany::new(|xs: &[usize]| xs.iter().sum::<usize>()),
            "sum");

        let expected: usize = (0..64usize).map(|x| x * x).sum();
        let out = PoolExecutor::new(8).compute(&g, &[total]).unwrap();
        assert_eq!(unwrap_usize(out), expected);
    }
}

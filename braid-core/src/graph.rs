use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::task::{Value, DynCall};

static GLOBAL_HANDLE_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Interface for providing inputs into the graph, such as lifting a literal
pub trait Input: Send + Sync {
    /// Produces this input's value.
    fn read(&self) -> Value;
}

/// Unique identity of a node in a Graph.  Equality and hashing go through the
/// globally unique id; the name exists purely for diagnostics.
#[derive(Debug,Clone,PartialEq,Eq,Hash)]
pub struct Handle {
    name: String,
    id: usize
}

impl Handle {
    fn new(name: String) -> Self {
        Handle { name, id: GLOBAL_HANDLE_COUNT.fetch_add(1, Ordering::SeqCst) }
    }

    /// Diagnostic name given at construction.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// ADT over node kinds: data generators and data consumers.
pub enum Task {

    /// Node which generates data
    Input(Box<dyn Input>),

    /// Node which consumes upstream data to produce new data
    Function(Box<dyn DynCall>)
}

/// References to the upstream nodes feeding a task.
#[derive(Debug,Clone)]
pub enum Args {

    /// Single upstream node
    Single(Arc<Handle>),

    /// Two upstream nodes, combined by a joiner
    Join(Arc<Handle>, Arc<Handle>),

    /// An ordered list of upstream nodes of the same type
    Many(Vec<Arc<Handle>>)
}

impl Args {
    /// Visits every upstream handle referenced by these args.
    pub fn each_handle<F: FnMut(&Arc<Handle>)>(&self, mut f: F) {
        match self {
            Args::Single(h) => f(h),
            Args::Join(l, r) => { f(l); f(r); },
            Args::Many(hs) => {
                for h in hs.iter() { f(h); }
            }
        }
    }
}

/// Graphs describe the data flow between tasks: which node produces each
/// value and which upstream values it consumes.  Graphs are cheaply cloneable
/// and merge by handle identity, so shared subgraphs are never duplicated.
#[derive(Clone)]
pub struct Graph {

    /// Output handle to task
    pub tasks: HashMap<Arc<Handle>, Arc<Task>>,

    /// Upstream dependencies per node; `None` for inputs
    pub dependencies: HashMap<Arc<Handle>, Option<Arc<Args>>>
}

impl Graph {

    /// Creates an empty Graph
    pub fn new() -> Self {
        Graph {
            tasks: HashMap::new(),
            dependencies: HashMap::new()
        }
    }

    /// Adds a new input into the Graph
    pub fn add_input<I: Input + 'static>(&mut self, input: I, name: &str) -> Arc<Handle> {
        let handle = Arc::new(Handle::new(format!("Input<{}>", name)));
        self.dependencies.insert(handle.clone(), None);
        self.tasks.insert(handle.clone(), Arc::new(Task::Input(Box::new(input))));
        handle
    }

    /// Adds a task with the given upstream args.  No effort is made to ensure
    /// the referenced handles exist within the graph; executors validate that
    /// before running anything.
    pub fn add_task<D: 'static + DynCall>(&mut self, args: Args, task: D, name: &str) -> Arc<Handle> {
        let handle = Arc::new(Handle::new(format!("Task<{}>", name)));
        self.dependencies.insert(handle.clone(), Some(Arc::new(args)));
        self.tasks.insert(handle.clone(), Arc::new(Task::Function(Box::new(task))));
        handle
    }

    /// Unions the tasks and dependencies of two graphs.
    pub fn merge(&self, other: &Graph) -> Graph {
        let mut ng = self.clone();

        for (handle, args) in other.dependencies.iter() {
            if !ng.dependencies.contains_key(handle) {
                ng.dependencies.insert(handle.clone(), args.clone());
            }
        }

        for (handle, task) in other.tasks.iter() {
            if !ng.tasks.contains_key(handle) {
                ng.tasks.insert(handle.clone(), task.clone());
            }
        }
        ng
    }
}

#[cfg(test)]
mod graph_test {
    use super::*;
    use crate::task::DynFn;

    struct Lit(usize);

    impl Input for Lit {
        fn read(&self) -> Value {
            Box::new(self.0)
        }
    }

    #[test]
    fn test_handles_unique() {
        let mut g = Graph::new();
        let a = g.add_input(Lit(1), "a");
        let b = g.add_input(Lit(1), "b");
        assert_ne!(a, b);
    }

    #[test]
    fn test_merge_dedupes_shared() {
        let mut g1 = Graph::new();
        let a = g1.add_input(Lit(1), "shared");
        let mut g2 = g1.clone();
        g1.add_task(Args::Single(a.clone()), DynFn::new(|x: &usize| x + 1), "inc");
        g2.add_task(Args::Single(a.clone()), DynFn::new(|x: &usize| x * 2), "dbl");

        let merged = g1.merge(&g2);
        // One shared input, two distinct tasks
        assert_eq!(merged.tasks.len(), 3);
        assert_eq!(merged.dependencies.len(), 3);
    }
}

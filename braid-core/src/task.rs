use std::any::Any;
use std::marker::PhantomData;

/// Type-erased value passed between tasks.
pub type Value = Box<dyn Any + Send + Sync>;

/// Borrowed, type-erased arguments handed to a task at execution time.
pub enum DynArgs<'a> {
    /// One upstream value
    One(&'a Value),
    /// Two upstream values
    Two(&'a Value, &'a Value),
    /// An ordered list of upstream values
    Many(Vec<&'a Value>)
}

/// Object-safe execution interface.  `eval` returns `None` when the dynamic
/// types or arity of the arguments do not match what the wrapped closure
/// expects.
pub trait DynCall: Send + Sync {
    /// Runs the wrapped closure against erased arguments.
    fn eval(&self, args: DynArgs) -> Option<Value>;
}

/// Erases a one-argument closure.
pub struct DynFn<A,B,F: Fn(&A) -> B>(F, PhantomData<A>, PhantomData<B>);

impl <A,B,F: Fn(&A) -> B> DynFn<A,B,F> {
    /// Wraps the closure.
    pub fn new(f: F) -> Self {
        DynFn(f, PhantomData, PhantomData)
    }
}

impl <A: Any + Send + Sync,
      B: Any + Send + Sync,
      F: Send + Sync + Fn(&A) -> B> DynCall for DynFn<A,B,F> {

    fn eval(&self, args: DynArgs) -> Option<Value> {
        match args {
            DynArgs::One(v) => v.downcast_ref::<A>().map(|a| {
                let b: Value = Box::new(self.0(a));
                b
            }),
            _ => None
        }
    }
}

/// Erases a two-argument closure.
pub struct DynFn2<A,B,C,F: Fn(&A, &B) -> C>(F, PhantomData<(A,B,C)>);

impl <A,B,C,F: Fn(&A, &B) -> C> DynFn2<A,B,C,F> {
    /// Wraps the closure.
    pub fn new(f: F) -> Self {
        DynFn2(f, PhantomData)
    }
}

impl <A: Any + Send + Sync,
      B: Any + Send + Sync,
      C: Any + Send + Sync,
      F: Send + Sync + Fn(&A, &B) -> C> DynCall for DynFn2<A,B,C,F> {

    fn eval(&self, args: DynArgs) -> Option<Value> {
        match args {
            DynArgs::Two(l, r) => {
                l.downcast_ref::<A>().and_then(|a| {
                    r.downcast_ref::<B>().map(|b| {
                        let c: Value = Box::new(self.0(a, b));
                        c
                    })
                })
            },
            _ => None
        }
    }
}

/// Variadic form: every argument must downcast to the same `A`.  Arguments
/// are cloned out of the store so the closure sees a plain slice.
pub struct DynFnMany<A,B,F: Fn(&[A]) -> B>(F, PhantomData<(A,B)>);

impl <A,B,F: Fn(&[A]) -> B> DynFnMany<A,B,F> {
    /// Wraps the closure.
    pub fn new(f: F) -> Self {
        DynFnMany(f, PhantomData)
    }
}

impl <A: Any + Send + Sync + Clone,
      B: Any + Send + Sync,
      F: Send + Sync + Fn(&[A]) -> B> DynCall for DynFnMany<A,B,F> {

    fn eval(&self, args: DynArgs) -> Option<Value> {
        match args {
            DynArgs::Many(vs) => {
                let mut items = Vec::with_capacity(vs.len());
                for v in vs {
                    items.push(v.downcast_ref::<A>()?.clone());
                }
                let b: Value = Box::new(self.0(&items));
                Some(b)
            },
            _ => None
        }
    }
}

#[cfg(test)]
mod dyn_test {
    use super::*;

    #[test]
    fn test_wrong_arity_is_none() {
        let one = DynFn::new(|x: &usize| x + 1);
        let a: Value = Box::new(1usize);
        let b: Value = Box::new(2usize);
        assert!(one.eval(DynArgs::Two(&a, &b)).is_none());
    }

    #[test]
    fn test_wrong_type_is_none() {
        let one = DynFn::new(|x: &usize| x + 1);
        let s: Value = Box::new("nope".to_owned());
        assert!(one.eval(DynArgs::One(&s)).is_none());
    }

    #[test]
    fn test_many() {
        let total = DynFnMany::new(|xs: &[usize]| xs.iter().sum::<usize>());
        let vals: Vec<Value> = (1..4usize).map(|x| {
            let v: Value = Box::new(x);
            v
        }).collect();
        let out = total.eval(DynArgs::Many(vals.iter().collect())).unwrap();
        assert_eq!(out.downcast_ref::<usize>(), Some(&6));
    }
}

//! Memoized members: results kept for the lifetime of their instance

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::activity::{ActivityLog, Outcome};
use crate::args::{CallArgs, Invocation};
use crate::error::{Error, Result};
use crate::keys::{CacheKey, DigestAlgorithm, KeyDeriver};

type Stored = Arc<dyn Any + Send + Sync>;

/// Per-instance memo storage; embed one in every memoizable type
#[derive(Default)]
pub struct MemoStore {
    entries: Mutex<AHashMap<CacheKey, Stored>>,
}

impl MemoStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored value for `key`, or the result of `compute` inserted if absent.
    ///
    /// `compute` runs without the lock held, so memoized members may call
    /// each other on the same instance. If two callers race, the first
    /// inserted value is kept and returned to both.
    pub fn fetch<R, E, F>(&self, key: &CacheKey, compute: F) -> std::result::Result<(R, Outcome), E>
    where
        R: Clone + Send + Sync + 'static,
        E: From<Error>,
        F: FnOnce() -> std::result::Result<R, E>,
    {
        let existing = self.entries.lock().get(key).cloned();
        if let Some(stored) = existing {
            return Ok((downcast(&stored, key)?, Outcome::Hit));
        }

        let value: Stored = Arc::new(compute()?);
        let stored = Arc::clone(self.entries.lock().entry(key.clone()).or_insert(value));
        Ok((downcast(&stored, key)?, Outcome::Miss))
    }

    /// Number of memoized results
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if nothing is memoized
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Forget every memoized result
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

fn downcast<R: Clone + 'static>(stored: &Stored, key: &CacheKey) -> Result<R> {
    stored.downcast_ref::<R>().cloned().ok_or_else(|| {
        Error::InvalidUsage(format!("memoized value for key {} has a different type", key))
    })
}

/// Types that carry a [`MemoStore`]
pub trait Memoizable {
    /// This instance's store
    fn memo_store(&self) -> &MemoStore;
}

type Method<T, A, R, E> = Box<dyn Fn(&T, A) -> std::result::Result<R, E> + Send + Sync>;

/// Declaration options for memoized members
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoizeOptions {
    /// Permit members with parameters; each distinct argument list is
    /// memoized separately
    pub allow_args: bool,
}

/// Wrapper memoizing one member per instance
pub struct Memoized<T, A, R, E = Error> {
    type_name: &'static str,
    member: &'static str,
    deriver: KeyDeriver,
    method: Method<T, A, R, E>,
    activity: Option<Arc<ActivityLog>>,
    _args: PhantomData<fn(A) -> R>,
}

impl<T, A, R> Memoized<T, A, R>
where
    T: Memoizable + 'static,
    A: CallArgs,
    R: Clone + Send + Sync + 'static,
{
    /// Memoize a member without parameters.
    ///
    /// Fails with [`Error::InvalidUsage`] if the member takes arguments.
    pub fn memoize<F>(member: &'static str, method: F) -> Result<Self>
    where
        F: Fn(&T, A) -> R + Send + Sync + 'static,
    {
        Self::with_options(member, MemoizeOptions::default(), infallible(method))
    }

    /// Memoize a member with parameters, per distinct argument list
    pub fn memoize_with_args<F>(member: &'static str, method: F) -> Self
    where
        F: Fn(&T, A) -> R + Send + Sync + 'static,
    {
        Self::declare(member, Box::new(infallible(method)))
    }
}

fn infallible<T, A, R, F>(method: F) -> impl Fn(&T, A) -> Result<R> + Send + Sync + 'static
where
    F: Fn(&T, A) -> R + Send + Sync + 'static,
{
    move |recv: &T, args: A| -> Result<R> { Ok(method(recv, args)) }
}

impl<T, A, R, E> Memoized<T, A, R, E>
where
    T: Memoizable + 'static,
    A: CallArgs,
    R: Clone + Send + Sync + 'static,
    E: From<Error>,
{
    /// Memoize a possibly fallible member. Errors are returned, not memoized.
    pub fn with_options<F>(member: &'static str, options: MemoizeOptions, method: F) -> Result<Self>
    where
        F: Fn(&T, A) -> std::result::Result<R, E> + Send + Sync + 'static,
    {
        if A::ARITY > 0 && !options.allow_args {
            return Err(Error::InvalidUsage(format!(
                "Cannot memoize `{}` with arity {} > 0. Use memoize_with_args instead.",
                member,
                A::ARITY
            )));
        }
        Ok(Self::declare(member, Box::new(method)))
    }

    fn declare(member: &'static str, method: Method<T, A, R, E>) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            member,
            deriver: KeyDeriver::memoized(DigestAlgorithm::default()),
            method,
            activity: None,
            _args: PhantomData,
        }
    }

    /// Name used in keys instead of the Rust type path
    pub fn type_name(mut self, name: &'static str) -> Self {
        self.type_name = name;
        self
    }

    /// Digest used for memo keys
    pub fn digest(mut self, algorithm: DigestAlgorithm) -> Self {
        self.deriver = KeyDeriver::memoized(algorithm);
        self
    }

    /// Report hits and misses to `log`
    pub fn with_activity(mut self, log: Arc<ActivityLog>) -> Self {
        self.activity = Some(log);
        self
    }

    /// Member name
    pub fn member(&self) -> &'static str {
        self.member
    }

    /// Call through the instance's memo store
    pub fn call(&self, recv: &T, args: A) -> std::result::Result<R, E> {
        self.invoke(recv, Invocation::new(args))
    }

    /// Full call path. Rejects attached blocks before touching the store.
    pub fn invoke(&self, recv: &T, invocation: Invocation<A>) -> std::result::Result<R, E> {
        let args = invocation.into_args("memoized")?;
        let derived = self
            .deriver
            .derive(self.type_name, self.member, None, &args.encode()?);

        let (value, outcome) = recv
            .memo_store()
            .fetch(&derived.key, || (self.method)(recv, args))?;

        if let Some(log) = &self.activity {
            log.call(outcome, self.member, &derived);
        }
        Ok(value)
    }
}

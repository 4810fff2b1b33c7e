//! Cacheable members: results shared through the store with a TTL

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::args::{CallArgs, EncodedArgs, Invocation};
use crate::cache::ResultCache;
use crate::error::{Error, Result};
use crate::keys::{DerivedKey, Discriminator, KeyDeriver};
use crate::scope::Scope;

/// A type whose members may be cached
///
/// The name is part of every key, so it must stay stable across releases
/// for entries to survive restarts.
pub trait Cacheable {
    /// Stable type name
    const TYPE_NAME: &'static str;
}

type Method<T, A, R, E> = Box<dyn Fn(&T, A) -> std::result::Result<R, E> + Send + Sync>;
type Accessor<T> = Box<dyn Fn(&T) -> Result<serde_json::Value> + Send + Sync>;

/// Declares a cached member; see [`ResultCache::cacheable`]
pub struct CacheableBuilder<T, A, R, E = Error> {
    cache: Arc<ResultCache>,
    member: &'static str,
    include: Vec<(&'static str, Accessor<T>)>,
    ttl: Option<Duration>,
    method: Method<T, A, R, E>,
}

impl<T, A, R, E> CacheableBuilder<T, A, R, E>
where
    T: Cacheable + 'static,
    A: CallArgs,
    R: Serialize + DeserializeOwned,
    E: From<Error>,
{
    pub(crate) fn new(
        cache: Arc<ResultCache>,
        member: &'static str,
        method: Method<T, A, R, E>,
    ) -> Self {
        Self {
            cache,
            member,
            include: Vec::new(),
            ttl: None,
            method,
        }
    }

    /// Scope entries by an instance attribute. Attributes are read in the
    /// order they are added; instances with equal values share entries.
    pub fn include<V, F>(mut self, attribute: &'static str, accessor: F) -> Self
    where
        V: Serialize,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        let read: Accessor<T> = Box::new(move |recv: &T| -> Result<serde_json::Value> {
            Ok(serde_json::to_value(accessor(recv))?)
        });
        self.include.push((attribute, read));
        self
    }

    /// TTL for this member instead of the cache default
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Finish the declaration and register `T` as a participant
    pub fn build(self) -> CachedMethod<T, A, R, E> {
        self.cache.registry().declare(T::TYPE_NAME);
        CachedMethod {
            cache: self.cache,
            member: self.member,
            include: self.include,
            ttl: self.ttl,
            method: self.method,
            _args: PhantomData,
        }
    }
}

/// Wrapper routing calls of one member through the store
pub struct CachedMethod<T, A, R, E = Error> {
    cache: Arc<ResultCache>,
    member: &'static str,
    include: Vec<(&'static str, Accessor<T>)>,
    ttl: Option<Duration>,
    method: Method<T, A, R, E>,
    _args: PhantomData<fn(A) -> R>,
}

impl<T, A, R, E> CachedMethod<T, A, R, E>
where
    T: Cacheable + 'static,
    A: CallArgs,
    R: Serialize + DeserializeOwned,
    E: From<Error>,
{
    /// Member name
    pub fn member(&self) -> &'static str {
        self.member
    }

    /// Names of the discriminator attributes, in order
    pub fn included_attributes(&self) -> Vec<&'static str> {
        self.include.iter().map(|(name, _)| *name).collect()
    }

    /// Effective TTL
    pub fn ttl(&self) -> Duration {
        self.ttl.unwrap_or(self.cache.config().ttl)
    }

    /// Call under the scope active on this thread (no override outside
    /// warming)
    pub fn call(&self, recv: &T, args: A) -> std::result::Result<R, E> {
        self.invoke(&Scope::current(), recv, Invocation::new(args))
    }

    /// Call honoring the overrides of `scope`
    pub fn call_in(&self, scope: &Scope, recv: &T, args: A) -> std::result::Result<R, E> {
        self.invoke(scope, recv, Invocation::new(args))
    }

    /// Full call path. Rejects attached blocks before touching the store.
    pub fn invoke(
        &self,
        scope: &Scope,
        recv: &T,
        invocation: Invocation<A>,
    ) -> std::result::Result<R, E> {
        let args = invocation.into_args("cached")?;
        let derived = self.derive_key(recv, &args.encode()?)?;

        let (value, outcome) = self.cache.store().fetch_or_compute(
            &derived.key,
            self.ttl(),
            scope,
            || (self.method)(recv, args),
        )?;

        self.cache.activity().call(outcome, self.member, &derived);
        Ok(value)
    }

    /// Key a call of this member on `recv` with `args` maps to
    pub fn key(&self, recv: &T, args: &A) -> Result<DerivedKey> {
        self.derive_key(recv, &args.encode()?)
    }

    /// Drop the stored entry for one call
    pub fn expire(&self, recv: &T, args: &A) -> Result<bool> {
        let derived = self.key(recv, args)?;
        self.cache.store().resolve()?.expire(&derived.key)
    }

    fn derive_key(&self, recv: &T, args: &EncodedArgs) -> Result<DerivedKey> {
        let deriver = KeyDeriver::cached(self.cache.config().digest);
        let discriminator = if self.include.is_empty() {
            None
        } else {
            let values = self
                .include
                .iter()
                .map(|(_, accessor)| accessor(recv))
                .collect::<Result<Vec<_>>>()?;
            Some(Discriminator::new(&EncodedArgs::new(values), deriver.algorithm()))
        };
        Ok(deriver.derive(T::TYPE_NAME, self.member, discriminator.as_ref(), args))
    }
}

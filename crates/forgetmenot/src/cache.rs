//! ResultCache: configuration, store, registry and activity log in one handle

use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::activity::ActivityLog;
use crate::args::CallArgs;
use crate::cacheable::{Cacheable, CacheableBuilder};
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::registry::{Participant, Registry, WarmReport};
use crate::scope::{with_override, StoreOptions};
use crate::store::{CacheStore, StoreAdapter};

static GLOBAL: OnceCell<Arc<ResultCache>> = OnceCell::new();

fn init_global<F>(cell: &OnceCell<Arc<ResultCache>>, load: F) -> Result<Arc<ResultCache>>
where
    F: FnOnce() -> Result<CacheConfig>,
{
    cell.get_or_try_init(|| Ok(Arc::new(ResultCache::new(load()?))))
        .map(Arc::clone)
}

/// Everything cached members of one process (or test) share
pub struct ResultCache {
    config: CacheConfig,
    store: StoreAdapter,
    registry: Registry,
    activity: Arc<ActivityLog>,
}

impl ResultCache {
    /// Cache that resolves its store lazily (explicit, then host fallback)
    pub fn new(config: CacheConfig) -> Self {
        Self::from_parts(config, StoreAdapter::new())
    }

    /// Cache over an explicit store
    pub fn with_store(config: CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        Self::from_parts(config, StoreAdapter::with_store(store))
    }

    fn from_parts(config: CacheConfig, store: StoreAdapter) -> Self {
        let activity = Arc::new(ActivityLog::new(config.log_activity));
        Self {
            config,
            store,
            registry: Registry::new(),
            activity,
        }
    }

    /// Process-wide cache, configured from the environment on first use.
    ///
    /// Fails with [`Error::Configuration`] if a `FORGETMENOT_*` variable is
    /// invalid; nothing is initialized in that case.
    pub fn try_global() -> Result<Arc<ResultCache>> {
        init_global(&GLOBAL, CacheConfig::from_env)
    }

    /// Like [`ResultCache::try_global`], but an invalid environment is logged
    /// at warn level and the process-wide cache starts from
    /// [`CacheConfig::default`] instead.
    pub fn global() -> Arc<ResultCache> {
        let cache = GLOBAL.get_or_init(|| {
            let config = CacheConfig::from_env().unwrap_or_else(|err| {
                warn!("ignoring cache environment: {}", err);
                CacheConfig::default()
            });
            Arc::new(ResultCache::new(config))
        });
        Arc::clone(cache)
    }

    /// Configuration in effect
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Replace the store backend
    pub fn set_store(&self, store: Arc<dyn CacheStore>) {
        self.store.set_store(store);
    }

    /// Store adapter
    pub fn store(&self) -> &StoreAdapter {
        &self.store
    }

    /// Participant registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Activity log and statistics
    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    /// Shared handle to the activity log, for memoized members
    pub fn activity_handle(&self) -> Arc<ActivityLog> {
        Arc::clone(&self.activity)
    }

    /// Toggle hit/miss reporting
    pub fn set_log_activity(&self, enabled: bool) {
        self.activity.set_enabled(enabled);
    }

    /// Declare a cached member of `T`
    pub fn cacheable<T, A, R, F>(
        self: &Arc<Self>,
        member: &'static str,
        method: F,
    ) -> CacheableBuilder<T, A, R>
    where
        T: Cacheable + 'static,
        A: CallArgs,
        R: Serialize + DeserializeOwned,
        F: Fn(&T, A) -> R + Send + Sync + 'static,
    {
        CacheableBuilder::new(
            Arc::clone(self),
            member,
            Box::new(move |recv: &T, args: A| -> Result<R> { Ok(method(recv, args)) }),
        )
    }

    /// Declare a fallible cached member of `T`; errors are returned, not stored
    pub fn try_cacheable<T, A, R, E, F>(
        self: &Arc<Self>,
        member: &'static str,
        method: F,
    ) -> CacheableBuilder<T, A, R, E>
    where
        T: Cacheable + 'static,
        A: CallArgs,
        R: Serialize + DeserializeOwned,
        E: From<Error>,
        F: Fn(&T, A) -> std::result::Result<R, E> + Send + Sync + 'static,
    {
        CacheableBuilder::new(Arc::clone(self), member, Box::new(method))
    }

    /// Register a participant and its warm entry point
    pub fn register(&self, participant: Arc<dyn Participant>) -> bool {
        self.registry.register(participant)
    }

    /// Register `subtype` to be warmed along with `parent`
    pub fn register_subtype(&self, parent: &'static str, subtype: Arc<dyn Participant>) {
        self.registry.register_subtype(parent, subtype);
    }

    /// Force-refresh pass over every participant and its subtypes.
    ///
    /// The forcing scope exists only for the duration of this call. A failing
    /// participant is logged and reported; the others still run.
    pub fn warm<A: CallArgs>(&self, args: A) -> Result<WarmReport> {
        let args = args.encode()?;
        let report = with_override(StoreOptions::force(), |scope| {
            self.registry.warm_all(scope, &args, &self.activity)
        });
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cacheable::CachedMethod;
    use crate::memoize::{MemoStore, Memoizable, Memoized};
    use crate::registry::{Warm, WarmResult};
    use crate::store::tests::MapStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    struct Item {
        calls: Arc<AtomicUsize>,
    }

    impl Cacheable for Item {
        const TYPE_NAME: &'static str = "Item";
    }

    struct ItemWarmer {
        method: Arc<CachedMethod<Item, (String,), String>>,
        calls: Arc<AtomicUsize>,
    }

    impl Participant for ItemWarmer {
        fn type_name(&self) -> &'static str {
            "Item"
        }

        fn cache_warm(&self, warm: &Warm<'_>) -> WarmResult {
            let name: String = warm.arg(0)?.unwrap_or_default();
            let item = Item {
                calls: self.calls.clone(),
            };
            self.method.call_in(warm.scope(), &item, (name,))?;
            Ok(())
        }
    }

    struct Broken;

    impl Participant for Broken {
        fn type_name(&self) -> &'static str {
            "Broken"
        }

        fn cache_warm(&self, _warm: &Warm<'_>) -> WarmResult {
            Err("We're not going to take it".into())
        }
    }

    type Greet = Arc<CachedMethod<Item, (String,), String>>;

    fn setup() -> (Arc<ResultCache>, Greet, Arc<AtomicUsize>) {
        let cache = Arc::new(ResultCache::with_store(
            CacheConfig::default(),
            Arc::new(MapStore::default()),
        ));
        let method = Arc::new(
            cache
                .cacheable("greet", |item: &Item, (name,): (String,)| {
                    item.calls.fetch_add(1, Ordering::SeqCst);
                    format!("hello {}", name)
                })
                .build(),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        cache.register(Arc::new(ItemWarmer {
            method: method.clone(),
            calls: calls.clone(),
        }));
        (cache, method, calls)
    }

    #[test]
    fn test_warm_refreshes_existing_entries() {
        let (cache, method, calls) = setup();
        let item = Item {
            calls: calls.clone(),
        };

        method.call(&item, ("foo".to_string(),)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let report = cache.warm(("foo",)).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.warmed, vec!["Item"]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // No override survives the pass.
        method.call(&item, ("foo".to_string(),)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_warm_continues_past_failures() {
        let (cache, _method, calls) = setup();
        cache.register(Arc::new(Broken));

        let report = cache.warm(("foo",)).unwrap();
        assert_eq!(report.invoked(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.activity().stats().warm_failures(), 1);
    }

    #[test]
    fn test_warm_does_not_force_concurrent_callers() {
        let (cache, method, calls) = setup();
        let item = Item {
            calls: calls.clone(),
        };
        method.call(&item, ("other".to_string(),)).unwrap();

        struct Slow {
            barrier: Arc<Barrier>,
        }

        impl Participant for Slow {
            fn type_name(&self) -> &'static str {
                "Slow"
            }

            fn cache_warm(&self, warm: &Warm<'_>) -> WarmResult {
                assert!(warm.scope().is_forced());
                self.barrier.wait();
                self.barrier.wait();
                Ok(())
            }
        }

        let barrier = Arc::new(Barrier::new(2));
        cache.register(Arc::new(Slow {
            barrier: barrier.clone(),
        }));

        let warmer = {
            let cache = cache.clone();
            std::thread::spawn(move || cache.warm(("foo",)).unwrap())
        };

        barrier.wait();
        // Warm pass is in flight; an unrelated call is still served from the store.
        let before = calls.load(Ordering::SeqCst);
        method.call(&item, ("other".to_string(),)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), before);
        barrier.wait();

        let report = warmer.join().unwrap();
        assert!(report.is_clean());
    }

    struct Summary {
        inner_calls: Arc<AtomicUsize>,
        memo: MemoStore,
    }

    impl Cacheable for Summary {
        const TYPE_NAME: &'static str = "Summary";
    }

    impl Memoizable for Summary {
        fn memo_store(&self) -> &MemoStore {
            &self.memo
        }
    }

    type Member<R> = Arc<CachedMethod<Summary, (), R>>;

    fn nested_members(cache: &Arc<ResultCache>) -> (Member<u64>, Member<String>) {
        let inner: Member<u64> = Arc::new(
            cache
                .cacheable("total", |s: &Summary, ()| {
                    s.inner_calls.fetch_add(1, Ordering::SeqCst) as u64 + 1
                })
                .build(),
        );
        let outer: Member<String> = {
            let inner = inner.clone();
            Arc::new(
                cache
                    .try_cacheable("headline", move |s: &Summary, ()| -> Result<String> {
                        Ok(format!("total={}", inner.call(s, ())?))
                    })
                    .build(),
            )
        };
        (inner, outer)
    }

    struct SummaryWarmer {
        outer: Member<String>,
        inner_calls: Arc<AtomicUsize>,
    }

    impl Participant for SummaryWarmer {
        fn type_name(&self) -> &'static str {
            Summary::TYPE_NAME
        }

        fn cache_warm(&self, warm: &Warm<'_>) -> WarmResult {
            let summary = Summary {
                inner_calls: self.inner_calls.clone(),
                memo: MemoStore::new(),
            };
            self.outer.call_in(warm.scope(), &summary, ())?;
            Ok(())
        }
    }

    #[test]
    fn test_warm_refreshes_cached_calls_nested_in_body() {
        let cache = Arc::new(ResultCache::with_store(
            CacheConfig::default(),
            Arc::new(MapStore::default()),
        ));
        let (inner, outer) = nested_members(&cache);
        let inner_calls = Arc::new(AtomicUsize::new(0));
        cache.register(Arc::new(SummaryWarmer {
            outer: outer.clone(),
            inner_calls: inner_calls.clone(),
        }));
        let summary = Summary {
            inner_calls: inner_calls.clone(),
            memo: MemoStore::new(),
        };

        assert_eq!(outer.call(&summary, ()).unwrap(), "total=1");
        assert_eq!(inner_calls.load(Ordering::SeqCst), 1);

        let report = cache.warm(()).unwrap();
        assert!(report.is_clean());
        assert_eq!(inner_calls.load(Ordering::SeqCst), 2);

        // Both layers now hold the refreshed value.
        assert_eq!(outer.call(&summary, ()).unwrap(), "total=2");
        assert_eq!(inner.call(&summary, ()).unwrap(), 2);
        assert_eq!(inner_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_forcing_scope_reaches_through_memoized_body() {
        let cache = Arc::new(ResultCache::with_store(
            CacheConfig::default(),
            Arc::new(MapStore::default()),
        ));
        let (inner, _outer) = nested_members(&cache);
        let memoized = {
            let inner = inner.clone();
            Memoized::<Summary, (), u64>::with_options(
                "memo_total",
                Default::default(),
                move |s: &Summary, ()| inner.call(s, ()),
            )
            .unwrap()
        };
        let inner_calls = Arc::new(AtomicUsize::new(0));
        let make = || Summary {
            inner_calls: inner_calls.clone(),
            memo: MemoStore::new(),
        };

        assert_eq!(memoized.call(&make(), ()).unwrap(), 1);
        assert_eq!(memoized.call(&make(), ()).unwrap(), 1);

        let refreshed = with_override(StoreOptions::force(), |_| memoized.call(&make(), ()));
        assert_eq!(refreshed.unwrap(), 2);
        assert_eq!(inner_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&ResultCache::global(), &ResultCache::global()));
    }

    #[test]
    fn test_invalid_global_config_is_surfaced_and_not_kept() {
        let cell = OnceCell::new();
        let err = init_global(&cell, || {
            Err(Error::Configuration("FORGETMENOT_TTL_SECS must be a number".to_string()))
        })
        .err().unwrap();
        assert!(err.is_configuration());
        assert!(cell.get().is_none());

        let ttl = std::time::Duration::from_secs(5);
        let cache = init_global(&cell, || Ok(CacheConfig::default().with_ttl(ttl))).unwrap();
        assert_eq!(cache.config().ttl, ttl);
        assert!(Arc::ptr_eq(&cache, cell.get().unwrap()));
    }

    #[test]
    fn test_set_store_after_construction() {
        let cache = Arc::new(ResultCache::new(CacheConfig::default()));
        assert!(cache.store().resolve().err().unwrap().is_configuration());

        cache.set_store(Arc::new(MapStore::default()));
        assert!(cache.store().resolve().is_ok());
    }
}

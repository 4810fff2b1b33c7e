//! # forgetmenot-memstore
//!
//! Bounded in-process store backend for forgetmenot.
//!
//! ## Architecture
//! - **HashMap**: AHash index into a slot vector
//! - **LRU List**: index-linked recency list for O(1) eviction
//! - **Expiry**: per-entry deadline from a pluggable [`Clock`], checked on read
//!
//! [`install_host_fallback`] makes a shared instance the store every
//! `ResultCache` without an explicit store falls back to.

#![warn(missing_docs)]

mod clock;
mod lru;
mod store;

use std::sync::Arc;

use forgetmenot::CacheStore;
use once_cell::sync::Lazy;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{MemoryStore, DEFAULT_CAPACITY};

static SHARED: Lazy<Arc<MemoryStore>> = Lazy::new(|| Arc::new(MemoryStore::default()));

/// The process-wide store handed out as host fallback
pub fn shared() -> Arc<MemoryStore> {
    Arc::clone(&SHARED)
}

/// Install [`shared`] as the host fallback store.
///
/// Returns false if some fallback was already installed.
pub fn install_host_fallback() -> bool {
    forgetmenot::set_host_fallback(host_store)
}

fn host_store() -> Arc<dyn CacheStore> {
    shared()
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgetmenot::{
        CacheConfig, Cacheable, CachedMethod, Participant, ResultCache, Warm, WarmResult,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    struct Greeter {
        computed: Arc<AtomicUsize>,
    }

    impl Cacheable for Greeter {
        const TYPE_NAME: &'static str = "Greeter";
    }

    type Greet = CachedMethod<Greeter, (String,), String>;

    fn greeter_cache(store: Arc<MemoryStore>) -> (Arc<ResultCache>, Greet) {
        let cache = Arc::new(ResultCache::with_store(CacheConfig::default(), store));
        let greet = cache
            .cacheable("greet", |g: &Greeter, (name,): (String,)| {
                g.computed.fetch_add(1, Ordering::SeqCst);
                format!("hello {}", name)
            })
            .ttl(12 * HOUR)
            .build();
        (cache, greet)
    }

    #[test]
    fn test_greet_expires_after_ttl() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemoryStore::with_clock(100, clock.clone()));
        let (_cache, greet) = greeter_cache(store);
        let computed = Arc::new(AtomicUsize::new(0));
        let g = Greeter {
            computed: computed.clone(),
        };

        assert_eq!(greet.call(&g, ("a".to_string(),)).unwrap(), "hello a");
        assert_eq!(greet.call(&g, ("a".to_string(),)).unwrap(), "hello a");
        assert_eq!(computed.load(Ordering::SeqCst), 1);

        assert_eq!(greet.call(&g, ("b".to_string(),)).unwrap(), "hello b");
        assert_eq!(computed.load(Ordering::SeqCst), 2);

        clock.advance(13 * HOUR);
        assert_eq!(greet.call(&g, ("a".to_string(),)).unwrap(), "hello a");
        assert_eq!(computed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_default_ttl_applies_without_member_ttl() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemoryStore::with_clock(100, clock.clone()));
        let cache = Arc::new(ResultCache::with_store(CacheConfig::default(), store));
        let computed = Arc::new(AtomicUsize::new(0));
        let method1 = cache
            .cacheable("method1", |g: &Greeter, ()| {
                g.computed.fetch_add(1, Ordering::SeqCst);
                "method1".to_string()
            })
            .build();
        let g = Greeter {
            computed: computed.clone(),
        };

        method1.call(&g, ()).unwrap();
        clock.advance(11 * HOUR);
        method1.call(&g, ()).unwrap();
        assert_eq!(computed.load(Ordering::SeqCst), 1);

        clock.advance(2 * HOUR);
        method1.call(&g, ()).unwrap();
        assert_eq!(computed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_huge_configured_ttl_is_served_without_expiry() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemoryStore::with_clock(10, clock.clone()));
        let config = CacheConfig::default().with_ttl(Duration::from_secs(u64::MAX));
        let cache = Arc::new(ResultCache::with_store(config, store));
        let computed = Arc::new(AtomicUsize::new(0));
        let method = cache
            .cacheable("forever", |g: &Greeter, ()| {
                g.computed.fetch_add(1, Ordering::SeqCst);
                "kept".to_string()
            })
            .build();
        let g = Greeter {
            computed: computed.clone(),
        };

        assert_eq!(method.call(&g, ()).unwrap(), "kept");
        clock.advance(100_000 * HOUR);
        assert_eq!(method.call(&g, ()).unwrap(), "kept");
        assert_eq!(computed.load(Ordering::SeqCst), 1);
    }

    struct GreeterWarmer {
        greet: Arc<CachedMethod<Greeter, (String,), String>>,
        computed: Arc<AtomicUsize>,
    }

    impl Participant for GreeterWarmer {
        fn type_name(&self) -> &'static str {
            Greeter::TYPE_NAME
        }

        fn cache_warm(&self, warm: &Warm<'_>) -> WarmResult {
            let name: String = warm.arg(0)?.unwrap_or_default();
            let g = Greeter {
                computed: self.computed.clone(),
            };
            self.greet.call_in(warm.scope(), &g, (name,))?;
            Ok(())
        }
    }

    struct Failing {
        name: &'static str,
        called: AtomicUsize,
    }

    impl Participant for Failing {
        fn type_name(&self) -> &'static str {
            self.name
        }

        fn cache_warm(&self, _warm: &Warm<'_>) -> WarmResult {
            self.called.fetch_add(1, Ordering::SeqCst);
            Err("We're not going to take it".into())
        }
    }

    struct Quiet(&'static str);

    impl Participant for Quiet {
        fn type_name(&self) -> &'static str {
            self.0
        }
    }

    #[test]
    fn test_warm_refreshes_through_store_and_isolates_failures() {
        let store = Arc::new(MemoryStore::new(100));
        let (cache, greet) = greeter_cache(store.clone());
        let greet = Arc::new(greet);
        let computed = Arc::new(AtomicUsize::new(0));
        let g = Greeter {
            computed: computed.clone(),
        };

        let broken = Arc::new(Failing {
            name: "TestClassException1",
            called: AtomicUsize::new(0),
        });
        cache.register(broken.clone());
        cache.register(Arc::new(GreeterWarmer {
            greet: greet.clone(),
            computed: computed.clone(),
        }));
        cache.registry().declare("TestClass2");
        cache.register_subtype("TestClass2", Arc::new(Quiet("TestClass3")));

        greet.call(&g, ("foo".to_string(),)).unwrap();
        assert_eq!(computed.load(Ordering::SeqCst), 1);

        let report = cache.warm(("foo",)).unwrap();
        assert_eq!(broken.called.load(Ordering::SeqCst), 1);
        assert_eq!(computed.load(Ordering::SeqCst), 2);
        assert_eq!(report.warmed, vec!["Greeter", "TestClass2", "TestClass3"]);
        assert_eq!(report.failures.len(), 1);

        // Refreshed value is served afterwards without recomputation.
        greet.call(&g, ("foo".to_string(),)).unwrap();
        assert_eq!(computed.load(Ordering::SeqCst), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_host_fallback_is_used_without_explicit_store() {
        install_host_fallback();

        let cache = Arc::new(ResultCache::new(CacheConfig::default()));
        let computed = Arc::new(AtomicUsize::new(0));
        let method = cache
            .cacheable("fallback_probe", |g: &Greeter, ()| {
                g.computed.fetch_add(1, Ordering::SeqCst);
                42u32
            })
            .build();
        let g = Greeter {
            computed: computed.clone(),
        };

        assert_eq!(method.call(&g, ()).unwrap(), 42);
        assert_eq!(method.call(&g, ()).unwrap(), 42);
        assert_eq!(computed.load(Ordering::SeqCst), 1);

        let key = method.key(&g, &()).unwrap().key;
        assert!(shared().get(&key).unwrap().is_some());
    }
}

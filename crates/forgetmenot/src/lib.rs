//! # forgetmenot
//!
//! Memoization and TTL-bounded result caching for methods.
//!
//! ## Architecture
//! - **Keys**: type, optional discriminator digest, member and canonical
//!   arguments, hashed (SHA-1 by default) into a fixed-length key
//! - **Store**: pluggable [`CacheStore`] backend behind a fetch-or-compute adapter
//! - **Wrappers**: [`CachedMethod`] (shared store, TTL) and [`Memoized`]
//!   (per-instance, no expiry)
//! - **Warming**: [`ResultCache::warm`] re-runs every participant's warm entry
//!   point under a forcing [`Scope`], isolating failures
//!
//! ```ignore
//! use std::sync::Arc;
//! use forgetmenot::{Cacheable, CacheConfig, ResultCache};
//!
//! struct Greeter;
//!
//! impl Cacheable for Greeter {
//!     const TYPE_NAME: &'static str = "Greeter";
//! }
//!
//! let cache = Arc::new(ResultCache::with_store(CacheConfig::default(), store));
//! let greet = cache
//!     .cacheable("greet", |_: &Greeter, (name,): (String,)| format!("hello {}", name))
//!     .build();
//!
//! assert_eq!(greet.call(&Greeter, ("a".into(),))?, "hello a");
//! ```

#![warn(missing_docs)]

mod activity;
mod args;
mod cache;
mod cacheable;
mod config;
mod error;
mod keys;
mod memoize;
mod registry;
mod scope;
mod stats;
mod store;

pub use activity::{ActivityEvent, ActivityLog, ActivitySink, Outcome, TracingSink};
pub use args::{Block, CallArgs, EncodedArgs, Invocation};
pub use cache::ResultCache;
pub use cacheable::{CacheableBuilder, Cacheable, CachedMethod};
pub use config::{CacheConfig, DEFAULT_TTL};
pub use error::{BackendError, Error, Result};
pub use keys::{
    derive, CacheKey, DerivedKey, DigestAlgorithm, Discriminator, KeyDeriver, CACHED_NAMESPACE,
    MEMOIZED_NAMESPACE,
};
pub use memoize::{MemoStore, Memoizable, Memoized, MemoizeOptions};
pub use registry::{Participant, Registry, Warm, WarmError, WarmReport, WarmResult};
pub use scope::{with_override, Scope, StoreOptions};
pub use stats::CacheStats;
pub use store::{host_fallback, set_host_fallback, CacheStore, StoreAdapter, StoreFactory};

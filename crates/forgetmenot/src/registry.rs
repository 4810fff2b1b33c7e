//! Participant registry and cache warming

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::activity::ActivityLog;
use crate::args::EncodedArgs;
use crate::error::{Error, Result};
use crate::scope::Scope;

/// Error returned by a warm entry point
pub type WarmError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of a warm entry point
pub type WarmResult = std::result::Result<(), WarmError>;

/// What a warm entry point receives
pub struct Warm<'a> {
    scope: &'a Scope,
    args: &'a EncodedArgs,
}

impl<'a> Warm<'a> {
    /// Forcing scope. It is also active on this thread while the entry
    /// point runs, so plain `call`s refresh their entries as well.
    pub fn scope(&self) -> &'a Scope {
        self.scope
    }

    /// Arguments given to `warm`
    pub fn args(&self) -> &'a EncodedArgs {
        self.args
    }

    /// Decode the warm argument at `index`
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>> {
        self.args.get(index)
    }
}

/// A type that declared cached members
pub trait Participant: Send + Sync {
    /// Stable type name, shared with the type's cache keys
    fn type_name(&self) -> &'static str;

    /// Issue the calls that should be refreshed during warming
    fn cache_warm(&self, _warm: &Warm<'_>) -> WarmResult {
        Ok(())
    }
}

/// Participant with the default no-op warm entry point
struct Declared(&'static str);

impl Participant for Declared {
    fn type_name(&self) -> &'static str {
        self.0
    }
}

/// Outcome of one warm pass
#[derive(Debug, Default)]
pub struct WarmReport {
    /// Participants whose entry point returned successfully
    pub warmed: Vec<&'static str>,
    /// One [`Error::WarmParticipant`] per failed participant
    pub failures: Vec<Error>,
}

impl WarmReport {
    /// True if no participant failed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of participants invoked
    pub fn invoked(&self) -> usize {
        self.warmed.len() + self.failures.len()
    }
}

#[derive(Default)]
struct Inner {
    /// Directly registered type names, in registration order
    registered: Vec<&'static str>,
    /// Entry point per known type, registered or subtype
    hooks: AHashMap<&'static str, Arc<dyn Participant>>,
    /// parent -> subtypes, in declaration order
    subtypes: AHashMap<&'static str, Vec<&'static str>>,
}

/// Append-only set of participants and their subtype relationships
#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `type_name` declared cached members, keeping any
    /// entry point already registered for it.
    ///
    /// Returns true if the type was not yet registered.
    pub fn declare(&self, type_name: &'static str) -> bool {
        let mut inner = self.inner.write();
        inner
            .hooks
            .entry(type_name)
            .or_insert_with(|| Arc::new(Declared(type_name)));
        Self::push_registered(&mut inner, type_name)
    }

    /// Register a participant with its warm entry point.
    ///
    /// Registering a name again replaces its entry point.
    pub fn register(&self, participant: Arc<dyn Participant>) -> bool {
        let name = participant.type_name();
        let mut inner = self.inner.write();
        inner.hooks.insert(name, participant);
        Self::push_registered(&mut inner, name)
    }

    /// Declare `subtype` as a subtype of `parent`. The subtype is warmed
    /// whenever the parent is registered.
    pub fn register_subtype(&self, parent: &'static str, subtype: Arc<dyn Participant>) {
        let name = subtype.type_name();
        let mut inner = self.inner.write();
        inner.hooks.insert(name, subtype);
        let children = inner.subtypes.entry(parent).or_default();
        if !children.contains(&name) {
            children.push(name);
        }
    }

    fn push_registered(inner: &mut Inner, name: &'static str) -> bool {
        if inner.registered.contains(&name) {
            false
        } else {
            inner.registered.push(name);
            true
        }
    }

    /// Whether `type_name` was registered directly
    pub fn contains(&self, type_name: &str) -> bool {
        self.inner.read().registered.iter().any(|n| *n == type_name)
    }

    /// Directly registered participants
    pub fn participants(&self) -> Vec<&'static str> {
        self.inner.read().registered.clone()
    }

    /// Registered participants plus all of their subtypes, transitively,
    /// each listed once
    pub fn participants_and_subtypes(&self) -> Vec<&'static str> {
        let inner = self.inner.read();
        let mut seen = AHashSet::new();
        let mut out = Vec::new();

        for root in &inner.registered {
            let mut stack = vec![*root];
            while let Some(name) = stack.pop() {
                if !seen.insert(name) {
                    continue;
                }
                out.push(name);
                if let Some(children) = inner.subtypes.get(name) {
                    stack.extend(children.iter().rev().copied());
                }
            }
        }
        out
    }

    /// Invoke every participant's warm entry point once, isolating failures.
    pub(crate) fn warm_all(
        &self,
        scope: &Scope,
        args: &EncodedArgs,
        activity: &ActivityLog,
    ) -> WarmReport {
        // Snapshot so entry points may declare new members while we iterate.
        let targets: Vec<Arc<dyn Participant>> = {
            let names = self.participants_and_subtypes();
            let inner = self.inner.read();
            names
                .iter()
                .filter_map(|name| inner.hooks.get(name).cloned())
                .collect()
        };

        info!(participants = targets.len(), "warming caches");

        let warm = Warm { scope, args };
        let mut report = WarmReport::default();
        for participant in targets {
            let name = participant.type_name();
            debug!(participant = name, "warming participant");

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| participant.cache_warm(&warm)));
            let detail = match outcome {
                Ok(Ok(())) => {
                    report.warmed.push(name);
                    continue;
                }
                Ok(Err(err)) => error_chain(err.as_ref()),
                Err(payload) => panic_message(payload.as_ref()),
            };

            let failure = Error::WarmParticipant {
                participant: name,
                detail,
            };
            activity.warm_failure(name, &failure);
            report.failures.push(failure);
        }
        report
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked".to_string()
    }
}

//! Call-scoped store option overrides
//!
//! A [`Scope`] is an explicit value handed down the call chain. While a
//! scope's body runs it is also active on the current thread, so cached
//! calls made synchronously underneath it (including plain `call`s inside a
//! cached body) see the same overrides. Other threads never do, and the
//! previous scope is restored on every exit path.

use std::cell::Cell;

thread_local! {
    static ACTIVE: Cell<StoreOptions> = Cell::new(StoreOptions::default());
}

/// Store options that a scope may override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreOptions {
    /// Skip the read path and always recompute, writing the fresh result back
    pub force: bool,
}

impl StoreOptions {
    /// Options that force a refresh
    pub fn force() -> Self {
        Self { force: true }
    }
}

/// Override context for one operation
#[derive(Debug, Default)]
pub struct Scope {
    options: StoreOptions,
}

impl Scope {
    /// Scope without overrides
    pub fn none() -> Self {
        Self::default()
    }

    /// The scope active on this thread; [`Scope::none`] outside any override
    pub fn current() -> Self {
        Self {
            options: ACTIVE.with(Cell::get),
        }
    }

    /// Active overrides
    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// True when this scope forces recomputation
    pub fn is_forced(&self) -> bool {
        self.options.force
    }

    /// Make this scope the active one until the guard drops
    pub(crate) fn enter(&self) -> ActiveScope {
        let previous = ACTIVE.with(|active| active.replace(self.options));
        ActiveScope { previous }
    }
}

/// Restores the previously active scope on drop
pub(crate) struct ActiveScope {
    previous: StoreOptions,
}

impl Drop for ActiveScope {
    fn drop(&mut self) {
        ACTIVE.with(|active| active.set(self.previous));
    }
}

/// Run `body` with `options` visible through the scope it receives.
///
/// The scope is owned by this frame and stays active on the current thread
/// until `body` returns or unwinds.
pub fn with_override<T, F>(options: StoreOptions, body: F) -> T
where
    F: FnOnce(&Scope) -> T,
{
    let scope = Scope { options };
    let _active = scope.enter();
    body(&scope)
}

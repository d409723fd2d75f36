//! Collision-free name allocation for generated code.
//!
//! Every name the compiler injects into the output goes through an [`AliasRegistry`]
//! (or one of its [`ScopedAllocator`] children). A candidate is rejected while it is a
//! reserved word, a name the user's script declares or reads, or a name already handed
//! out; the rejected candidate is retried as `base_1`, `base_2`, ...

use crate::names::NameTables;
use std::collections::{HashMap, HashSet};

/// Suffix added to every fresh name in stable-name mode.
pub const STABLE_NAME_MARKER: &str = "$";

/// Anything that can answer "is this name already spoken for?".
pub trait NameScope {
    fn is_taken(&self, name: &str) -> bool;

    fn marker(&self) -> Option<&'static str>;
}

fn resolve_unique(base: &str, marker: Option<&str>, is_taken: impl Fn(&str) -> bool) -> String {
    let base = match marker {
        Some(marker) => format!("{}{}", base, marker),
        None => base.to_string(),
    };

    let mut candidate = base.clone();
    let mut counter = 1;
    while is_taken(&candidate) {
        candidate = format!("{}_{}", base, counter);
        counter += 1;
    }
    candidate
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROOT REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-compilation alias table.
#[derive(Debug)]
pub struct AliasRegistry<'t> {
    tables: &'t NameTables,
    user_names: HashSet<String>,
    used_names: HashSet<String>,
    aliases: HashMap<String, String>,
    marker: Option<&'static str>,
}

impl<'t> AliasRegistry<'t> {
    pub fn new(tables: &'t NameTables) -> Self {
        Self {
            tables,
            user_names: HashSet::new(),
            used_names: HashSet::new(),
            aliases: HashMap::new(),
            marker: None,
        }
    }

    /// Enable the stable-name mode used for golden output.
    pub fn with_stable_names(mut self, enabled: bool) -> Self {
        self.marker = enabled.then_some(STABLE_NAME_MARKER);
        self
    }

    pub fn tables(&self) -> &'t NameTables {
        self.tables
    }

    /// Protect a name declared or read by user code.
    pub fn add_user_name(&mut self, name: impl Into<String>) {
        self.user_names.insert(name.into());
    }

    pub fn add_user_names<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.add_user_name(name);
        }
    }

    pub fn is_user_name(&self, name: &str) -> bool {
        self.user_names.contains(name)
    }

    /// Emitted name for `logical`. Memoized: the same logical name always yields the
    /// same emitted name within one registry.
    pub fn alias(&mut self, logical: &str) -> String {
        if let Some(existing) = self.aliases.get(logical) {
            return existing.clone();
        }
        let emitted = self.unique_name(logical);
        self.aliases.insert(logical.to_string(), emitted.clone());
        emitted
    }

    /// Allocate a fresh name derived from `base`. Never memoized.
    pub fn unique_name(&mut self, base: &str) -> String {
        let name = resolve_unique(base, self.marker, |candidate| self.is_taken(candidate));
        tracing::trace!(base, name = name.as_str(), "allocated name");
        self.used_names.insert(name.clone());
        name
    }

    /// Child allocator for temporaries local to one generated region.
    ///
    /// Every catalogue helper is aliased first, so a helper referenced by later emission
    /// resolves to a name the child already treats as taken.
    pub fn child_allocator(&mut self) -> ScopedAllocator<'_> {
        self.reserve_helpers();
        ScopedAllocator {
            parent: self,
            local: HashSet::new(),
        }
    }

    /// Alias every catalogue helper, in sorted order. Idempotent.
    pub fn reserve_helpers(&mut self) {
        let mut helpers: Vec<&str> = self.tables.helpers().collect();
        helpers.sort_unstable();
        for helper in helpers {
            self.alias(helper);
        }
    }

    /// Logical → emitted pairs allocated so far, in no particular order.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl NameScope for AliasRegistry<'_> {
    fn is_taken(&self, name: &str) -> bool {
        self.tables.is_reserved(name)
            || self.user_names.contains(name)
            || self.used_names.contains(name)
    }

    fn marker(&self) -> Option<&'static str> {
        self.marker
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPED ALLOCATORS
// ═══════════════════════════════════════════════════════════════════════════════

/// An allocator whose names are private to one region of generated code.
///
/// It sees every name its parent has taken, but nothing it allocates is visible to the
/// parent or to sibling allocators.
pub struct ScopedAllocator<'p> {
    parent: &'p dyn NameScope,
    local: HashSet<String>,
}

impl<'p> ScopedAllocator<'p> {
    pub fn unique_name(&mut self, base: &str) -> String {
        let name = resolve_unique(base, self.parent.marker(), |candidate| {
            self.is_taken(candidate)
        });
        tracing::trace!(base, name = name.as_str(), "allocated scoped name");
        self.local.insert(name.clone());
        name
    }

    /// Reserve a name inside this region without allocating it (e.g. a loop context).
    pub fn reserve(&mut self, name: impl Into<String>) {
        self.local.insert(name.into());
    }

    pub fn child(&self) -> ScopedAllocator<'_> {
        ScopedAllocator {
            parent: self,
            local: HashSet::new(),
        }
    }
}

impl NameScope for ScopedAllocator<'_> {
    fn is_taken(&self, name: &str) -> bool {
        self.local.contains(name) || self.parent.is_taken(name)
    }

    fn marker(&self) -> Option<&'static str> {
        self.parent.marker()
    }
}

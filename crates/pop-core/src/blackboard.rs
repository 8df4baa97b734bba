//! Shared memory for the goal engine.
//!
//! Values are stored under a typed key inside a [`Scope`]: global, per entity, or per action
//! node of an entity. Lookups through [`Blackboard::get`] fall back from the action scope to the
//! entity scope to the global scope, so a node can read facts that a sibling published into
//! their shared parent scope as well as facts every pop knows.
//!
//! Next to the scoped values lives a flat resource-location index keyed by
//! `resource_location:<category>[:<name>]`. Entries are append-only (deduplicated) unless a
//! caller removes them explicitly; nothing expires.

use std::any::Any;
use std::collections::BTreeMap;
use std::marker::PhantomData;

use crate::Location;

/// Prefix of every key in the resource-location index.
pub const RESOURCE_LOCATION_PREFIX: &str = "resource_location:";

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BbKey<T: 'static> {
    id: u64,
    _phantom: PhantomData<fn() -> T>,
}

impl<T: 'static> Copy for BbKey<T> {}

impl<T: 'static> Clone for BbKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: 'static> BbKey<T> {
    pub const fn new(id: u64) -> Self {
        Self {
            id,
            _phantom: PhantomData,
        }
    }

    pub fn id(self) -> u64 {
        self.id
    }
}

/// Handle for one action node's private memory. Allocated by [`Blackboard::allocate_scope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    Global,
    Entity(u64),
    Action { entity: u64, action: ScopeId },
}

#[derive(Default)]
pub struct Blackboard {
    values: BTreeMap<(Scope, u64), Box<dyn Any>>,
    resource_locations: BTreeMap<String, Vec<Location>>,
    next_scope: u64,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.resource_locations.clear();
    }

    /// Hand out a fresh action scope. Ids are never reused within one blackboard.
    pub fn allocate_scope(&mut self) -> ScopeId {
        self.next_scope += 1;
        ScopeId(self.next_scope)
    }

    pub fn contains<T: 'static>(&self, scope: Scope, key: BbKey<T>) -> bool {
        self.values.contains_key(&(scope, key.id))
    }

    pub fn set<T: 'static>(&mut self, scope: Scope, key: BbKey<T>, value: T) {
        self.values.insert((scope, key.id), Box::new(value));
    }

    /// Scoped lookup: action scope first (when both `entity` and `action` are given), then the
    /// entity scope, then the global scope.
    pub fn get<T: 'static>(
        &self,
        key: BbKey<T>,
        entity: Option<u64>,
        action: Option<ScopeId>,
    ) -> Option<&T> {
        if let (Some(entity), Some(action)) = (entity, action) {
            if let Some(v) = self.get_in(Scope::Action { entity, action }, key) {
                return Some(v);
            }
        }
        if let Some(entity) = entity {
            if let Some(v) = self.get_in(Scope::Entity(entity), key) {
                return Some(v);
            }
        }
        self.get_in(Scope::Global, key)
    }

    /// Exact lookup in one scope, no fallback.
    pub fn get_in<T: 'static>(&self, scope: Scope, key: BbKey<T>) -> Option<&T> {
        let value = self.values.get(&(scope, key.id))?;
        value.downcast_ref::<T>().or_else(|| {
            panic!(
                "blackboard type mismatch for key id={} in {:?} (stored type differs from requested)",
                key.id, scope
            )
        })
    }

    pub fn get_mut_in<T: 'static>(&mut self, scope: Scope, key: BbKey<T>) -> Option<&mut T> {
        let value = self.values.get_mut(&(scope, key.id))?;
        value.downcast_mut::<T>().or_else(|| {
            panic!(
                "blackboard type mismatch for key id={} in {:?} (stored type differs from requested)",
                key.id, scope
            )
        })
    }

    pub fn remove<T: 'static>(&mut self, scope: Scope, key: BbKey<T>) -> Option<T> {
        let value = self.values.remove(&(scope, key.id))?;
        value.downcast::<T>().map(|b| *b).ok().or_else(|| {
            panic!(
                "blackboard type mismatch for key id={} in {:?} (stored type differs from requested)",
                key.id, scope
            )
        })
    }

    /// Drop everything stored in one action scope.
    pub fn clear_scope(&mut self, entity: u64, action: ScopeId) {
        let scope = Scope::Action { entity, action };
        self.values.retain(|(s, _), _| *s != scope);
    }

    /// Remember that `resource` (`category` or `category:name`) can be found at `location`.
    ///
    /// Returns `false` when the location was already known.
    pub fn add_resource_location(&mut self, resource: &str, location: Location) -> bool {
        let list = self
            .resource_locations
            .entry(resource_key(resource))
            .or_default();
        if list.contains(&location) {
            return false;
        }
        list.push(location);
        true
    }

    pub fn remove_resource_location(&mut self, resource: &str, location: Location) -> bool {
        let key = resource_key(resource);
        let Some(list) = self.resource_locations.get_mut(&key) else {
            return false;
        };
        let before = list.len();
        list.retain(|l| *l != location);
        let removed = list.len() != before;
        if list.is_empty() {
            self.resource_locations.remove(&key);
        }
        removed
    }

    /// Known locations for `resource`.
    ///
    /// An exact entry wins. Without one, every `resource:<name>` entry is aggregated in key
    /// order, so asking for `wood` returns what was recorded for `wood:oak`, `wood:pine`, ...
    pub fn get_resource_locations(&self, resource: &str) -> Vec<Location> {
        let key = resource_key(resource);
        if let Some(list) = self.resource_locations.get(&key) {
            return list.clone();
        }

        let prefix = format!("{key}:");
        let mut out: Vec<Location> = Vec::new();
        for (_, list) in self
            .resource_locations
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
        {
            for location in list {
                if !out.contains(location) {
                    out.push(*location);
                }
            }
        }
        out
    }
}

fn resource_key(resource: &str) -> String {
    format!("{RESOURCE_LOCATION_PREFIX}{resource}")
}

//! Local cache of device state
//!
//! Values are stored for every entity the device reports on, but they are
//! only readable for watched entities. Storing unconditionally means a zone
//! that becomes watched starts out with whatever the device already pushed.

use crate::protocol::VariableUpdate;
use crate::subscription::StateUpdate;
use crate::types::{canonical_variable, EntityId, SourceId, ZoneId};
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Called with (zone, lowercase variable name, value) on every zone update
pub type ZoneCallback = Arc<dyn Fn(ZoneId, &str, &str) + Send + Sync>;

/// Called with (source, lowercase variable name, value) on every source update
pub type SourceCallback = Arc<dyn Fn(SourceId, &str, &str) + Send + Sync>;

/// Handle returned when registering an observer, used to remove it again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

impl ObserverId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Observers for one kind of entity: an ordered list per key plus a
/// wildcard list that sees every entity.
struct ObserverList<K, F> {
    by_key: HashMap<K, Vec<(ObserverId, F)>>,
    wildcard: Vec<(ObserverId, F)>,
}

impl<K: Eq + Hash, F: Clone> ObserverList<K, F> {
    fn new() -> Self {
        Self {
            by_key: HashMap::new(),
            wildcard: Vec::new(),
        }
    }

    fn add(&mut self, key: Option<K>, callback: F) -> ObserverId {
        let id = ObserverId::new();
        match key {
            Some(key) => self.by_key.entry(key).or_default().push((id, callback)),
            None => self.wildcard.push((id, callback)),
        }
        id
    }

    fn remove(&mut self, key: Option<&K>, id: ObserverId) -> bool {
        let list = match key {
            Some(key) => match self.by_key.get_mut(key) {
                Some(list) => list,
                None => return false,
            },
            None => &mut self.wildcard,
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        before != list.len()
    }

    /// Exact-key observers first, then wildcard observers
    fn matching(&self, key: &K) -> Vec<F> {
        self.by_key
            .get(key)
            .into_iter()
            .flatten()
            .chain(self.wildcard.iter())
            .map(|(_, callback)| callback.clone())
            .collect()
    }
}

type Variables = HashMap<String, String>;

/// Cached variables, watch sets and observers
pub(crate) struct StateCache {
    zones: HashMap<ZoneId, Variables>,
    sources: HashMap<SourceId, Variables>,
    watched_zones: BTreeSet<ZoneId>,
    watched_sources: BTreeSet<SourceId>,
    zone_observers: ObserverList<ZoneId, ZoneCallback>,
    source_observers: ObserverList<SourceId, SourceCallback>,
}

impl StateCache {
    pub(crate) fn new() -> Self {
        Self {
            zones: HashMap::new(),
            sources: HashMap::new(),
            watched_zones: BTreeSet::new(),
            watched_sources: BTreeSet::new(),
            zone_observers: ObserverList::new(),
            source_observers: ObserverList::new(),
        }
    }

    fn variables(&self, entity: EntityId) -> Option<&Variables> {
        match entity {
            EntityId::Zone(id) => self.zones.get(&id),
            EntityId::Source(id) => self.sources.get(&id),
        }
    }

    fn store(&mut self, entity: EntityId, variable: &str, value: &str) {
        let variables = match entity {
            EntityId::Zone(id) => self.zones.entry(id).or_default(),
            EntityId::Source(id) => self.sources.entry(id).or_default(),
        };
        variables.insert(variable.to_string(), value.to_string());
        tracing::debug!(
            "Cache store {}.{} = {}",
            entity.device_str(),
            variable,
            value
        );
    }

    pub(crate) fn is_watched(&self, entity: EntityId) -> bool {
        match entity {
            EntityId::Zone(id) => self.watched_zones.contains(&id),
            EntityId::Source(id) => self.watched_sources.contains(&id),
        }
    }

    /// Cached value of a variable, or `None` if the entity is not watched or
    /// the variable has not been seen
    pub(crate) fn read_cached(&self, entity: EntityId, variable: &str) -> Option<String> {
        if !self.is_watched(entity) {
            return None;
        }
        let variable = canonical_variable(variable);
        let value = self.variables(entity)?.get(&variable)?.clone();
        tracing::debug!(
            "Cache retrieve {}.{} = {}",
            entity.device_str(),
            variable,
            value
        );
        Some(value)
    }

    /// Returns `false` if the entity was already watched
    pub(crate) fn mark_watched(&mut self, entity: EntityId) -> bool {
        match entity {
            EntityId::Zone(id) => self.watched_zones.insert(id),
            EntityId::Source(id) => self.watched_sources.insert(id),
        }
    }

    /// Returns `false` if the entity was not watched
    pub(crate) fn unmark_watched(&mut self, entity: EntityId) -> bool {
        match entity {
            EntityId::Zone(id) => self.watched_zones.remove(&id),
            EntityId::Source(id) => self.watched_sources.remove(&id),
        }
    }
}

/// State cache shared between the I/O task and the client
#[derive(Clone)]
pub(crate) struct SharedCache {
    state: Arc<Mutex<StateCache>>,
    updates: broadcast::Sender<StateUpdate>,
}

impl SharedCache {
    pub(crate) fn new(event_capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(event_capacity);
        Self {
            state: Arc::new(Mutex::new(StateCache::new())),
            updates,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StateCache> {
        // Observers never run under the lock, the maps stay consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store an update and notify observers and subscribers
    ///
    /// Observers run synchronously after the lock is released, so they may
    /// read the cache.
    pub(crate) fn record_update(&self, update: &VariableUpdate) {
        let variable = canonical_variable(&update.variable);
        let value = update.value.as_str();

        match update.entity {
            EntityId::Zone(id) => {
                let observers = {
                    let mut state = self.lock();
                    state.store(update.entity, &variable, value);
                    state.zone_observers.matching(&id)
                };
                for callback in observers {
                    callback(id, &variable, value);
                }
                let _ = self.updates.send(StateUpdate::Zone {
                    id,
                    variable,
                    value: value.to_string(),
                });
            }
            EntityId::Source(id) => {
                let observers = {
                    let mut state = self.lock();
                    state.store(update.entity, &variable, value);
                    state.source_observers.matching(&id)
                };
                for callback in observers {
                    callback(id, &variable, value);
                }
                let _ = self.updates.send(StateUpdate::Source {
                    id,
                    variable,
                    value: value.to_string(),
                });
            }
        }
    }

    pub(crate) fn read_cached(&self, entity: EntityId, variable: &str) -> Option<String> {
        self.lock().read_cached(entity, variable)
    }

    pub(crate) fn mark_watched(&self, entity: EntityId) -> bool {
        self.lock().mark_watched(entity)
    }

    pub(crate) fn unmark_watched(&self, entity: EntityId) -> bool {
        self.lock().unmark_watched(entity)
    }

    pub(crate) fn watched_zones(&self) -> Vec<ZoneId> {
        self.lock().watched_zones.iter().copied().collect()
    }

    pub(crate) fn watched_sources(&self) -> Vec<SourceId> {
        self.lock().watched_sources.iter().copied().collect()
    }

    /// Everything stored for an entity, watched or not
    pub(crate) fn snapshot(&self, entity: EntityId) -> HashMap<String, String> {
        self.lock().variables(entity).cloned().unwrap_or_default()
    }

    pub(crate) fn add_zone_observer(&self, zone: Option<ZoneId>, callback: ZoneCallback) -> ObserverId {
        self.lock().zone_observers.add(zone, callback)
    }

    pub(crate) fn remove_zone_observer(&self, zone: Option<ZoneId>, id: ObserverId) -> bool {
        self.lock().zone_observers.remove(zone.as_ref(), id)
    }

    pub(crate) fn add_source_observer(
        &self,
        source: Option<SourceId>,
        callback: SourceCallback,
    ) -> ObserverId {
        self.lock().source_observers.add(source, callback)
    }

    pub(crate) fn remove_source_observer(&self, source: Option<SourceId>, id: ObserverId) -> bool {
        self.lock().source_observers.remove(source.as_ref(), id)
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StateUpdate> {
        self.updates.subscribe()
    }
}

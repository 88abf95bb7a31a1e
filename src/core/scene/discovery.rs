//=========================================================================
// Observer Discovery
//=========================================================================
//
// Host-side scan that hands scene observers to the dispatcher.
//
// The host decides what "hierarchy", "subtree" and "inactive" mean for
// its object model. `ObserverSet` is a ready-made discovery for hosts
// that register observers explicitly.
//
//=========================================================================

//=== Internal Dependencies ===============================================

use super::{AsyncSceneObserver, SceneKey, SceneObserver};

//=== Discovery Query =====================================================

/// Part of the host's object tree a discovery scan covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryScope {
    /// Everything reachable from the host's root.
    #[default]
    Hierarchy,

    /// Only the subtree owned by the dispatcher.
    Subtree,
}

/// Parameters of a discovery scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryQuery {
    pub scope: DiscoveryScope,

    /// Whether currently inactive objects are included.
    pub include_inactive: bool,
}

impl DiscoveryQuery {
    /// Whole hierarchy, inactive objects included.
    pub fn hierarchy() -> Self {
        Self {
            scope: DiscoveryScope::Hierarchy,
            include_inactive: true,
        }
    }

    /// Owned subtree only, inactive objects included.
    pub fn subtree() -> Self {
        Self {
            scope: DiscoveryScope::Subtree,
            include_inactive: true,
        }
    }

    /// Sets whether inactive objects are included.
    pub fn with_include_inactive(mut self, include_inactive: bool) -> Self {
        self.include_inactive = include_inactive;
        self
    }
}

impl Default for DiscoveryQuery {
    fn default() -> Self {
        Self::hierarchy()
    }
}

//=== Discovery Trait =====================================================

/// Supplies the observers a [`super::SceneDispatcher`] notifies.
///
/// Called once when the dispatcher is built. Returned observers need not
/// be sorted.
pub trait ObserverDiscovery<S: SceneKey> {
    fn discover_observers(&mut self, query: &DiscoveryQuery) -> Vec<Box<dyn SceneObserver<S>>>;

    fn discover_async_observers(
        &mut self,
        query: &DiscoveryQuery,
    ) -> Vec<Box<dyn AsyncSceneObserver<S>>>;
}

//=== Observer Set ========================================================

/// Where an observer lives in the host's tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverPlacement {
    pub in_subtree: bool,
    pub active: bool,
}

impl ObserverPlacement {
    /// Active, outside the dispatcher's subtree.
    pub fn root() -> Self {
        Self {
            in_subtree: false,
            active: true,
        }
    }

    /// Active, inside the dispatcher's subtree.
    pub fn child() -> Self {
        Self {
            in_subtree: true,
            active: true,
        }
    }

    /// Marks the placement inactive.
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    fn matches(&self, query: &DiscoveryQuery) -> bool {
        let in_scope = match query.scope {
            DiscoveryScope::Hierarchy => true,
            DiscoveryScope::Subtree => self.in_subtree,
        };
        in_scope && (query.include_inactive || self.active)
    }
}

/// Explicitly registered observers, handed out by placement.
///
/// Discovery moves matching observers out of the set; observers outside
/// the query stay behind.
pub struct ObserverSet<S: SceneKey> {
    observers: Vec<(ObserverPlacement, Box<dyn SceneObserver<S>>)>,
    async_observers: Vec<(ObserverPlacement, Box<dyn AsyncSceneObserver<S>>)>,
}

impl<S: SceneKey> ObserverSet<S> {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
            async_observers: Vec::new(),
        }
    }

    /// Adds a synchronous observer.
    pub fn add<O>(&mut self, placement: ObserverPlacement, observer: O) -> &mut Self
    where
        O: SceneObserver<S> + 'static,
    {
        self.observers.push((placement, Box::new(observer)));
        self
    }

    /// Adds an asynchronous observer.
    pub fn add_async<O>(&mut self, placement: ObserverPlacement, observer: O) -> &mut Self
    where
        O: AsyncSceneObserver<S> + 'static,
    {
        self.async_observers.push((placement, Box::new(observer)));
        self
    }

    /// Returns the number of observers still in the set.
    pub fn len(&self) -> usize {
        self.observers.len() + self.async_observers.len()
    }

    /// Returns true if the set holds no observers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: SceneKey> Default for ObserverSet<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SceneKey> ObserverDiscovery<S> for ObserverSet<S> {
    fn discover_observers(&mut self, query: &DiscoveryQuery) -> Vec<Box<dyn SceneObserver<S>>> {
        take_matching(&mut self.observers, query)
    }

    fn discover_async_observers(
        &mut self,
        query: &DiscoveryQuery,
    ) -> Vec<Box<dyn AsyncSceneObserver<S>>> {
        take_matching(&mut self.async_observers, query)
    }
}

fn take_matching<T>(entries: &mut Vec<(ObserverPlacement, T)>, query: &DiscoveryQuery) -> Vec<T> {
    let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(entries)
        .into_iter()
        .partition(|(placement, _)| placement.matches(query));

    *entries = rest;
    matching.into_iter().map(|(_, observer)| observer).collect()
}

//=========================================================================
// Tests
//=========================================================================

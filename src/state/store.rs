use super::CompactState;
use crate::PlayerId;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// serializable image of a whole store: packed words plus the active set
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StateSnapshot {
    pub players: Vec<(PlayerId, u32)>,
    pub active: Vec<PlayerId>,
}

/// per-player state keyed by id, plus the set of players still in the
/// round. ordered maps keep iteration deterministic and lookups
/// logarithmic. not internally synchronized; concurrent mutation needs
/// external exclusion.
#[derive(Debug, Default, Clone)]
pub struct StateStore {
    states: BTreeMap<PlayerId, CompactState>,
    active: BTreeSet<PlayerId>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&mut self, id: PlayerId, state: CompactState) {
        self.states.insert(id, state);
        log::trace!("stored state for player {}", id);
    }

    pub fn get(&self, id: PlayerId) -> Option<CompactState> {
        self.states.get(&id).copied()
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut CompactState> {
        self.states.get_mut(&id)
    }

    pub fn add_active(&mut self, id: PlayerId) {
        self.active.insert(id);
    }

    pub fn remove_active(&mut self, id: PlayerId) {
        self.active.remove(&id);
    }

    pub fn is_active(&self, id: PlayerId) -> bool {
        self.active.contains(&id)
    }

    /// active ids in ascending order
    pub fn active_set(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.active.iter().copied()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.active.clear();
        log::debug!("state store cleared");
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            players: self
                .states
                .iter()
                .map(|(id, state)| (*id, u32::from(*state)))
                .collect(),
            active: self.active.iter().copied().collect(),
        }
    }
}

impl From<StateSnapshot> for StateStore {
    fn from(snapshot: StateSnapshot) -> Self {
        Self {
            states: snapshot
                .players
                .into_iter()
                .map(|(id, word)| (id, CompactState::from(word)))
                .collect(),
            active: snapshot.active.into_iter().collect(),
        }
    }
}

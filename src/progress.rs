//! Progress state owned by a tutorial engine session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::access::tabs::TabOrder;
use crate::tutorial::{AccessMode, ProfileTab, TutorialId};

/// Typed completion map. Absent entries read as not completed and an entry
/// once marked never reverts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletedTutorials(BTreeMap<TutorialId, bool>);

impl CompletedTutorials {
    pub fn is_completed(&self, id: TutorialId) -> bool {
        self.0.get(&id).copied().unwrap_or(false)
    }

    /// Mark a tutorial complete. Returns true if this changed the map.
    pub fn mark(&mut self, id: TutorialId) -> bool {
        let previous = self.0.insert(id, true);
        previous != Some(true)
    }

    /// Record an observed value without ever clearing a `true` entry.
    pub fn observe(&mut self, id: TutorialId, completed: bool) {
        let entry = self.0.entry(id).or_insert(false);
        *entry |= completed;
    }

    /// Union with local precedence: local `true` stays, remote `true` is
    /// adopted, remote `false` never overrides a local entry.
    pub fn merge(&mut self, remote: &CompletedTutorials) {
        for (id, completed) in &remote.0 {
            match self.0.get(id) {
                Some(true) => {}
                Some(false) => {
                    if *completed {
                        self.0.insert(*id, true);
                    }
                }
                None => {
                    self.0.insert(*id, *completed);
                }
            }
        }
    }

    pub fn completed_ids(&self) -> impl Iterator<Item = TutorialId> + '_ {
        self.0.iter().filter(|(_, done)| **done).map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.completed_ids().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<TutorialId> for CompletedTutorials {
    fn from_iter<I: IntoIterator<Item = TutorialId>>(iter: I) -> Self {
        Self(iter.into_iter().map(|id| (id, true)).collect())
    }
}

/// Mutable progress of one user on one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    pub active_tutorial: Option<TutorialId>,
    pub current_step_index: usize,
    pub completed: CompletedTutorials,
    pub access_mode: AccessMode,
    pub max_accessed_profile_tab: ProfileTab,
    pub is_paused: bool,
    pub is_busy: bool,
    pub tutorial_passed: bool,
}

impl ProgressState {
    pub fn new(tab_order: &TabOrder) -> Self {
        Self {
            active_tutorial: None,
            current_step_index: 0,
            completed: CompletedTutorials::default(),
            access_mode: AccessMode::default(),
            max_accessed_profile_tab: tab_order.first(),
            is_paused: false,
            is_busy: false,
            tutorial_passed: false,
        }
    }

    pub fn is_tutorial_active(&self) -> bool {
        self.active_tutorial.is_some()
    }

    pub fn is_active(&self, id: TutorialId) -> bool {
        self.active_tutorial == Some(id)
    }

    /// Apply an access-mode change if it is an upgrade. Returns whether
    /// the mode changed.
    pub fn upgrade_access_mode(&mut self, mode: AccessMode) -> bool {
        if mode == self.access_mode || !self.access_mode.can_transition_to(mode) {
            return false;
        }
        self.access_mode = mode;
        true
    }

    /// Raise the profile-tab high-water mark. Never lowers it.
    pub fn raise_max_tab(&mut self, tab: ProfileTab, order: &TabOrder) -> bool {
        let (Some(candidate), Some(current)) = (
            order.position(tab),
            order.position(self.max_accessed_profile_tab),
        ) else {
            return false;
        };
        if candidate <= current {
            return false;
        }
        self.max_accessed_profile_tab = tab;
        true
    }

    /// Drop the active tutorial, keeping everything else.
    pub(crate) fn deactivate(&mut self) {
        self.active_tutorial = None;
        self.current_step_index = 0;
        self.is_paused = false;
        self.is_busy = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tutorial::Track;

    #[test]
    fn absent_reads_as_incomplete() {
        let map = CompletedTutorials::default();
        assert!(!map.is_completed(TutorialId::Messages));
        assert!(map.is_empty());
    }

    #[test]
    fn observe_never_clears() {
        let mut map = CompletedTutorials::default();
        map.observe(TutorialId::Messages, true);
        map.observe(TutorialId::Messages, false);
        assert!(map.is_completed(TutorialId::Messages));
        assert!(!map.mark(TutorialId::Messages));
        assert!(map.mark(TutorialId::Calendar));
    }

    #[test]
    fn merge_prefers_local_progress() {
        let mut local: CompletedTutorials = [TutorialId::Dashboard].into_iter().collect();
        let mut remote = CompletedTutorials::default();
        remote.observe(TutorialId::Dashboard, false);
        remote.observe(TutorialId::Messages, true);
        remote.observe(TutorialId::Calendar, false);

        local.merge(&remote);
        assert!(local.is_completed(TutorialId::Dashboard));
        assert!(local.is_completed(TutorialId::Messages));
        assert!(!local.is_completed(TutorialId::Calendar));
        assert_eq!(local.len(), 2);
    }

    #[test]
    fn completed_serializes_as_object() {
        let map: CompletedTutorials = [TutorialId::ProfileTabs].into_iter().collect();
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json, serde_json::json!({ "profileTabs": true }));
    }

    #[test]
    fn access_mode_upgrades_only() {
        let mut state = ProgressState::new(&TabOrder::for_track(Track::Professional));
        assert!(state.upgrade_access_mode(AccessMode::Team));
        assert!(!state.upgrade_access_mode(AccessMode::Progressive));
        assert!(state.upgrade_access_mode(AccessMode::Full));
        assert!(!state.upgrade_access_mode(AccessMode::Team));
        assert!(!state.upgrade_access_mode(AccessMode::Progressive));
        assert_eq!(state.access_mode, AccessMode::Full);
    }

    #[test]
    fn max_tab_is_monotonic() {
        let order = TabOrder::for_track(Track::Professional);
        let mut state = ProgressState::new(&order);
        assert_eq!(state.max_accessed_profile_tab, ProfileTab::PersonalDetails);
        assert!(state.raise_max_tab(ProfileTab::DocumentUploads, &order));
        assert!(!state.raise_max_tab(ProfileTab::BillingInformation, &order));
        assert!(!state.raise_max_tab(ProfileTab::FacilityCoreDetails, &order));
        assert_eq!(state.max_accessed_profile_tab, ProfileTab::DocumentUploads);
    }
}

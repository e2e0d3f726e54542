//! Progress persistence: the remote document, partial writes, and the
//! restore protocol that never regresses local progress.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod writer;

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;
use crate::progress::{CompletedTutorials, ProgressState};
use crate::tutorial::{AccessMode, ProfileTab, Track, TutorialId};

pub use libsql_backend::LibSqlProgressStore;
pub use memory::MemoryProgressStore;
pub use writer::{ProgressWriter, SaveRequest, spawn_progress_writer};

/// Per-tutorial entry of the stored document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorialRecord {
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Stored progress of one user on one track.
///
/// Identifiers are kept as strings so documents written by other clients
/// with ids this build does not know still round-trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDoc {
    #[serde(default)]
    pub active_tutorial: Option<String>,
    #[serde(default)]
    pub current_step_index: usize,
    #[serde(default)]
    pub tutorials: BTreeMap<String, TutorialRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_accessed_profile_tab: Option<String>,
    /// Whole track finished.
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub tutorial_passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProgressDoc {
    /// Apply a partial write. Completion flags only ever turn on.
    pub fn apply(&mut self, patch: &ProgressPatch, now: DateTime<Utc>) {
        if let Some(active) = &patch.active_tutorial {
            self.active_tutorial = active.clone();
        }
        if let Some(step) = patch.current_step_index {
            self.current_step_index = step;
        }
        for (id, record) in &patch.tutorials {
            let entry = self.tutorials.entry(id.clone()).or_default();
            if record.completed && !entry.completed {
                entry.completed = true;
                entry.completed_at = record.completed_at.or(Some(now));
            }
        }
        if let Some(mode) = &patch.access_mode {
            self.access_mode = Some(mode.clone());
        }
        if let Some(tab) = &patch.max_accessed_profile_tab {
            self.max_accessed_profile_tab = Some(tab.clone());
        }
        if patch.completed == Some(true) {
            self.completed = true;
        }
        if patch.tutorial_passed == Some(true) {
            self.tutorial_passed = true;
        }
        self.updated_at = Some(now);
    }

    /// Typed view of the document. Unknown ids are dropped.
    pub fn interpret(&self) -> RemoteProgress {
        let mut completed = CompletedTutorials::default();
        for (key, record) in &self.tutorials {
            match TutorialId::parse(key) {
                Some(id) => completed.observe(id, record.completed),
                None => debug!(tutorial = %key, "Ignoring unknown tutorial in stored progress"),
            }
        }

        let active = self.active_tutorial.as_deref().and_then(|key| {
            let id = TutorialId::parse(key);
            if id.is_none() {
                debug!(tutorial = %key, "Ignoring unknown active tutorial");
            }
            id.map(|id| (id, self.current_step_index))
        });

        RemoteProgress {
            active,
            completed,
            access_mode: self.access_mode.as_deref().and_then(AccessMode::parse),
            max_accessed_profile_tab: self
                .max_accessed_profile_tab
                .as_deref()
                .and_then(ProfileTab::parse),
            track_completed: self.completed,
            tutorial_passed: self.tutorial_passed,
        }
    }
}

/// Partial document write. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressPatch {
    /// `Some(None)` clears the active tutorial.
    pub active_tutorial: Option<Option<String>>,
    pub current_step_index: Option<usize>,
    pub tutorials: BTreeMap<String, TutorialRecord>,
    pub access_mode: Option<String>,
    pub max_accessed_profile_tab: Option<String>,
    pub completed: Option<bool>,
    pub tutorial_passed: Option<bool>,
}

impl ProgressPatch {
    /// Full snapshot of the local state, so a dropped write is repaired by
    /// the next one.
    pub fn snapshot(state: &ProgressState) -> Self {
        let tutorials = state
            .completed
            .completed_ids()
            .map(|id| {
                (
                    id.to_string(),
                    TutorialRecord {
                        completed: true,
                        completed_at: None,
                    },
                )
            })
            .collect();
        Self {
            active_tutorial: Some(state.active_tutorial.map(|id| id.to_string())),
            current_step_index: Some(state.current_step_index),
            tutorials,
            access_mode: Some(state.access_mode.to_string()),
            max_accessed_profile_tab: Some(state.max_accessed_profile_tab.to_string()),
            completed: state.tutorial_passed.then_some(true),
            tutorial_passed: state.tutorial_passed.then_some(true),
        }
    }

    pub fn clear_active() -> Self {
        Self {
            active_tutorial: Some(None),
            current_step_index: Some(0),
            ..Self::default()
        }
    }
}

/// Typed, lenient reading of a [`ProgressDoc`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteProgress {
    pub active: Option<(TutorialId, usize)>,
    pub completed: CompletedTutorials,
    pub access_mode: Option<AccessMode>,
    pub max_accessed_profile_tab: Option<ProfileTab>,
    pub track_completed: bool,
    pub tutorial_passed: bool,
}

/// Remote progress store keyed by user and track.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn load_progress(
        &self,
        user_id: &str,
        track: Track,
    ) -> Result<Option<ProgressDoc>, StoreError>;

    async fn save_progress(
        &self,
        user_id: &str,
        track: Track,
        patch: &ProgressPatch,
    ) -> Result<(), StoreError>;
}

/// `(tutorial, step)` pairs already adopted from the remote this session.
#[derive(Debug, Clone, Default)]
pub struct RestoreLedger {
    restored: HashSet<(TutorialId, usize)>,
}

impl RestoreLedger {
    pub fn contains(&self, tutorial: TutorialId, step: usize) -> bool {
        self.restored.contains(&(tutorial, step))
    }
}

/// What to do with a remote active position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreDecision {
    NothingSaved,
    /// Local is already at this tutorial, at the saved step or later.
    AlreadyAhead,
    /// The saved tutorial is complete and nothing local needs changing.
    AlreadyCompleted,
    /// The saved tutorial is complete but still active locally.
    Deactivate,
    /// The whole track is finished; the stale remote pointer should go.
    ClearRemoteActive,
    AlreadyRestored,
    Adopt { tutorial: TutorialId, step: usize },
}

/// Decide how to restore the active position. `local.completed` must
/// already include the merged remote completions.
pub fn plan_restore(
    local: &ProgressState,
    remote: &RemoteProgress,
    ledger: &mut RestoreLedger,
) -> RestoreDecision {
    let Some((saved, step)) = remote.active else {
        return RestoreDecision::NothingSaved;
    };
    if local.is_active(saved) && local.current_step_index >= step {
        return RestoreDecision::AlreadyAhead;
    }
    if local.completed.is_completed(saved) {
        return if local.is_active(saved) {
            RestoreDecision::Deactivate
        } else {
            RestoreDecision::AlreadyCompleted
        };
    }
    if remote.track_completed {
        return RestoreDecision::ClearRemoteActive;
    }
    if !ledger.restored.insert((saved, step)) {
        return RestoreDecision::AlreadyRestored;
    }
    RestoreDecision::Adopt {
        tutorial: saved,
        step,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::tabs::TabOrder;

    fn state() -> ProgressState {
        ProgressState::new(&TabOrder::for_track(Track::Professional))
    }

    fn remote_at(tutorial: TutorialId, step: usize) -> RemoteProgress {
        RemoteProgress {
            active: Some((tutorial, step)),
            ..RemoteProgress::default()
        }
    }

    #[test]
    fn doc_uses_camel_case_layout() {
        let json = serde_json::json!({
            "activeTutorial": "profileTabs",
            "currentStepIndex": 2,
            "tutorials": { "dashboard": { "completed": true }, "legacyTour": { "completed": true } },
            "accessMode": "enabled",
            "maxAccessedProfileTab": "billingInformation"
        });
        let doc: ProgressDoc = serde_json::from_value(json).unwrap();
        let remote = doc.interpret();
        assert_eq!(remote.active, Some((TutorialId::ProfileTabs, 2)));
        assert!(remote.completed.is_completed(TutorialId::Dashboard));
        assert_eq!(remote.completed.len(), 1);
        assert_eq!(remote.access_mode, Some(AccessMode::Full));
        assert_eq!(
            remote.max_accessed_profile_tab,
            Some(ProfileTab::BillingInformation)
        );
    }

    #[test]
    fn patch_never_uncompletes() {
        let mut doc = ProgressDoc::default();
        let now = Utc::now();
        let mut patch = ProgressPatch::default();
        patch.tutorials.insert(
            "messages".into(),
            TutorialRecord {
                completed: true,
                completed_at: None,
            },
        );
        doc.apply(&patch, now);

        let mut undo = ProgressPatch::default();
        undo.tutorials
            .insert("messages".into(), TutorialRecord::default());
        undo.completed = Some(false);
        doc.apply(&undo, now);

        assert!(doc.tutorials["messages"].completed);
        assert_eq!(doc.tutorials["messages"].completed_at, Some(now));
    }

    #[test]
    fn clear_active_keeps_other_fields() {
        let mut doc = ProgressDoc {
            active_tutorial: Some("messages".into()),
            current_step_index: 3,
            access_mode: Some("full".into()),
            ..ProgressDoc::default()
        };
        doc.apply(&ProgressPatch::clear_active(), Utc::now());
        assert_eq!(doc.active_tutorial, None);
        assert_eq!(doc.current_step_index, 0);
        assert_eq!(doc.access_mode.as_deref(), Some("full"));
    }

    #[test]
    fn snapshot_carries_whole_state() {
        let mut local = state();
        local.active_tutorial = Some(TutorialId::Messages);
        local.current_step_index = 1;
        local.completed.mark(TutorialId::Dashboard);
        let patch = ProgressPatch::snapshot(&local);
        assert_eq!(patch.active_tutorial, Some(Some("messages".to_string())));
        assert_eq!(patch.current_step_index, Some(1));
        assert!(patch.tutorials["dashboard"].completed);
        assert_eq!(patch.access_mode.as_deref(), Some("progressive"));
        assert_eq!(patch.completed, None);
    }

    #[test]
    fn restore_adopts_once_per_pair() {
        let mut ledger = RestoreLedger::default();
        let local = state();
        let remote = remote_at(TutorialId::Messages, 2);
        assert_eq!(
            plan_restore(&local, &remote, &mut ledger),
            RestoreDecision::Adopt {
                tutorial: TutorialId::Messages,
                step: 2
            }
        );
        assert_eq!(
            plan_restore(&local, &remote, &mut ledger),
            RestoreDecision::AlreadyRestored
        );
        assert!(matches!(
            plan_restore(&local, &remote_at(TutorialId::Messages, 3), &mut ledger),
            RestoreDecision::Adopt { step: 3, .. }
        ));
    }

    #[test]
    fn restore_never_regresses() {
        let mut ledger = RestoreLedger::default();
        let mut local = state();
        local.active_tutorial = Some(TutorialId::ProfileTabs);
        local.current_step_index = 4;
        assert_eq!(
            plan_restore(&local, &remote_at(TutorialId::ProfileTabs, 2), &mut ledger),
            RestoreDecision::AlreadyAhead
        );
        assert!(!ledger.contains(TutorialId::ProfileTabs, 2));
    }

    #[test]
    fn restore_skips_completed_tutorials() {
        let mut ledger = RestoreLedger::default();
        let mut local = state();
        local.completed.mark(TutorialId::Messages);
        assert_eq!(
            plan_restore(&local, &remote_at(TutorialId::Messages, 1), &mut ledger),
            RestoreDecision::AlreadyCompleted
        );
        local.active_tutorial = Some(TutorialId::Messages);
        assert_eq!(
            plan_restore(&local, &remote_at(TutorialId::Messages, 1), &mut ledger),
            RestoreDecision::Deactivate
        );
    }

    #[test]
    fn finished_track_clears_remote_pointer() {
        let mut ledger = RestoreLedger::default();
        let remote = RemoteProgress {
            track_completed: true,
            ..remote_at(TutorialId::Account, 0)
        };
        assert_eq!(
            plan_restore(&state(), &remote, &mut ledger),
            RestoreDecision::ClearRemoteActive
        );
        assert_eq!(
            plan_restore(&state(), &RemoteProgress::default(), &mut ledger),
            RestoreDecision::NothingSaved
        );
    }
}

//! Session engine. Owns one session's progress state and applies every
//! transition: explicit user actions, navigation events, tab completion,
//! and the one-time remote restore.
//!
//! All mutation is synchronous. Persistence is fire-and-forget through the
//! [`ProgressWriter`], so a slow or failing store never blocks navigation.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::access::rules::{AccessContext, AccessRules};
use crate::access::tabs::{self, TabContext, TabOrder};
use crate::config::EngineConfig;
use crate::error::CatalogError;
use crate::persistence::{
    ProgressDoc, ProgressPatch, ProgressStore, ProgressWriter, RestoreDecision, RestoreLedger,
    SaveRequest, plan_restore,
};
use crate::progress::ProgressState;
use crate::sync::{RouteSynchronizer, SyncContext, SyncOutcome, SyncState};
use crate::tutorial::{
    AccessMode, Catalog, ProfileTab, SequenceGraph, Step, Track, TutorialId, WorkspaceType, paths,
};

/// Warning shown when a mandatory tutorial is skipped.
pub const SKIP_REFUSED_WARNING: &str = "This tutorial is required to continue onboarding.";

/// Router primitive.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Toast/warning surface.
pub trait WarningSink: Send + Sync {
    fn show_warning(&self, message: &str);
}

/// Form-validation predicate supplied by the profile forms. The engine
/// treats it as opaque.
pub trait TabCompletionOracle {
    fn is_tab_complete(&self, tab: ProfileTab) -> bool;
}

impl<F> TabCompletionOracle for F
where
    F: Fn(ProfileTab) -> bool,
{
    fn is_tab_complete(&self, tab: ProfileTab) -> bool {
        self(tab)
    }
}

/// A side effect requested by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Effect {
    Navigate(String),
    Warning(String),
}

/// Navigator and warning sink that queues effects for the host to drain.
#[derive(Debug, Default)]
pub struct EffectRecorder {
    effects: Mutex<Vec<Effect>>,
}

impl EffectRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, effect: Effect) {
        let mut effects = self.effects.lock().unwrap_or_else(|p| p.into_inner());
        effects.push(effect);
    }

    /// Take every queued effect.
    pub fn drain(&self) -> Vec<Effect> {
        let mut effects = self.effects.lock().unwrap_or_else(|p| p.into_inner());
        std::mem::take(&mut *effects)
    }
}

impl Navigator for EffectRecorder {
    fn navigate(&self, path: &str) {
        self.push(Effect::Navigate(path.to_string()));
    }
}

impl WarningSink for EffectRecorder {
    fn show_warning(&self, message: &str) {
        self.push(Effect::Warning(message.to_string()));
    }
}

/// Everything an engine needs, injected at construction.
#[derive(Clone)]
pub struct EngineDeps {
    pub catalog: Arc<Catalog>,
    pub sequences: Arc<SequenceGraph>,
    pub rules: Arc<AccessRules>,
    pub store: Arc<dyn ProgressStore>,
    pub writer: ProgressWriter,
    pub navigator: Arc<dyn Navigator>,
    pub warnings: Arc<dyn WarningSink>,
    pub config: EngineConfig,
}

impl EngineDeps {
    /// Built-in catalog, sequences and rules with default config.
    pub fn standard(
        store: Arc<dyn ProgressStore>,
        writer: ProgressWriter,
        navigator: Arc<dyn Navigator>,
        warnings: Arc<dyn WarningSink>,
    ) -> Result<Self, CatalogError> {
        Ok(Self {
            catalog: Arc::new(Catalog::standard()?),
            sequences: Arc::new(SequenceGraph::standard()?),
            rules: Arc::new(AccessRules::standard()),
            store,
            writer,
            navigator,
            warnings,
            config: EngineConfig::default(),
        })
    }
}

/// Workspace facts that feed the access evaluator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceContext {
    #[serde(default)]
    pub workspace_type: WorkspaceType,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub first_time_modal_open: bool,
}

/// Result of an explicit transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Transition {
    /// Nothing to do (no active tutorial, already at a boundary, refused).
    Ignored,
    Moved { from: usize, to: usize },
    Completed {
        tutorial: TutorialId,
        next: Option<TutorialId>,
    },
}

/// Read-only view published after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub track: Track,
    pub state: ProgressState,
    pub sync_state: SyncState,
    pub current_step: Option<Step>,
    pub total_steps: usize,
    pub is_last_step: bool,
    pub completion_percentage: u8,
}

pub struct TutorialEngine {
    deps: EngineDeps,
    user_id: String,
    track: Track,
    tab_order: TabOrder,
    state: ProgressState,
    sync: RouteSynchronizer,
    ledger: RestoreLedger,
    workspace: WorkspaceContext,
    current_path: Option<String>,
    /// Path an in-flight `navigate_and_advance` is waiting to see.
    awaiting_arrival: Option<String>,
    snapshot_tx: watch::Sender<EngineSnapshot>,
}

impl TutorialEngine {
    pub fn new(deps: EngineDeps, user_id: impl Into<String>, track: Track) -> Self {
        let tab_order = TabOrder::for_track(track);
        let state = ProgressState::new(&tab_order);
        let sync = RouteSynchronizer::new(deps.config.debounce_window);
        let snapshot = build_snapshot(&deps, track, &state);
        let (snapshot_tx, _) = watch::channel(snapshot);
        Self {
            deps,
            user_id: user_id.into(),
            track,
            tab_order,
            state,
            sync,
            ledger: RestoreLedger::default(),
            workspace: WorkspaceContext::default(),
            current_path: None,
            awaiting_arrival: None,
            snapshot_tx,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn track(&self) -> Track {
        self.track
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    pub fn workspace(&self) -> &WorkspaceContext {
        &self.workspace
    }

    pub fn tab_order(&self) -> &TabOrder {
        &self.tab_order
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Subscribe to snapshots. The receiver sees the latest state only.
    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn steps(&self, tutorial: TutorialId) -> &[Step] {
        self.deps.catalog.steps(tutorial)
    }

    pub fn current_step(&self) -> Option<&Step> {
        let active = self.state.active_tutorial?;
        self.deps.catalog.step(active, self.state.current_step_index)
    }

    pub fn sync_state(&self) -> SyncState {
        SyncState::of(&self.state, &self.deps.catalog)
    }

    pub fn access_context(&self) -> AccessContext {
        AccessContext {
            tutorial_passed: self.state.tutorial_passed,
            active_tutorial: self.state.active_tutorial,
            current_step: self.state.current_step_index,
            completed: self.state.completed.clone(),
            access_mode: self.state.access_mode,
            workspace_type: self.workspace.workspace_type,
            is_admin: self.workspace.is_admin,
            first_time_modal_open: self.workspace.first_time_modal_open,
        }
    }

    pub fn is_sidebar_item_accessible(&self, path: &str) -> bool {
        self.deps
            .rules
            .is_sidebar_item_accessible(path, &self.access_context())
    }

    pub fn is_feature_accessible(&self, feature: &str) -> bool {
        self.deps
            .rules
            .evaluate_feature_access(feature, &self.access_context())
    }

    pub fn is_profile_tab_accessible(&self, tab: ProfileTab) -> bool {
        tabs::is_profile_tab_accessible(tab, &self.tab_context())
    }

    /// Next tutorial the sequence recommends after the active (or given) one.
    pub fn next_tutorial(&self, after: Option<TutorialId>) -> Option<TutorialId> {
        match after.or(self.state.active_tutorial) {
            Some(id) => self
                .deps
                .sequences
                .next_tutorial(id, self.track, &self.state.completed),
            None => self
                .deps
                .sequences
                .first_incomplete(self.track, &self.state.completed),
        }
    }

    fn tab_context(&self) -> TabContext<'_> {
        TabContext {
            access_mode: self.state.access_mode,
            tutorial_passed: self.state.tutorial_passed,
            max_accessed_tab: self.state.max_accessed_profile_tab,
            current_highlight: self.current_step().and_then(|s| s.highlight_tab),
            order: &self.tab_order,
        }
    }

    // ── Explicit transitions ────────────────────────────────────────

    /// Activate a tutorial at its first step. Unknown or empty tutorials
    /// are ignored.
    pub fn start_tutorial(&mut self, tutorial: TutorialId) -> bool {
        if self.deps.catalog.total_steps(tutorial) == 0 {
            debug!(tutorial = %tutorial, "Ignoring start of tutorial without steps");
            return false;
        }
        if self.state.is_active(tutorial) {
            return true;
        }

        self.state.active_tutorial = Some(tutorial);
        self.state.current_step_index = 0;
        self.state.is_paused = false;
        self.state.is_busy = false;
        self.awaiting_arrival = None;
        self.enter_step();
        info!(user_id = %self.user_id, tutorial = %tutorial, "Tutorial started");
        self.persist();
        self.publish();
        true
    }

    pub fn next_step(&mut self) -> Transition {
        let Some(active) = self.state.active_tutorial else {
            return Transition::Ignored;
        };
        let from = self.state.current_step_index;
        if self.deps.catalog.is_last_step(active, from) {
            return self.complete_tutorial();
        }
        self.move_to(active, from + 1);
        Transition::Moved { from, to: from + 1 }
    }

    pub fn prev_step(&mut self) -> Transition {
        let Some(active) = self.state.active_tutorial else {
            return Transition::Ignored;
        };
        let from = self.state.current_step_index;
        if Catalog::is_first_step(from) {
            return Transition::Ignored;
        }
        self.move_to(active, from - 1);
        Transition::Moved { from, to: from - 1 }
    }

    /// Temporarily suspend the route guard. Not persisted.
    pub fn pause_tutorial(&mut self) -> bool {
        if !self.state.is_tutorial_active() || self.state.is_paused {
            return false;
        }
        self.state.is_paused = true;
        debug!(user_id = %self.user_id, "Tutorial paused");
        self.publish();
        true
    }

    pub fn resume_tutorial(&mut self) -> bool {
        if !self.state.is_paused {
            return false;
        }
        self.state.is_paused = false;
        debug!(user_id = %self.user_id, "Tutorial resumed");
        self.publish();
        true
    }

    /// Complete the active tutorial. Idempotent: with nothing active this
    /// does nothing and writes nothing.
    ///
    /// The returned `next` is only a recommendation; it is not activated.
    pub fn complete_tutorial(&mut self) -> Transition {
        let Some(tutorial) = self.state.active_tutorial else {
            return Transition::Ignored;
        };

        self.state.completed.mark(tutorial);
        if tutorial.is_profile_tutorial() && self.state.upgrade_access_mode(AccessMode::Full) {
            info!(user_id = %self.user_id, "Profile tutorial complete, full access granted");
        }
        self.state.deactivate();
        self.refresh_tutorial_passed();

        let next = self
            .deps
            .sequences
            .next_tutorial(tutorial, self.track, &self.state.completed);
        info!(
            user_id = %self.user_id,
            tutorial = %tutorial,
            next = ?next,
            passed = self.state.tutorial_passed,
            "Tutorial completed"
        );
        self.persist();
        self.publish();
        Transition::Completed { tutorial, next }
    }

    /// Skip the active tutorial if the track allows it. Mandatory tutorials
    /// stay active and the user is warned.
    pub fn skip_tutorial(&mut self) -> Transition {
        let Some(tutorial) = self.state.active_tutorial else {
            return Transition::Ignored;
        };
        if !self.deps.sequences.is_skippable(tutorial, self.track) {
            info!(user_id = %self.user_id, tutorial = %tutorial, "Refusing to skip mandatory tutorial");
            self.deps.warnings.show_warning(SKIP_REFUSED_WARNING);
            return Transition::Ignored;
        }
        self.complete_tutorial()
    }

    /// Leave the active tutorial without completing it. Idempotent.
    pub fn stop_tutorial(&mut self) -> bool {
        let Some(tutorial) = self.state.active_tutorial else {
            return false;
        };
        self.state.deactivate();
        info!(user_id = %self.user_id, tutorial = %tutorial, "Tutorial stopped");
        self.persist();
        self.publish();
        true
    }

    /// Raise the busy barrier for a transition the host drives itself.
    pub fn begin_transition(&mut self) {
        if !self.state.is_busy {
            self.state.is_busy = true;
            self.awaiting_arrival = None;
            self.publish();
        }
    }

    /// Drop the busy barrier and reconcile the last known path.
    pub fn end_transition(&mut self) -> Option<SyncOutcome> {
        if !self.state.is_busy {
            return None;
        }
        self.state.is_busy = false;
        self.awaiting_arrival = None;
        self.publish();
        let path = self.current_path.clone()?;
        Some(self.on_navigation(&path))
    }

    /// Button-driven navigate+advance.
    ///
    /// The busy barrier stays raised until the router reports `path`, so
    /// the navigation this call causes is not reconciled a second time.
    /// `end_transition` drops it if that event never comes.
    pub fn navigate_and_advance(&mut self, path: &str) -> Transition {
        if !self.state.is_tutorial_active() {
            return Transition::Ignored;
        }
        self.state.is_busy = true;
        self.awaiting_arrival = Some(paths::normalize(path));
        self.deps.navigator.navigate(path);
        let transition = self.next_step();
        if !self.state.is_tutorial_active() {
            // Completing the tutorial already cleared busy.
            self.awaiting_arrival = None;
        }
        self.publish();
        transition
    }

    /// Begin the tutorial of a feature the user just opened, if it is part
    /// of the track and still pending.
    pub fn on_feature_entered(&mut self, feature: TutorialId) -> bool {
        if self.state.is_tutorial_active()
            || self.state.completed.is_completed(feature)
            || !self.deps.sequences.is_mandatory(feature, self.track)
        {
            return false;
        }
        self.start_tutorial(feature)
    }

    // ── Navigation ──────────────────────────────────────────────────

    pub fn on_navigation(&mut self, path: &str) -> SyncOutcome {
        self.on_navigation_at(path, Instant::now())
    }

    /// Reconcile against `path` at an explicit instant.
    pub fn on_navigation_at(&mut self, path: &str, now: Instant) -> SyncOutcome {
        self.current_path = Some(path.to_string());
        if self.state.is_busy
            && self
                .awaiting_arrival
                .as_deref()
                .is_some_and(|awaited| awaited == paths::normalize(path))
        {
            debug!(user_id = %self.user_id, path, "Transition navigation arrived, releasing busy");
            self.awaiting_arrival = None;
            self.state.is_busy = false;
            self.publish();
            return SyncOutcome::TransitionSettled;
        }
        let ctx = SyncContext {
            tab_order: &self.tab_order,
            workspace_id: self.workspace.workspace_id.as_deref(),
        };
        let outcome = self
            .sync
            .reconcile(&self.deps.catalog, &self.state, ctx, path, now);

        match &outcome {
            SyncOutcome::StepSynced { from, to } | SyncOutcome::Advanced { from, to } => {
                if let Some(active) = self.state.active_tutorial {
                    info!(
                        user_id = %self.user_id,
                        tutorial = %active,
                        from,
                        to,
                        path,
                        "Step synced to route"
                    );
                    self.move_to(active, *to);
                }
            }
            SyncOutcome::Redirect { to, warning } => {
                info!(user_id = %self.user_id, path, redirect = %to, "Redirecting off-route navigation");
                self.deps.warnings.show_warning(warning);
                self.deps.navigator.navigate(to);
            }
            SyncOutcome::CompleteTutorial => {
                self.complete_tutorial();
            }
            SyncOutcome::ReleaseBusy => {
                debug!(user_id = %self.user_id, "Hand-off reached mid-transition, releasing busy");
                self.state.is_busy = false;
                self.awaiting_arrival = None;
                self.publish();
            }
            _ => {}
        }
        outcome
    }

    // ── Profile tabs and access ─────────────────────────────────────

    /// React to a tab's form becoming complete (or incomplete).
    pub fn on_tab_completed(&mut self, tab: ProfileTab, is_complete: bool) -> bool {
        let Some(active) = self.state.active_tutorial else {
            return false;
        };
        if !is_complete || !active.is_profile_tutorial() {
            return false;
        }

        let mut changed = false;
        if let Some(unlock) =
            tabs::tab_to_unlock(tab, self.state.max_accessed_profile_tab, &self.tab_order)
        {
            changed |= self.state.raise_max_tab(unlock, &self.tab_order);
            debug!(user_id = %self.user_id, tab = %unlock, "Unlocked profile tab");
        }
        if tabs::grants_full_access(tab, self.track, true)
            && self.state.upgrade_access_mode(AccessMode::Full)
        {
            info!(user_id = %self.user_id, tab = %tab, "Critical tab complete, full access granted");
            changed = true;
        }

        let highlights_tab = self.current_step().and_then(|s| s.highlight_tab) == Some(tab);
        if highlights_tab {
            // next_step persists and publishes on its own.
            if changed {
                self.publish();
            }
            self.next_step();
            return true;
        }

        if changed {
            self.persist();
            self.publish();
        }
        changed
    }

    /// Upgrade the access mode. Downgrades from full are rejected.
    pub fn set_access_mode(&mut self, mode: AccessMode) -> bool {
        if !self.state.upgrade_access_mode(mode) {
            if mode != self.state.access_mode {
                warn!(
                    user_id = %self.user_id,
                    current = %self.state.access_mode,
                    requested = %mode,
                    "Rejected access mode downgrade"
                );
            }
            return false;
        }
        info!(user_id = %self.user_id, mode = %mode, "Access mode changed");
        self.persist();
        self.publish();
        true
    }

    /// Align the profile tutorial with forms that are already filled in:
    /// unlock the first incomplete tab and jump forward to its step.
    pub fn sync_profile_initial_state(&mut self, oracle: &dyn TabCompletionOracle) -> bool {
        let Some(active) = self.state.active_tutorial else {
            return false;
        };
        if !active.is_profile_tutorial() || self.state.access_mode == AccessMode::Full {
            return false;
        }
        let Some(first_incomplete) = self
            .tab_order
            .tabs()
            .iter()
            .copied()
            .find(|tab| !oracle.is_tab_complete(*tab))
        else {
            return false;
        };

        let changed = self.state.raise_max_tab(first_incomplete, &self.tab_order);
        if let Some(target) = self.deps.catalog.step_for_tab(active, first_incomplete)
            && target > self.state.current_step_index
        {
            info!(
                user_id = %self.user_id,
                tab = %first_incomplete,
                step = target,
                "Jumping to first incomplete profile tab"
            );
            self.move_to(active, target);
            return true;
        }
        if changed {
            self.persist();
            self.publish();
        }
        changed
    }

    pub fn set_workspace(&mut self, workspace: WorkspaceContext) {
        if self.workspace != workspace {
            debug!(
                user_id = %self.user_id,
                workspace_type = ?workspace.workspace_type,
                "Workspace context changed"
            );
            self.workspace = workspace;
            self.publish();
        }
    }

    // ── Remote progress ─────────────────────────────────────────────

    /// Load the stored document and merge it. Store errors are logged and
    /// the session continues from local state.
    pub async fn load_remote(&mut self) -> Option<RestoreDecision> {
        let store = Arc::clone(&self.deps.store);
        match store.load_progress(&self.user_id, self.track).await {
            Ok(Some(doc)) => Some(self.apply_remote(&doc)),
            Ok(None) => {
                debug!(user_id = %self.user_id, track = %self.track, "No stored progress");
                None
            }
            Err(e) => {
                warn!(
                    user_id = %self.user_id,
                    track = %self.track,
                    error = %e,
                    "Failed to load progress, continuing with local state"
                );
                None
            }
        }
    }

    /// Merge a stored document into local state without regressing it.
    pub fn apply_remote(&mut self, doc: &ProgressDoc) -> RestoreDecision {
        let remote = doc.interpret();
        self.state.completed.merge(&remote.completed);
        if let Some(mode) = remote.access_mode {
            self.state.upgrade_access_mode(mode);
        }
        if let Some(tab) = remote.max_accessed_profile_tab {
            self.state.raise_max_tab(tab, &self.tab_order);
        }
        self.state.tutorial_passed |= remote.tutorial_passed;
        self.refresh_tutorial_passed();

        let decision = plan_restore(&self.state, &remote, &mut self.ledger);
        match decision {
            RestoreDecision::Adopt { tutorial, step } => {
                let total = self.deps.catalog.total_steps(tutorial);
                if total == 0 {
                    debug!(tutorial = %tutorial, "Stored tutorial has no steps, not restoring");
                } else {
                    self.state.active_tutorial = Some(tutorial);
                    self.state.current_step_index = step.min(total - 1);
                    self.state.is_paused = false;
                    self.enter_step();
                    info!(
                        user_id = %self.user_id,
                        tutorial = %tutorial,
                        step = self.state.current_step_index,
                        "Restored tutorial position"
                    );
                }
            }
            RestoreDecision::Deactivate => {
                info!(user_id = %self.user_id, "Stored tutorial already complete, deactivating");
                self.state.deactivate();
                self.persist();
            }
            RestoreDecision::ClearRemoteActive => {
                self.submit(ProgressPatch::clear_active());
            }
            other => debug!(user_id = %self.user_id, decision = ?other, "Nothing to restore"),
        }
        self.publish();
        decision
    }

    // ── Internals ───────────────────────────────────────────────────

    fn move_to(&mut self, tutorial: TutorialId, step: usize) {
        self.state.current_step_index = step;
        self.enter_step();
        debug!(user_id = %self.user_id, tutorial = %tutorial, step, "Step changed");
        self.persist();
        self.publish();
    }

    /// Entering a step that highlights a tab beyond the high-water mark
    /// unlocks it.
    fn enter_step(&mut self) {
        if let Some(tab) = self.current_step().and_then(|s| s.highlight_tab) {
            self.state.raise_max_tab(tab, &self.tab_order);
        }
    }

    fn refresh_tutorial_passed(&mut self) {
        if !self.state.tutorial_passed
            && self
                .deps
                .sequences
                .all_mandatory_complete(self.track, &self.state.completed)
        {
            info!(user_id = %self.user_id, track = %self.track, "All mandatory tutorials complete");
            self.state.tutorial_passed = true;
        }
    }

    fn persist(&self) {
        self.submit(ProgressPatch::snapshot(&self.state));
    }

    fn submit(&self, patch: ProgressPatch) {
        self.deps.writer.submit(SaveRequest {
            user_id: self.user_id.clone(),
            track: self.track,
            patch,
        });
    }

    fn publish(&self) {
        self.snapshot_tx
            .send_replace(build_snapshot(&self.deps, self.track, &self.state));
    }
}

fn build_snapshot(deps: &EngineDeps, track: Track, state: &ProgressState) -> EngineSnapshot {
    let (current_step, total_steps, is_last_step) = match state.active_tutorial {
        Some(active) => (
            deps.catalog.step(active, state.current_step_index).cloned(),
            deps.catalog.total_steps(active),
            deps.catalog.is_last_step(active, state.current_step_index),
        ),
        None => (None, 0, false),
    };
    EngineSnapshot {
        track,
        state: state.clone(),
        sync_state: SyncState::of(state, &deps.catalog),
        current_step,
        total_steps,
        is_last_step,
        completion_percentage: deps.sequences.completion_percentage(track, &state.completed),
    }
}

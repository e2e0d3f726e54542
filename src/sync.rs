//! Route synchronizer: reconciles the active step with the browser path.
//!
//! [`RouteSynchronizer::reconcile`] is pure with respect to the progress
//! state. It decides what should happen and returns a [`SyncOutcome`];
//! the engine applies it. The only state the synchronizer owns is its
//! debounce table.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::access::tabs::{TabContext, TabOrder, is_profile_tab_accessible};
use crate::progress::ProgressState;
use crate::tutorial::{Catalog, RouteGuard, Step, paths};

/// Observable state of the synchronizer for the active tutorial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    /// The current step needs an explicit user action to advance.
    AwaitingUserAction,
    Busy,
    Paused,
}

impl SyncState {
    pub fn of(state: &ProgressState, catalog: &Catalog) -> Self {
        let Some(active) = state.active_tutorial else {
            return Self::Idle;
        };
        if state.is_busy {
            return Self::Busy;
        }
        if state.is_paused {
            return Self::Paused;
        }
        match catalog.step(active, state.current_step_index) {
            Some(step) if step.requires_interaction => Self::AwaitingUserAction,
            _ => Self::Idle,
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::AwaitingUserAction => write!(f, "awaiting_user_action"),
            Self::Busy => write!(f, "busy"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Decision produced by one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// No active tutorial, onboarding passed, or outside the dashboard.
    Inactive,
    /// Busy or paused.
    Suspended,
    /// The current step already lives on this path.
    InSync,
    /// Nothing matched and no guard applies.
    Unguarded,
    /// A sync to this `(step, path)` happened inside the debounce window.
    Debounced { step: usize },
    /// The matching step targets a tab that is still locked.
    TabLocked { step: usize },
    /// An earlier step matched, but the current step continues on the same page.
    ContinuationKept { matched: usize, current: usize },
    /// Move the step index to the matching step.
    StepSynced { from: usize, to: usize },
    /// The user landed on a step's action target; move to the next step.
    Advanced { from: usize, to: usize },
    /// Send the browser back with a warning.
    Redirect { to: String, warning: String },
    /// The hand-off target was reached; the tutorial is done.
    CompleteTutorial,
    /// The hand-off target was reached mid-transition; drop the busy flag
    /// and let the next pass complete.
    ReleaseBusy,
    /// The navigation an explicit transition requested has landed. The
    /// barrier drops and the step stays where the transition put it.
    TransitionSettled,
}

impl SyncOutcome {
    /// Whether the outcome changes the persisted step position.
    pub fn moves_step(&self) -> Option<usize> {
        match self {
            Self::StepSynced { to, .. } | Self::Advanced { to, .. } => Some(*to),
            _ => None,
        }
    }
}

/// Extra inputs a reconciliation pass needs beyond the progress state.
#[derive(Debug, Clone, Copy)]
pub struct SyncContext<'a> {
    pub tab_order: &'a TabOrder,
    pub workspace_id: Option<&'a str>,
}

#[derive(Debug)]
pub struct RouteSynchronizer {
    window: Duration,
    last_synced: HashMap<(usize, String), Instant>,
}

impl RouteSynchronizer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_synced: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Reconcile `state` against `path` at time `now`.
    pub fn reconcile(
        &mut self,
        catalog: &Catalog,
        state: &ProgressState,
        ctx: SyncContext<'_>,
        path: &str,
        now: Instant,
    ) -> SyncOutcome {
        let Some(active) = state.active_tutorial else {
            return SyncOutcome::Inactive;
        };
        if state.tutorial_passed || !paths::is_dashboard_path(path) {
            return SyncOutcome::Inactive;
        }
        let current = state.current_step_index;

        // The hand-off wins over the busy barrier so a button-driven
        // navigate+advance onto the target still completes.
        if let Some(RouteGuard::HandOff {
            handoff_step,
            target,
            ..
        }) = catalog.guard(active)
            && catalog
                .step_index(active, handoff_step)
                .is_some_and(|h| current >= h)
            && paths::path_matches(path, target)
        {
            return if state.is_busy {
                SyncOutcome::ReleaseBusy
            } else {
                SyncOutcome::CompleteTutorial
            };
        }

        if state.is_busy || state.is_paused {
            return SyncOutcome::Suspended;
        }

        let steps = catalog.steps(active);
        if let Some(step) = steps.get(current)
            && !step.requires_interaction
            && step
                .action_path
                .as_deref()
                .is_some_and(|action| paths::path_matches(path, action))
            && current + 1 < steps.len()
        {
            let to = current + 1;
            if !self.admit(to, path, now) {
                return SyncOutcome::Debounced { step: to };
            }
            return SyncOutcome::Advanced { from: current, to };
        }

        let matches = catalog.matching_steps(active, path);
        if matches.contains(&current) {
            return SyncOutcome::InSync;
        }

        let forward = matches.iter().copied().find(|&i| i > current);
        let backward = matches.iter().copied().rev().find(|&i| i < current);

        let target = match (forward, backward) {
            (Some(to), _) => to,
            (None, Some(to)) => {
                // A same-page continuation keeps the user ahead of an
                // earlier step that shares the URL.
                let continuation = steps[to + 1..=current.min(steps.len() - 1)]
                    .iter()
                    .all(Step::is_continuation);
                if continuation {
                    debug!(tutorial = %active, matched = to, current, "Keeping continuation step");
                    return SyncOutcome::ContinuationKept {
                        matched: to,
                        current,
                    };
                }
                to
            }
            (None, None) => return self.enforce(catalog, state, ctx, path),
        };

        if let Some(tab) = steps[target].highlight_tab {
            let tab_ctx = TabContext {
                access_mode: state.access_mode,
                tutorial_passed: state.tutorial_passed,
                max_accessed_tab: state.max_accessed_profile_tab,
                current_highlight: steps.get(current).and_then(|s| s.highlight_tab),
                order: ctx.tab_order,
            };
            if !is_profile_tab_accessible(tab, &tab_ctx) {
                debug!(tutorial = %active, step = target, tab = %tab, "Matching tab is locked");
                return SyncOutcome::TabLocked { step: target };
            }
        }

        if !self.admit(target, path, now) {
            debug!(tutorial = %active, step = target, path, "Sync debounced");
            return SyncOutcome::Debounced { step: target };
        }
        SyncOutcome::StepSynced {
            from: current,
            to: target,
        }
    }

    fn enforce(
        &self,
        catalog: &Catalog,
        state: &ProgressState,
        ctx: SyncContext<'_>,
        path: &str,
    ) -> SyncOutcome {
        let Some(active) = state.active_tutorial else {
            return SyncOutcome::Inactive;
        };
        match catalog.guard(active) {
            None => SyncOutcome::Unguarded,
            Some(RouteGuard::Confine { route, warning }) => {
                if paths::is_on_correct_page(path, route) {
                    SyncOutcome::Unguarded
                } else {
                    SyncOutcome::Redirect {
                        to: paths::with_workspace(route, ctx.workspace_id),
                        warning: warning.clone(),
                    }
                }
            }
            Some(RouteGuard::HandOff {
                home,
                handoff_step,
                target,
                before_warning,
                after_warning,
            }) => {
                if paths::path_matches(path, home) || paths::path_matches(path, target) {
                    return SyncOutcome::Unguarded;
                }
                let reached = catalog
                    .step_index(active, handoff_step)
                    .is_some_and(|h| state.current_step_index >= h);
                let warning = if reached { after_warning } else { before_warning };
                SyncOutcome::Redirect {
                    to: paths::with_workspace(home, ctx.workspace_id),
                    warning: warning.clone(),
                }
            }
        }
    }

    /// Record a sync to `(step, path)` unless one happened inside the window.
    fn admit(&mut self, step: usize, path: &str, now: Instant) -> bool {
        let key = (step, paths::normalize(path));
        if let Some(last) = self.last_synced.get(&key)
            && now.saturating_duration_since(*last) < self.window
        {
            return false;
        }
        let window = self.window;
        self.last_synced
            .retain(|_, at| now.saturating_duration_since(*at) < window);
        self.last_synced.insert(key, now);
        true
    }
}

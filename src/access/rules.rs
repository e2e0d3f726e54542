//! Feature access rules and the sidebar gate.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::progress::CompletedTutorials;
use crate::tutorial::{AccessMode, TutorialId, WorkspaceType, paths};

/// A single condition of an `accessible_when` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccessCondition {
    TutorialPassed,
    NoActiveTutorial,
    ActiveTutorialIn { tutorials: Vec<TutorialId> },
    /// The named tutorial is active at `min_step` or later, or finished.
    StepReached { tutorial: TutorialId, min_step: usize },
    TutorialCompleted { tutorial: TutorialId },
}

impl AccessCondition {
    fn holds(&self, ctx: &AccessContext) -> bool {
        match self {
            Self::TutorialPassed => ctx.tutorial_passed,
            Self::NoActiveTutorial => ctx.active_tutorial.is_none(),
            Self::ActiveTutorialIn { tutorials } => ctx
                .active_tutorial
                .is_some_and(|active| tutorials.contains(&active)),
            Self::StepReached { tutorial, min_step } => {
                ctx.completed.is_completed(*tutorial)
                    || (ctx.active_tutorial == Some(*tutorial) && ctx.current_step >= *min_step)
            }
            Self::TutorialCompleted { tutorial } => ctx.completed.is_completed(*tutorial),
        }
    }
}

/// Access rule for one named feature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRule {
    #[serde(default)]
    pub always_accessible: bool,
    /// When present, exhaustive: one condition must hold.
    #[serde(default)]
    pub accessible_when: Option<Vec<AccessCondition>>,
    #[serde(default)]
    pub requires_access: Option<HashSet<AccessMode>>,
    #[serde(default)]
    pub or_tutorial_passed: bool,
    /// Per-workspace overrides. Only an explicit `false` denies.
    #[serde(default)]
    pub workspace_restrictions: Option<HashMap<WorkspaceType, bool>>,
}

impl FeatureRule {
    pub fn always() -> Self {
        Self {
            always_accessible: true,
            ..Self::default()
        }
    }

    pub fn when(conditions: Vec<AccessCondition>) -> Self {
        Self {
            accessible_when: Some(conditions),
            ..Self::default()
        }
    }
}

/// Snapshot of everything the evaluator looks at.
#[derive(Debug, Clone, Default)]
pub struct AccessContext {
    pub tutorial_passed: bool,
    pub active_tutorial: Option<TutorialId>,
    pub current_step: usize,
    pub completed: CompletedTutorials,
    pub access_mode: AccessMode,
    pub workspace_type: WorkspaceType,
    pub is_admin: bool,
    pub first_time_modal_open: bool,
}

/// Immutable feature rules, injected into the engine.
#[derive(Debug, Clone, Default)]
pub struct AccessRules {
    features: HashMap<String, FeatureRule>,
    team_only_items: HashSet<String>,
}

impl AccessRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, feature: impl Into<String>, rule: FeatureRule) -> Self {
        self.features.insert(feature.into(), rule);
        self
    }

    pub fn with_team_only(mut self, item: impl Into<String>) -> Self {
        self.team_only_items.insert(item.into());
        self
    }

    /// Built-in rules: overview and profile are open, the feature tours
    /// unlock one after another, organization needs a team workspace.
    pub fn standard() -> Self {
        use AccessCondition::*;

        let chained = |feature: TutorialId, after: TutorialId| {
            FeatureRule::when(vec![
                NoActiveTutorial,
                ActiveTutorialIn {
                    tutorials: vec![feature],
                },
                TutorialCompleted { tutorial: after },
            ])
        };

        let mut messages = chained(TutorialId::Messages, TutorialId::Dashboard);
        if let Some(conditions) = messages.accessible_when.as_mut() {
            conditions.push(StepReached {
                tutorial: TutorialId::Dashboard,
                min_step: 3,
            });
        }

        let organization = FeatureRule {
            requires_access: Some([AccessMode::Full, AccessMode::Team].into_iter().collect()),
            or_tutorial_passed: true,
            workspace_restrictions: Some([(WorkspaceType::Personal, false)].into_iter().collect()),
            ..FeatureRule::default()
        };

        Self::new()
            .with_rule("overview", FeatureRule::always())
            .with_rule("profile", FeatureRule::always())
            .with_rule("messages", messages)
            .with_rule("contracts", chained(TutorialId::Contracts, TutorialId::Messages))
            .with_rule("calendar", chained(TutorialId::Calendar, TutorialId::Contracts))
            .with_rule("marketplace", chained(TutorialId::Marketplace, TutorialId::Calendar))
            .with_rule("payroll", chained(TutorialId::Payroll, TutorialId::Calendar))
            .with_rule("settings", chained(TutorialId::Account, TutorialId::Marketplace))
            .with_rule("organization", organization)
            .with_team_only("organization")
    }

    pub fn rule(&self, feature: &str) -> Option<&FeatureRule> {
        self.features.get(feature)
    }

    /// Decide whether `feature` is reachable. First match wins.
    pub fn evaluate_feature_access(&self, feature: &str, ctx: &AccessContext) -> bool {
        let Some(rule) = self.features.get(feature) else {
            return true;
        };
        if rule.always_accessible {
            return true;
        }
        if ctx.tutorial_passed {
            return true;
        }
        if let Some(conditions) = &rule.accessible_when {
            return conditions.iter().any(|c| c.holds(ctx));
        }
        if let Some(modes) = &rule.requires_access {
            if rule.or_tutorial_passed && ctx.tutorial_passed {
                return true;
            }
            if !modes.contains(&ctx.access_mode) {
                return false;
            }
            return rule
                .workspace_restrictions
                .as_ref()
                .and_then(|r| r.get(&ctx.workspace_type))
                .is_none_or(|allowed| *allowed);
        }
        true
    }

    /// Sidebar gate: admin bypass, first-time modal lock, team-only items,
    /// then the feature rule for the item.
    pub fn is_sidebar_item_accessible(&self, path: &str, ctx: &AccessContext) -> bool {
        if ctx.is_admin {
            return true;
        }
        let item = paths::item_name(path);

        if ctx.first_time_modal_open && !matches!(item.as_str(), "overview" | "profile" | "dashboard")
        {
            return false;
        }
        if self.team_only_items.contains(&item) && ctx.workspace_type != WorkspaceType::Team {
            return false;
        }
        self.evaluate_feature_access(&item, ctx)
    }
}

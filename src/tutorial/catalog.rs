//! Tutorial catalog: the immutable set of tutorials and their steps.

use std::collections::{HashMap, HashSet};

use serde_json::json;

use crate::error::CatalogError;

use super::model::{ProfileTab, Step, StepHints, Tutorial, TutorialId};
use super::paths;

/// Message shown when a user leaves the profile during a profile tutorial.
pub const PROFILE_WARNING: &str = "Please complete your profile configuration to continue.";
/// Message shown when a user wanders off the dashboard intro.
pub const FOLLOW_GUIDE_WARNING: &str = "Please follow the onboarding guide.";
/// Message shown once the dashboard intro expects the profile click.
pub const CLICK_PROFILE_WARNING: &str = "Please click on Profile to proceed.";

/// Where a tutorial insists the browser stays while it is active.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteGuard {
    /// Stay under `route`. Leaving it redirects back with `warning`.
    Confine { route: String, warning: String },
    /// Stay on `home` until `handoff_step` is reached. From then on the
    /// only way forward is `target`, and landing there completes the
    /// tutorial. Stray navigation is sent back to `home`.
    HandOff {
        home: String,
        handoff_step: String,
        target: String,
        before_warning: String,
        after_warning: String,
    },
}

/// Immutable tutorial definitions, injected into the engine.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tutorials: HashMap<TutorialId, Tutorial>,
    guards: HashMap<TutorialId, RouteGuard>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate tutorials and duplicate step ids.
    pub fn new(tutorials: Vec<Tutorial>) -> Result<Self, CatalogError> {
        let mut map = HashMap::with_capacity(tutorials.len());
        for tutorial in tutorials {
            let mut seen = HashSet::new();
            for step in &tutorial.steps {
                if !seen.insert(step.id.as_str()) {
                    return Err(CatalogError::DuplicateStep {
                        tutorial: tutorial.id.to_string(),
                        step: step.id.clone(),
                    });
                }
            }
            if map.contains_key(&tutorial.id) {
                return Err(CatalogError::DuplicateTutorial {
                    tutorial: tutorial.id.to_string(),
                });
            }
            map.insert(tutorial.id, tutorial);
        }
        Ok(Self {
            tutorials: map,
            guards: HashMap::new(),
        })
    }

    /// Attach a route guard to a tutorial. A hand-off guard must name a
    /// step the tutorial defines.
    pub fn with_guard(
        mut self,
        tutorial: TutorialId,
        guard: RouteGuard,
    ) -> Result<Self, CatalogError> {
        if let RouteGuard::HandOff { handoff_step, .. } = &guard
            && self.step_index(tutorial, handoff_step).is_none()
        {
            return Err(CatalogError::UnknownGuardStep {
                tutorial: tutorial.to_string(),
                step: handoff_step.clone(),
            });
        }
        self.guards.insert(tutorial, guard);
        Ok(self)
    }

    /// The product's built-in tutorials and guards, validated like any
    /// other catalog.
    pub fn standard() -> Result<Self, CatalogError> {
        let confine_profile = RouteGuard::Confine {
            route: paths::PROFILE.to_string(),
            warning: PROFILE_WARNING.to_string(),
        };
        let catalog = Self::new(standard_tutorials())?
            .with_guard(TutorialId::ProfileTabs, confine_profile.clone())?
            .with_guard(TutorialId::FacilityProfileTabs, confine_profile)?
            .with_guard(
                TutorialId::Dashboard,
                RouteGuard::HandOff {
                    home: paths::OVERVIEW.to_string(),
                    handoff_step: "navigate-to-profile".to_string(),
                    target: paths::PROFILE.to_string(),
                    before_warning: FOLLOW_GUIDE_WARNING.to_string(),
                    after_warning: CLICK_PROFILE_WARNING.to_string(),
                },
            )?;
        Ok(catalog)
    }

    pub fn tutorial(&self, id: TutorialId) -> Option<&Tutorial> {
        self.tutorials.get(&id)
    }

    /// Steps of a tutorial; empty if the catalog does not define it.
    pub fn steps(&self, id: TutorialId) -> &[Step] {
        self.tutorials
            .get(&id)
            .map(|t| t.steps.as_slice())
            .unwrap_or(&[])
    }

    /// Steps looked up by wire id; unknown ids yield an empty slice.
    pub fn steps_by_name(&self, name: &str) -> &[Step] {
        TutorialId::parse(name)
            .map(|id| self.steps(id))
            .unwrap_or(&[])
    }

    pub fn step(&self, id: TutorialId, index: usize) -> Option<&Step> {
        self.steps(id).get(index)
    }

    pub fn step_by_id(&self, id: TutorialId, step_id: &str) -> Option<&Step> {
        self.steps(id).iter().find(|s| s.id == step_id)
    }

    /// Position of a step, or `None` for unknown tutorials and steps.
    pub fn step_index(&self, id: TutorialId, step_id: &str) -> Option<usize> {
        self.steps(id).iter().position(|s| s.id == step_id)
    }

    pub fn total_steps(&self, id: TutorialId) -> usize {
        self.steps(id).len()
    }

    /// True iff `index >= total_steps - 1`.
    pub fn is_last_step(&self, id: TutorialId, index: usize) -> bool {
        index + 1 >= self.total_steps(id)
    }

    pub fn is_first_step(index: usize) -> bool {
        index == 0
    }

    pub fn guard(&self, id: TutorialId) -> Option<&RouteGuard> {
        self.guards.get(&id)
    }

    /// Indices of steps whose navigation path matches `path`, in order.
    pub fn matching_steps(&self, id: TutorialId, path: &str) -> Vec<usize> {
        self.steps(id)
            .iter()
            .enumerate()
            .filter(|(_, step)| {
                step.navigation_path
                    .as_deref()
                    .is_some_and(|nav| paths::path_matches(path, nav))
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// First step of a tutorial highlighting `tab`.
    pub fn step_for_tab(&self, id: TutorialId, tab: ProfileTab) -> Option<usize> {
        self.steps(id)
            .iter()
            .position(|s| s.highlight_tab == Some(tab))
    }
}

fn understood_button() -> serde_json::Value {
    json!({ "textKey": "buttons.iUnderstood", "action": "pause_and_fill", "variant": "primary" })
}

fn profile_tab_step(id: &str, tab: ProfileTab, preview: serde_json::Value) -> Step {
    Step::new(id)
        .with_tab(tab)
        .with_path(paths::profile_tab_path(tab))
        .interactive()
        .with_hints(StepHints {
            hide_previous: true,
            custom_buttons: vec![understood_button()],
            visual_preview: Some(preview),
        })
}

fn tab_preview(icon: &str, tab: ProfileTab) -> serde_json::Value {
    json!({ "type": "profile_tab", "icon": icon, "tabId": tab.as_str() })
}

fn sidebar_preview(icon: &str, item: &str) -> StepHints {
    StepHints {
        visual_preview: Some(json!({
            "type": "sidebar_item",
            "icon": icon,
            "textKey": format!("dashboard.sidebar.{item}"),
        })),
        ..StepHints::default()
    }
}

/// Overview step + continuation steps shown on a feature page.
fn feature_tour(
    id: TutorialId,
    prefix: &str,
    sidebar_item: &str,
    icon: &str,
    page: &str,
    continuations: &[&str],
) -> Tutorial {
    let mut steps = vec![
        Step::new(format!("{prefix}-overview"))
            .with_sidebar_item(sidebar_item)
            .with_action_path(page)
            .with_hints(sidebar_preview(icon, sidebar_item)),
    ];
    steps.extend(
        continuations
            .iter()
            .map(|suffix| Step::new(format!("{prefix}-{suffix}")).on_page(page)),
    );
    Tutorial::new(id, steps)
}

fn standard_tutorials() -> Vec<Tutorial> {
    use ProfileTab::*;

    let hidden = StepHints {
        hide_previous: true,
        ..StepHints::default()
    };

    vec![
        Tutorial::new(
            TutorialId::Dashboard,
            vec![
                Step::new("onboarding-help-button")
                    .with_path(paths::OVERVIEW)
                    .with_hints(StepHints {
                        visual_preview: Some(json!({ "type": "header_help" })),
                        ..StepHints::default()
                    }),
                Step::new("onboarding-intro").with_path(paths::OVERVIEW),
                Step::new("expand-sidebar").with_path(paths::OVERVIEW),
                Step::new("navigate-to-profile")
                    .with_path(paths::OVERVIEW)
                    .with_sidebar_item("profile"),
            ],
        ),
        Tutorial::new(
            TutorialId::ProfileTabs,
            vec![
                profile_tab_step(
                    "personal-details-tab",
                    PersonalDetails,
                    json!({ "type": "autofill_button" }),
                ),
                profile_tab_step(
                    "professional-background-tab",
                    ProfessionalBackground,
                    tab_preview("briefcase", ProfessionalBackground),
                )
                .full_access_only(),
                profile_tab_step(
                    "billing-information-tab",
                    BillingInformation,
                    tab_preview("credit-card", BillingInformation),
                ),
                profile_tab_step(
                    "document-uploads-tab",
                    DocumentUploads,
                    tab_preview("file-text", DocumentUploads),
                ),
                Step::new("marketplace-tab")
                    .with_tab(Marketplace)
                    .with_path(paths::profile_tab_path(Marketplace))
                    .with_hints(StepHints {
                        hide_previous: true,
                        visual_preview: Some(tab_preview("briefcase", Marketplace)),
                        ..StepHints::default()
                    }),
                Step::new("click-account-tab")
                    .with_tab(Account)
                    .interactive()
                    .with_hints(hidden.clone()),
                Step::new("account-tab")
                    .with_tab(Account)
                    .with_sidebar_item("profile")
                    .with_path(paths::profile_tab_path(Account))
                    .with_hints(hidden.clone()),
            ],
        ),
        Tutorial::new(
            TutorialId::FacilityProfileTabs,
            vec![
                profile_tab_step(
                    "facility-core-details-tab",
                    FacilityCoreDetails,
                    json!({ "type": "autofill_button" }),
                ),
                profile_tab_step(
                    "facility-legal-billing-tab",
                    FacilityLegalBilling,
                    tab_preview("credit-card", FacilityLegalBilling),
                ),
                Step::new("facility-profile-completion-info")
                    .with_tab(FacilityLegalBilling)
                    .with_path(paths::profile_tab_path(FacilityLegalBilling))
                    .with_hints(hidden.clone()),
            ],
        ),
        Tutorial::new(
            TutorialId::Messages,
            vec![
                Step::new("redirect-to-messages")
                    .with_sidebar_item("messages")
                    .with_hints(hidden),
                Step::new("messages-overview")
                    .with_sidebar_item("messages")
                    .with_action_path(paths::MESSAGES)
                    .with_hints(sidebar_preview("message-square", "messages")),
                Step::new("messages-conversations").on_page(paths::MESSAGES),
                Step::new("messages-compose").on_page(paths::MESSAGES),
            ],
        ),
        feature_tour(
            TutorialId::Contracts,
            "contracts",
            "contracts",
            "file-text",
            paths::CONTRACTS,
            &["list"],
        ),
        feature_tour(
            TutorialId::Calendar,
            "calendar",
            "calendar",
            "calendar",
            paths::CALENDAR,
            &["view", "appointment"],
        ),
        feature_tour(
            TutorialId::Marketplace,
            "marketplace",
            "marketplace",
            "briefcase",
            paths::MARKETPLACE,
            &["search", "apply"],
        ),
        feature_tour(
            TutorialId::Payroll,
            "payroll",
            "payroll",
            "dollar-sign",
            paths::PAYROLL,
            &["requests", "status"],
        ),
        feature_tour(
            TutorialId::Organization,
            "organization",
            "organization",
            "users",
            paths::ORGANIZATION,
            &["facilities", "settings"],
        ),
        feature_tour(
            TutorialId::Account,
            "settings",
            "settings",
            "settings",
            paths::SETTINGS,
            &["account", "notifications"],
        ),
        feature_tour(
            TutorialId::Profile,
            "profile",
            "profile",
            "user",
            paths::PROFILE,
            &["edit"],
        ),
    ]
}

//! Tutorial data model: identifiers, steps, tracks, and access modes.

use serde::{Deserialize, Serialize};

/// Identifier of a built-in tutorial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TutorialId {
    Dashboard,
    ProfileTabs,
    FacilityProfileTabs,
    Messages,
    Contracts,
    Calendar,
    Marketplace,
    Payroll,
    Organization,
    Account,
    Profile,
}

impl TutorialId {
    pub const ALL: [TutorialId; 11] = [
        Self::Dashboard,
        Self::ProfileTabs,
        Self::FacilityProfileTabs,
        Self::Messages,
        Self::Contracts,
        Self::Calendar,
        Self::Marketplace,
        Self::Payroll,
        Self::Organization,
        Self::Account,
        Self::Profile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::ProfileTabs => "profileTabs",
            Self::FacilityProfileTabs => "facilityProfileTabs",
            Self::Messages => "messages",
            Self::Contracts => "contracts",
            Self::Calendar => "calendar",
            Self::Marketplace => "marketplace",
            Self::Payroll => "payroll",
            Self::Organization => "organization",
            Self::Account => "account",
            Self::Profile => "profile",
        }
    }

    /// Parse a wire id. Unknown ids yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.as_str() == s)
    }

    /// Whether this is one of the profile-tab tutorials.
    pub fn is_profile_tutorial(&self) -> bool {
        matches!(self, Self::ProfileTabs | Self::FacilityProfileTabs)
    }
}

impl std::fmt::Display for TutorialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile tab identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProfileTab {
    PersonalDetails,
    ProfessionalBackground,
    BillingInformation,
    DocumentUploads,
    Settings,
    Marketplace,
    FacilityCoreDetails,
    FacilityLegalBilling,
    Account,
    DeleteAccount,
}

impl ProfileTab {
    pub const ALL: [ProfileTab; 10] = [
        Self::PersonalDetails,
        Self::ProfessionalBackground,
        Self::BillingInformation,
        Self::DocumentUploads,
        Self::Settings,
        Self::Marketplace,
        Self::FacilityCoreDetails,
        Self::FacilityLegalBilling,
        Self::Account,
        Self::DeleteAccount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PersonalDetails => "personalDetails",
            Self::ProfessionalBackground => "professionalBackground",
            Self::BillingInformation => "billingInformation",
            Self::DocumentUploads => "documentUploads",
            Self::Settings => "settings",
            Self::Marketplace => "marketplace",
            Self::FacilityCoreDetails => "facilityCoreDetails",
            Self::FacilityLegalBilling => "facilityLegalBilling",
            Self::Account => "account",
            Self::DeleteAccount => "deleteAccount",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tab| tab.as_str() == s)
    }
}

impl std::fmt::Display for ProfileTab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Onboarding track. Each track has its own sequence, tab order, and
/// persisted progress document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    Professional,
    Facility,
}

impl Track {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Professional => "professional",
            Self::Facility => "facility",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "professional" => Some(Self::Professional),
            "facility" => Some(Self::Facility),
            _ => None,
        }
    }

    /// The profile tutorial that opens this track.
    pub fn profile_tutorial(&self) -> TutorialId {
        match self {
            Self::Professional => TutorialId::ProfileTabs,
            Self::Facility => TutorialId::FacilityProfileTabs,
        }
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much of the application the user may reach.
///
/// `Full` is absorbing: once reached it cannot be left in-session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    Full,
    Team,
    #[default]
    Progressive,
}

impl AccessMode {
    /// Check whether moving from `self` to `target` is an allowed upgrade.
    pub fn can_transition_to(&self, target: AccessMode) -> bool {
        use AccessMode::*;
        matches!(
            (self, target),
            (Progressive, _) | (Team, Team) | (Team, Full) | (Full, Full)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Team => "team",
            Self::Progressive => "progressive",
        }
    }

    /// Parse a stored mode. The legacy value `enabled` means full access.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full" | "enabled" => Some(Self::Full),
            "team" => Some(Self::Team),
            "progressive" => Some(Self::Progressive),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of workspace the user is currently operating in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceType {
    #[default]
    Personal,
    Team,
    Admin,
}

/// Presentation hints carried by a step. The engine passes them through
/// without interpreting them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepHints {
    #[serde(default)]
    pub hide_previous: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_buttons: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_preview: Option<serde_json::Value>,
}

/// A single step of a tutorial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Unique within its tutorial.
    pub id: String,
    /// Path prefix this step lives on. Steps without one are continuations
    /// of the previous navigable step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight_tab: Option<ProfileTab>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight_sidebar_item: Option<String>,
    /// If true, the step never advances on a navigation match alone.
    #[serde(default)]
    pub requires_interaction: bool,
    #[serde(default)]
    pub requires_full_access: bool,
    /// Target of the step's "show me" button. Landing there advances a
    /// step that does not require interaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_path: Option<String>,
    /// Page a continuation step expects to be shown on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_page: Option<String>,
    #[serde(default)]
    pub hints: StepHints,
}

impl Step {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            navigation_path: None,
            highlight_tab: None,
            highlight_sidebar_item: None,
            requires_interaction: false,
            requires_full_access: false,
            action_path: None,
            required_page: None,
            hints: StepHints::default(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.navigation_path = Some(path.into());
        self
    }

    pub fn with_tab(mut self, tab: ProfileTab) -> Self {
        self.highlight_tab = Some(tab);
        self
    }

    pub fn with_sidebar_item(mut self, item: impl Into<String>) -> Self {
        self.highlight_sidebar_item = Some(item.into());
        self
    }

    pub fn with_action_path(mut self, path: impl Into<String>) -> Self {
        self.action_path = Some(path.into());
        self
    }

    pub fn on_page(mut self, page: impl Into<String>) -> Self {
        self.required_page = Some(page.into());
        self
    }

    pub fn with_hints(mut self, hints: StepHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn interactive(mut self) -> Self {
        self.requires_interaction = true;
        self
    }

    pub fn full_access_only(mut self) -> Self {
        self.requires_full_access = true;
        self
    }

    /// Whether this step is a same-page continuation (no navigation path).
    pub fn is_continuation(&self) -> bool {
        self.navigation_path.is_none()
    }
}

/// A statically defined tutorial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tutorial {
    pub id: TutorialId,
    pub steps: Vec<Step>,
}

impl Tutorial {
    pub fn new(id: TutorialId, steps: Vec<Step>) -> Self {
        Self { id, steps }
    }
}

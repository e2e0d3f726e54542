//! Route helpers: normalization and matching of dashboard paths.

use std::sync::LazyLock;

use regex::Regex;

use super::model::{ProfileTab, TutorialId};

pub const DASHBOARD: &str = "/dashboard";
pub const OVERVIEW: &str = "/dashboard/overview";
pub const PROFILE: &str = "/dashboard/profile";
pub const MESSAGES: &str = "/dashboard/messages";
pub const CONTRACTS: &str = "/dashboard/contracts";
pub const CALENDAR: &str = "/dashboard/calendar";
pub const MARKETPLACE: &str = "/dashboard/marketplace";
pub const PAYROLL: &str = "/dashboard/payroll";
pub const ORGANIZATION: &str = "/dashboard/organization";
pub const SETTINGS: &str = "/dashboard/settings";

static LOCALE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/(en|fr|de|it)(/|$)").expect("valid locale regex"));

static WORKSPACE_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/dashboard/(personal|team|admin)(/|$)").expect("valid workspace regex")
});

/// Strip query, fragment, locale prefix, workspace segment and trailing slash.
pub fn normalize(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = LOCALE_PREFIX.replace(path, "/");
    let path = WORKSPACE_SEGMENT.replace(&path, "/dashboard/");
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Whether `current` lies on `required`, segment-wise.
///
/// `/dashboard` counts as the overview page.
pub fn path_matches(current: &str, required: &str) -> bool {
    let current = normalize(current);
    let required = normalize(required);

    if current == required {
        return true;
    }
    if current.starts_with(&required) && current[required.len()..].starts_with('/') {
        return true;
    }
    required == OVERVIEW && current == DASHBOARD
}

pub fn is_dashboard_path(path: &str) -> bool {
    normalize(path).starts_with(DASHBOARD)
}

pub fn is_profile_path(path: &str) -> bool {
    path_matches(path, PROFILE)
}

pub fn is_overview_path(path: &str) -> bool {
    path_matches(path, OVERVIEW)
}

/// Page check used for enforcement. Any profile sub-page satisfies any
/// other profile requirement.
pub fn is_on_correct_page(current: &str, required: &str) -> bool {
    if path_matches(current, required) {
        return true;
    }
    is_profile_path(required) && is_profile_path(current)
}

pub fn profile_tab_path(tab: ProfileTab) -> String {
    format!("{PROFILE}/{tab}")
}

/// Last path segment, used as the sidebar item name.
pub fn item_name(path: &str) -> String {
    normalize(path)
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Dashboard route a tutorial lives on. Defaults to the overview.
pub fn path_for_tutorial(tutorial: TutorialId) -> &'static str {
    match tutorial {
        TutorialId::Dashboard => OVERVIEW,
        TutorialId::ProfileTabs | TutorialId::FacilityProfileTabs | TutorialId::Profile => PROFILE,
        TutorialId::Messages => MESSAGES,
        TutorialId::Contracts => CONTRACTS,
        TutorialId::Calendar => CALENDAR,
        TutorialId::Marketplace => MARKETPLACE,
        TutorialId::Payroll => PAYROLL,
        TutorialId::Organization => ORGANIZATION,
        TutorialId::Account => SETTINGS,
    }
}

/// Append the workspace query parameter when a workspace is selected.
pub fn with_workspace(path: &str, workspace_id: Option<&str>) -> String {
    match workspace_id {
        Some(id) if !id.is_empty() => format!("{path}?workspace={id}"),
        _ => path.to_string(),
    }
}

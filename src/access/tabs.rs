//! Profile tab gating.

use crate::tutorial::{AccessMode, ProfileTab, Track};

/// Tabs that stay locked while the user is in team access.
pub const TEAM_LOCKED_TABS: [ProfileTab; 3] = [
    ProfileTab::ProfessionalBackground,
    ProfileTab::BillingInformation,
    ProfileTab::DocumentUploads,
];

/// Tabs whose completion always unlocks the following tab.
const ALWAYS_ADVANCING_TABS: [ProfileTab; 2] = [ProfileTab::Account, ProfileTab::Marketplace];

/// Ordered profile tabs of a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabOrder {
    tabs: Vec<ProfileTab>,
}

impl TabOrder {
    pub fn new(tabs: Vec<ProfileTab>) -> Self {
        Self { tabs }
    }

    pub fn for_track(track: Track) -> Self {
        use ProfileTab::*;
        match track {
            Track::Professional => Self::new(vec![
                PersonalDetails,
                ProfessionalBackground,
                BillingInformation,
                DocumentUploads,
                Marketplace,
                Account,
            ]),
            Track::Facility => Self::new(vec![
                FacilityCoreDetails,
                FacilityLegalBilling,
                Marketplace,
                Account,
            ]),
        }
    }

    pub fn tabs(&self) -> &[ProfileTab] {
        &self.tabs
    }

    /// First tab of the order; personal details for an empty order.
    pub fn first(&self) -> ProfileTab {
        self.tabs
            .first()
            .copied()
            .unwrap_or(ProfileTab::PersonalDetails)
    }

    pub fn position(&self, tab: ProfileTab) -> Option<usize> {
        self.tabs.iter().position(|t| *t == tab)
    }

    pub fn next_after(&self, tab: ProfileTab) -> Option<ProfileTab> {
        self.position(tab)
            .and_then(|i| self.tabs.get(i + 1))
            .copied()
    }
}

/// Tab whose completion grants full access on this track.
pub fn critical_tab(track: Track) -> ProfileTab {
    match track {
        Track::Professional => ProfileTab::DocumentUploads,
        Track::Facility => ProfileTab::FacilityLegalBilling,
    }
}

/// Inputs to [`is_profile_tab_accessible`].
#[derive(Debug, Clone, Copy)]
pub struct TabContext<'a> {
    pub access_mode: AccessMode,
    pub tutorial_passed: bool,
    pub max_accessed_tab: ProfileTab,
    /// Tab highlighted by the active step, if any.
    pub current_highlight: Option<ProfileTab>,
    pub order: &'a TabOrder,
}

pub fn is_profile_tab_accessible(tab: ProfileTab, ctx: &TabContext<'_>) -> bool {
    if ctx.access_mode == AccessMode::Team && TEAM_LOCKED_TABS.contains(&tab) {
        return false;
    }
    if ctx.access_mode == AccessMode::Full || ctx.tutorial_passed {
        return true;
    }
    if ctx.current_highlight == Some(tab) {
        return true;
    }
    let Some(position) = ctx.order.position(tab) else {
        return true;
    };
    ctx.order
        .position(ctx.max_accessed_tab)
        .is_some_and(|max| position <= max)
}

/// Tab to unlock after `completed` is finished, if any.
///
/// Only the current high-water tab or an always-advancing tab moves the
/// mark, and the last tab of the order unlocks nothing.
pub fn tab_to_unlock(
    completed: ProfileTab,
    max_accessed: ProfileTab,
    order: &TabOrder,
) -> Option<ProfileTab> {
    let index = order.position(completed)?;
    let advances = order.position(max_accessed) == Some(index)
        || ALWAYS_ADVANCING_TABS.contains(&completed);
    if !advances {
        return None;
    }
    order.tabs().get(index + 1).copied()
}

/// Whether completing `tab` flips the session to full access.
pub fn grants_full_access(tab: ProfileTab, track: Track, in_profile_tutorial: bool) -> bool {
    tab == critical_tab(track) || (in_profile_tutorial && tab == ProfileTab::Account)
}

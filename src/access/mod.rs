//! Access evaluation for features, sidebar items, and profile tabs.

pub mod rules;
pub mod tabs;

pub use rules::{AccessCondition, AccessContext, AccessRules, FeatureRule};
pub use tabs::{TabContext, TabOrder, is_profile_tab_accessible};

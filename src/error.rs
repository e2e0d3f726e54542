//! Error types for the onboarding engine.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised while building tutorial catalogs and sequence graphs.
///
/// These only surface at load time; runtime lookups never fail.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Tutorial {tutorial} is defined more than once")]
    DuplicateTutorial { tutorial: String },

    #[error("Step {step} appears more than once in tutorial {tutorial}")]
    DuplicateStep { tutorial: String, step: String },

    #[error("Tutorial {tutorial} appears more than once in the {track} sequence")]
    DuplicateSequenceEntry { track: String, tutorial: String },

    #[error("Sequence {track}: {from} points at {to}, which is not part of the track")]
    DanglingNext {
        track: String,
        from: String,
        to: String,
    },

    #[error("Sequence {track} contains a cycle through {tutorial}")]
    Cycle { track: String, tutorial: String },

    #[error("Sequence {track} must have exactly one terminal entry, found {count}")]
    TerminalCount { track: String, count: usize },

    #[error("Sequence for track {track} is defined more than once")]
    DuplicateTrack { track: String },

    #[error("Guard on tutorial {tutorial} hands off at unknown step {step}")]
    UnknownGuardStep { tutorial: String, step: String },
}

/// Progress store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;

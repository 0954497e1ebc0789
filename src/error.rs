//! Error types for station_flow.

use std::path::PathBuf;

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while loading a station, building its
/// rule graph, walking it, or composing a timeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A group tag is unknown, or its base directory could not be resolved.
    #[error("File group not found: {0}")]
    FileGroupNotFound(String),

    /// A `file` source names a file tag absent from its group.
    #[error("File '{file}' not found in group '{group}'")]
    MissingGroupOrFile { group: String, file: String },

    /// A group-backed source needs at least two candidates.
    #[error("Group '{group}' has {count} file(s), at least 2 are required")]
    EmptyGroup { group: String, count: usize },

    /// A transition or the first-fragment pointer names an unknown fragment.
    #[error("Fragment not found: {0}")]
    MissingFragment(String),

    /// Sampling the fragment's transition edges did not select any edge.
    #[error("Transition set of fragment '{0}' is not exhaustive")]
    NotExhaustiveTransition(String),

    /// The fragment's source produced no file.
    #[error("Wrong source for fragment '{0}'")]
    WrongSource(String),

    /// A mix rule refers to a position the mixin does not declare.
    #[error("Position '{position}' not declared in mixins of fragment '{fragment}'")]
    MissingPositionTag { fragment: String, position: String },

    /// A source kind that cannot serve the role it was given.
    #[error("Invalid source for fragment '{fragment}': {reason}")]
    InvalidSource { fragment: String, reason: String },

    /// A mix file could be placed on a host shorter than itself.
    #[error(
        "Mix '{mix}' ({mix_duration:.2}s) is longer than a host file of fragment '{fragment}' ({host_duration:.2}s)"
    )]
    MixLongerThanHost {
        fragment: String,
        mix: String,
        mix_duration: f64,
        host_duration: f64,
    },

    #[error("Composition creation failure: {0}")]
    CompositionCreationFailure(String),

    #[error("Asset not found: {}", .0.display())]
    AssetNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
}

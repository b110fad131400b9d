//! Error types for the traffic controller.

use thiserror::Error;

use crate::entity::{LaneId, TemplateId};

/// Result type alias using [`TrafficError`].
pub type Result<T> = std::result::Result<T, TrafficError>;

/// Top-level error type for all traffic controller errors.
///
/// Only [`TrafficError::InvalidConfig`] and
/// [`TrafficError::MissingTemplateMetadata`] are fatal, and only while a
/// configuration is being validated. Everything else is transient: the
/// controller logs it, skips the affected action for the current tick and
/// retries later.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrafficError {
    /// Every instance of a template is already on the road.
    #[error("Pool exhausted for template {0}")]
    PoolExhausted(TemplateId),

    /// No template has a free instance left.
    #[error("No template available: every pool is exhausted")]
    NoAvailableTemplate,

    /// Template identifier not known to the pool registry.
    #[error("Unknown template: {0}")]
    UnknownTemplate(TemplateId),

    /// Lane identifier not present in the lane layout.
    #[error("Unknown lane: {0}")]
    UnknownLane(LaneId),

    /// Lane group index out of range.
    #[error("Unknown lane group: {0}")]
    UnknownGroup(usize),

    /// Every lane is on spawn cooldown.
    #[error("No eligible lane: all lanes are on cooldown")]
    NoEligibleLane,

    /// No template could take over the ban without violating the
    /// active-instance check.
    #[error("Ban rotation blocked for lane group {group}")]
    BanRotationBlocked {
        /// Index of the lane group whose rotation failed.
        group: usize,
    },

    /// A template cannot be displayed while banned.
    #[error("Template '{name}' ({id}) has no display asset")]
    MissingTemplateMetadata {
        /// Template identifier.
        id: TemplateId,
        /// Template name.
        name: String,
    },

    /// Configuration failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

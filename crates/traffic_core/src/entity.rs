//! Identifiers and the pooled entity types.
//!
//! A [`Template`] is a kind of car that can be spawned; an [`Instance`] is one
//! pre-allocated occurrence of a template that cycles between its pool's free
//! list and a lane.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for templates (car kinds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(pub u32);

impl TemplateId {
    /// Create a new template ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "template#{}", self.0)
    }
}

/// Unique identifier for lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaneId(pub u32);

impl LaneId {
    /// Create a new lane ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lane#{}", self.0)
    }
}

/// Unique identifier for pooled instances.
///
/// Instance IDs are dense indices into the pool registry's arena and stay
/// valid for the lifetime of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub u32);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance#{}", self.0)
    }
}

/// A spawnable car kind. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// Unique identifier.
    pub id: TemplateId,
    /// Display name, used in logs.
    pub name: String,
    /// Asset shown on the ban sign while this template is banned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_asset: Option<String>,
    /// Must never be shot (an ambulance). Hitting one ends the round, and
    /// the template is never banned.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub protected: bool,
}

impl Template {
    /// Create a template without a display asset.
    #[must_use]
    pub fn new(id: TemplateId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            display_asset: None,
            protected: false,
        }
    }

    /// Attach the asset shown while this template is banned.
    #[must_use]
    pub fn with_display_asset(mut self, asset: impl Into<String>) -> Self {
        self.display_asset = Some(asset.into());
        self
    }

    /// Mark the template as protected.
    #[must_use]
    pub fn as_protected(mut self) -> Self {
        self.protected = true;
        self
    }
}

/// A point in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate (across the road).
    pub x: f32,
    /// Y coordinate (height).
    pub y: f32,
    /// Z coordinate (along the road).
    pub z: f32,
}

impl Position {
    /// World origin.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Create a new position.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Travel direction of a car. Lanes on the negative-x side drive towards
/// positive x and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Heading {
    /// Driving towards +x.
    PositiveX,
    /// Driving towards -x.
    NegativeX,
}

impl Heading {
    /// Heading mirrored by the side of the road the anchor sits on.
    #[must_use]
    pub fn for_anchor(anchor: Position) -> Self {
        if anchor.x < 0.0 {
            Self::PositiveX
        } else {
            Self::NegativeX
        }
    }

    /// Unit direction along the x axis.
    #[must_use]
    pub const fn direction_x(self) -> f32 {
        match self {
            Self::PositiveX => 1.0,
            Self::NegativeX => -1.0,
        }
    }

    /// Yaw in degrees for the presentation layer.
    #[must_use]
    pub const fn yaw_degrees(self) -> f32 {
        match self {
            Self::PositiveX => 90.0,
            Self::NegativeX => -90.0,
        }
    }
}

/// One pooled occurrence of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Arena identifier.
    pub id: InstanceId,
    /// Template this instance was allocated for.
    pub template: TemplateId,
    /// Lane the instance is driving in; `None` while pooled or unassigned.
    pub lane: Option<LaneId>,
    /// Whether the instance is currently out of its pool.
    pub active: bool,
    /// Controller clock (seconds) at the last acquire.
    pub acquired_at: f32,
    /// Current world position.
    pub position: Position,
    /// Current heading.
    pub heading: Heading,
    /// Distance driven since spawning.
    pub travelled: f32,
}

impl Instance {
    /// Create a pooled, inactive instance.
    #[must_use]
    pub fn pooled(id: InstanceId, template: TemplateId) -> Self {
        Self {
            id,
            template,
            lane: None,
            active: false,
            acquired_at: 0.0,
            position: Position::ZERO,
            heading: Heading::PositiveX,
            travelled: 0.0,
        }
    }

    /// Move the instance to its spawn anchor facing away from the road side.
    pub fn place(&mut self, lane: LaneId, anchor: Position) {
        self.lane = Some(lane);
        self.position = anchor;
        self.heading = Heading::for_anchor(anchor);
        self.travelled = 0.0;
    }

    /// Advance along the heading by `distance`.
    pub fn advance(&mut self, distance: f32) {
        self.position.x += self.heading.direction_x() * distance;
        self.travelled += distance;
    }
}

//! # Traffic Core
//!
//! Deterministic lane-traffic controller for a road-crossing arcade game.
//!
//! This crate contains **only** game-rule logic:
//! - No rendering
//! - No IO
//! - No system randomness (every draw goes through an injected source)
//!
//! Cars are pooled per template, spawned into lanes on a timer, tracked until
//! they arrive or are reclaimed, and one template per lane group is "banned"
//! at any time. Banned cars that reach the far side cost the player health;
//! shooting them scores.
//!
//! ## Crate Structure
//!
//! - [`pool`] - Fixed-capacity instance pools, one per template
//! - [`lanes`] - Which instances are driving in which lane
//! - [`cooldown`] - Recently used spawn lanes
//! - [`ban`] - Ban rotation state machine, per lane group
//! - [`spawner`] - Spawn timing plus lane and template selection
//! - [`watchdog`] - Reclaims cars that never arrive
//! - [`controller`] - Ties it all together behind a tick loop

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod ban;
pub mod config;
pub mod controller;
pub mod cooldown;
pub mod entity;
pub mod error;
pub mod health;
pub mod lanes;
pub mod placement;
pub mod pool;
pub mod rng;
pub mod spawner;
pub mod watchdog;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::ban::{BanCause, BanChange, BanController, BanEvent, BanState, OverrideRejection};
    pub use crate::config::{
        BanDisplay, BanSettings, HealthSettings, LaneGroupConfig, PoolSettings, SpawnSettings,
        TrafficConfig,
    };
    pub use crate::controller::{
        ArrivalOutcome, HitOutcome, Notification, RoundState, TickEvents, TrafficController,
    };
    pub use crate::entity::{Heading, Instance, InstanceId, LaneId, Position, Template, TemplateId};
    pub use crate::error::{Result, TrafficError};
    pub use crate::health::{DamageSink, Health, HealthReport};
    pub use crate::placement::{LaneConfig, LaneLayout, LanePlacement};
    pub use crate::rng::{RandomSource, SeededRandom};
    pub use crate::spawner::SpawnRecord;
}

//! Territory loading on top of the registry, task pool, and zone codec.

pub mod territory;

pub use territory::{LoadStage, Territory, TerritoryZone};

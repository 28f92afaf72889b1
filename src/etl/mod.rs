//! Data preparation stages: seeding, mart building, feature splits and BI export.

pub mod export;
pub mod features;
pub mod mart;
pub mod seed;

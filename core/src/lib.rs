//! Lagrangian point advection core: meteorology windows, point
//! populations, and the step loop that moves one through the other.

pub mod archive;
pub mod clock;
pub mod config;
pub mod culling_subsystem;
pub mod domain;
pub mod engine;
pub mod error;
pub mod event;
pub mod met_field;
pub mod met_source;
pub mod physics_subsystem;
pub mod point;
pub mod rng;
pub mod seeding_subsystem;
pub mod store;
pub mod subsystem;
pub mod types;
pub mod vertical;

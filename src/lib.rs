//! Cruise-phase segmentation and least-squares fuel-flow modelling for
//! flight-test telemetry.

pub mod config;
pub mod data;
pub mod error;
pub mod learn;
pub mod pipeline;

pub use error::ModelError;

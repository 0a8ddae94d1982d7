//! mcqeval-core: run controller, question store, and scoring.
//!
//! This crate defines the data model, the answer-service and store traits,
//! and the run controller that drives an evaluation sweep and streams its
//! progress to observers.

pub mod answer;
pub mod controller;
pub mod error;
pub mod events;
pub mod model;
pub mod parser;
pub mod statistics;
pub mod store;
pub mod traits;

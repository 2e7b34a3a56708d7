//! ApsaraStack Core
//!
//! Resource model, schemas and the plan/apply engine shared by the provider
//! and the CLI. Side effects are represented as values until interpreted.

pub mod differ;
pub mod effect;
pub mod interpreter;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod schema;

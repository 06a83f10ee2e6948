//! Domain logic for the tab tree engine.
//!
//! This module contains core business logic:
//! - Classification (pointer position to drop placement)
//! - Tree operations (move, reorder, delete and bulk insert on a registry)
//! - Validation (field rules for tabs, groups and notes)
//! - Mutation (gesture handling and intent sequencing against the store)
//! - Materialization (presentation forest and flattened rows)

pub mod classifier;
pub mod tree_operations;
pub mod validation;
pub mod mutator;
pub mod materializer;

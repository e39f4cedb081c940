//! The CTBN classification engine.
//!
//! This module provides:
//! - **errors**: Error type shared by every operation
//! - **indexing**: Variable name ⇄ id mapping and its registry
//! - **evidence**: Caller-owned scratch states used while walking a model
//! - **radix** / **cim** / **node**: Parent-entry encoding, CIMs and the node record
//! - **model**: Node ownership and structure editing
//! - **trajectory**: Sparse-delta trajectories and their dense view
//! - **sufficient_stats** / **learning**: Maximum-likelihood parameter learning
//! - **classify**: Sequential-filter classification of trajectories
//! - **sampling**: Forward simulation
//! - **model_selection**: Structure scoring for external search

pub mod cim;
pub mod classify;
pub mod errors;
pub mod evidence;
pub mod indexing;
pub mod learning;
pub mod model;
pub mod model_selection;
pub mod node;
pub mod radix;
pub mod sampling;
pub mod sufficient_stats;
pub mod trajectory;

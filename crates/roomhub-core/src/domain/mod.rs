//! Pure domain types for the dispatch core.
//!
//! Everything here is plain data: snapshots are built once (at load or
//! reload), handed to the dispatcher behind an `Arc`, and never mutated in
//! place.

pub mod action;
pub mod activity;
pub mod edge;
pub mod keymap;

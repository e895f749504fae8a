//! Lingo API Library Crate
//!
//! This library contains all the logic for the Lingo web service: the
//! application state, the record store and its PostgreSQL backend, the
//! conversation and quiz orchestration, API handlers and routing. The `api`
//! binary is a thin wrapper around this library.

pub mod config;
pub mod conversation;
pub mod db;
pub mod handlers;
pub mod models;
pub mod quiz;
pub mod router;
pub mod state;
pub mod store;

//! # Engine Module
//!
//! Internal implementation of the entity-component-relation runtime.
//!
//! This module contains all core building blocks such as:
//! - The data type registry and type-erased storage
//! - Entity handles and the archetype graph
//! - Dense component tables and sparse relation tables
//! - Query terms, filters and typed fetches
//! - Observers, commands and blueprints
//! - Systems and the tag-driven dispatcher
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod config;
pub mod storage;
pub mod registry;
pub mod entity;
pub mod archetype;
pub mod table;
pub mod world;
pub mod query;
pub mod observers;
pub mod commands;
pub mod blueprint;
pub mod systems;
pub mod scheduler;
pub mod dispatcher;
pub mod app;

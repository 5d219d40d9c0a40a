//! Product recommendation service for the marketplace.
//!
//! Serves three strategies (`similar`, `forYou`, `popular`) over a product
//! catalog and an interaction log, memoized by a single-flight TTL cache.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;

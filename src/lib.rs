//! eballscan - query and ingestion API for the ecoball blockchain explorer
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Request Contract
//! - [`validation`] - Typed extraction of posted form fields
//! - [`pagination`] - Page requests, page counts and slicing
//! - [`api`] - Endpoint handlers, error envelope and router
//!
//! ## Data
//! - [`model`] - Block, transaction and account records
//! - [`persistence`] - Storage trait with SQLite and in-memory backends
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Request Contract
// ============================================================================
pub mod pagination;
pub mod validation;

#[cfg(feature = "api")]
pub mod api;

// ============================================================================
// Data
// ============================================================================
pub mod model;
pub mod persistence;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;

//! Shared data model for the StrategyForge services.
//!
//! The auth core only needs the account record, its public projection and
//! the JWT payloads; everything lives in [`auth`].

pub mod auth;

pub use auth::*;

//! Identity bridge between an external auth provider and the application's
//! own user store.
//!
//! ARCHITECTURE
//! ============
//! The provider owns identities and credentials. This crate owns application
//! users and the link table joining the two. Provider lifecycle events flow
//! through `services::dispatch` into `services::sync`, which keeps exactly one
//! linked application user per identity. Readers get a merged view of both.

pub mod config;
pub mod db;
pub mod identity;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

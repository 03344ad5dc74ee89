//! Domain services used by the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! `sync` owns the identity bridge invariants, `dispatch` gives it ordered
//! event delivery, and `provider` talks to the external auth provider. Route
//! handlers stay focused on protocol translation and auth plumbing.

pub mod dispatch;
pub mod provider;
pub mod sync;

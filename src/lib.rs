//! Membership portal access core.
//!
//! ARCHITECTURE
//! ============
//! The portal delegates identity and profile storage to an external platform.
//! This crate owns the parts that decide what a visitor may see:
//!
//! - `session` folds identity and profile notifications into one `Session`.
//! - `holder` runs that reducer against live collaborators on a tokio task.
//! - `gate` maps a session plus route requirements to a single decision.
//! - `routes` and `navigation` bind decisions to concrete paths and pages.
//!
//! `flows` and `admin` cover the account lifecycle around the gate
//! (registration, login, verification, review, admin seeding).

pub mod admin;
pub mod config;
pub mod flows;
pub mod gate;
pub mod holder;
pub mod identity;
pub mod navigation;
pub mod profile;
pub mod routes;
pub mod session;
pub mod store;

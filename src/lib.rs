//! Vigil - scheduled lifecycle management for ocserv VPN subscribers
//!
//! Vigil is the background worker that keeps subscriber accounts in their
//! correct lifecycle state: overdue accounts are expired and locked, monthly
//! quota accounts are reactivated at the start of the month, and accounts
//! inactive past the retention window are purged. On startup it replays any
//! job runs missed while the process was down.
//!
//! # Features
//!
//! - `sqlite` - SQLite database backend. Enabled by default.
//! - `postgres` - PostgreSQL database backend.
//!
//! # Example
//!
//! ```toml
//! # Use defaults (sqlite)
//! vigil = { git = "https://github.com/dmriding/vigil" }
//!
//! # PostgreSQL backend
//! vigil = { git = "https://github.com/dmriding/vigil", default-features = false, features = ["postgres"] }
//! ```

pub mod config;
pub mod db;
pub mod errors;
pub mod jobs;
pub mod ocserv;

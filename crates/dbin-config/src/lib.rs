//! Configuration for dbin
//!
//! This crate handles:
//! - Global configuration (`~/.config/dbin/config.toml`)
//! - The database catalog: data records describing how to run each database
//! - `${...}` substitution inside catalog values

mod builtin;
mod catalog;
mod error;
mod global;
mod substitute;

pub use catalog::*;
pub use error::*;
pub use global::*;
pub use substitute::*;

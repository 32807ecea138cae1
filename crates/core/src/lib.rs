//! Core types, errors and configuration for the apexlog ecosystem.
//!
//! Everything in this crate is shared by the exec, auth and tooling layers:
//! the coded error taxonomy, the org credential handle, the Tooling API
//! record shapes, tunables and the injectable clock.

pub mod clock;
pub mod config;
pub mod error;
pub mod test_utils;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use config::AccessConfig;
pub use error::{Error, Result};
pub use types::{ApexLogRow, AuthSnapshot, DebugLevel, LogUser, OrgAuth, OrgItem};

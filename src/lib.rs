//! Open Telekom Cloud automation modules
//!
//! Each module takes a small parameter set, calls the OTC APIs through
//! [`otc::client::OtcClient`] and returns a JSON-serializable result:
//!
//! - [`vpc`] - VPC peering reconciliation (create/rename/delete)
//! - [`css`] - Cloud Search Service cluster info
//! - [`deh`] - Dedicated Host info

pub mod config;
pub mod css;
pub mod deh;
pub mod error;
pub mod otc;
pub mod vpc;

pub use error::{ModuleError, Result};

/// Version injected at compile time via OTC_MODULES_VERSION env var (set by
/// CI/CD), or the crate version for local builds.
pub const VERSION: &str = match option_env!("OTC_MODULES_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};

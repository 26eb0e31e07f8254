pub mod config;
pub mod error;
pub mod types;

use chrono::Utc;

pub use config::AppConfig;
pub use error::PackError;
pub use types::*;

/// Current wall time as fractional seconds since the Unix epoch.
pub fn now_ts() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
}

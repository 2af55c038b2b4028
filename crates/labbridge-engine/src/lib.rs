/*!
 * labbridge engine
 *
 * This crate turns resolved devices into outbound streams: stream metadata,
 * outlet backends, the per-device acquisition loop with its rate bookkeeping,
 * the session supervisor and the scan report.
 */

#![warn(missing_docs)]

pub mod acquisition;
pub mod error;
pub mod outlet;
pub mod rate;
pub mod report;
pub mod stream;
pub mod supervisor;

pub use acquisition::{AcquisitionLoop, AcquisitionState, SessionSummary, StopReason, StopSignal};
pub use error::{Error, Result};
pub use outlet::{
    factory_for, LogOutletFactory, MemoryOutletFactory, Outlet, OutletFactory, StreamPublisher,
};
#[cfg(feature = "lsl")]
pub use outlet::LslOutletFactory;
pub use rate::{RateTracker, RateWindow};
pub use report::ScanReport;
pub use stream::StreamDescriptor;
pub use supervisor::{check_device_count, SessionSupervisor};

/// labbridge engine crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

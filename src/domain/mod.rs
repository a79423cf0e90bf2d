//! Domain layer: contract descriptors, units and the run report

pub mod abi;
pub mod report;
pub mod units;

pub use report::{ConsoleSink, NullSink, Report, ReportEntry, ReportSink, Step};
pub use units::{format_ether, format_ether_signed, format_token, BalanceDelta};

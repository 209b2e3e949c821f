//! Backend module - contract, provider adapters, registry and call statistics

pub mod providers;
pub mod registry;
pub mod stats;
pub mod stream;
pub mod traits;

pub use registry::{BackendFactory, BackendListing, BackendRegistry};
pub use stats::{CallRecord, CallStats, StatsSnapshot};
pub use traits::{
    BackendInfo, ConnectivityReport, Credentials, FragmentStream, Generation, TextBackend,
};

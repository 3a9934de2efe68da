//! Network connectivity detection.

pub mod monitor;
pub mod probe;

pub use monitor::{
    callback_fn, ConnectivityCallback, ConnectivityMonitor, ConnectivityState, NetworkStatus,
};
pub use probe::{HttpProber, Prober};

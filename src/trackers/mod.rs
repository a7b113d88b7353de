//! C2-C4: the feedback trackers the router and portfolio optimizer consult
//! (calibration, variance, trust), each owning its own store.

pub mod calibration;
pub mod trust;
pub mod variance;

pub use calibration::{effective_expertise, CalibrationRecord, CalibrationStore};
pub use trust::{TrustEntry, TrustTracker, WorkerTrustSignal};
pub use variance::{VarianceBucket, VarianceTracker};

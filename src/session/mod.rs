//! Session state: the canonical snapshot and the aggregator that owns it.

mod aggregator;
pub mod flight_mode;
pub mod geo;
mod snapshot;

pub use aggregator::{
    Aggregator, ApplyOutcome, ArmState, HomeState, MAX_MOVEMENT_METERS, MIN_MOVEMENT_METERS,
};
pub use flight_mode::flight_mode_name;
pub use geo::GeoPoint;
pub use snapshot::{Attitude, FlightTime, GpsFixType, TelemetrySnapshot};

//! Session state aggregation.
//!
//! The [`Aggregator`] is the single writer of the session snapshot. It merges
//! partial updates, runs the home and arming state machines, keeps the
//! odometer, and reports notable transitions as log events.

use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

use super::flight_mode::{UNKNOWN_MODE, flight_mode_name};
use super::geo::GeoPoint;
use super::snapshot::{Attitude, FlightTime, TelemetrySnapshot};
use crate::interpret::PartialUpdate;
use crate::log_event::LogEvent;

/// Movements at or below this are treated as GPS jitter.
pub const MIN_MOVEMENT_METERS: f64 = 0.5;
/// Movements at or above this between fixes are treated as implausible jumps.
pub const MAX_MOVEMENT_METERS: f64 = 100.0;

/// Home position state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HomeState {
    AwaitingHome,
    HomeSet(GeoPoint),
}

/// Arming state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmState {
    Disarmed,
    Armed { since: Instant },
}

/// Result of applying one partial update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyOutcome {
    /// A new snapshot should be published
    pub snapshot_changed: bool,
    /// Transition worth surfacing in the session log
    pub log: Option<LogEvent>,
}

/// Owner of the canonical session state.
#[derive(Debug)]
pub struct Aggregator {
    snapshot: TelemetrySnapshot,
    home: HomeState,
    arm: ArmState,
    previous_fix: Option<GeoPoint>,
    last_update: Option<Instant>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            snapshot: TelemetrySnapshot::default(),
            home: HomeState::AwaitingHome,
            arm: ArmState::Disarmed,
            previous_fix: None,
            last_update: None,
        }
    }

    pub fn snapshot(&self) -> &TelemetrySnapshot {
        &self.snapshot
    }

    /// Immutable copy of the current state for subscribers.
    pub fn publish(&self) -> Arc<TelemetrySnapshot> {
        Arc::new(self.snapshot.clone())
    }

    pub fn home_state(&self) -> HomeState {
        self.home
    }

    pub fn arm_state(&self) -> ArmState {
        self.arm
    }

    /// Instant of the most recent applied update.
    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    /// Merge one partial update received at `now`.
    pub fn apply(&mut self, update: PartialUpdate, now: Instant) -> ApplyOutcome {
        self.last_update = Some(now);
        let changed = update.telemetry_changed();

        match update {
            PartialUpdate::Heartbeat { flight_mode_code, armed, system_status } => {
                self.apply_heartbeat(flight_mode_code, armed, system_status, now)
            }
            PartialUpdate::Position {
                latitude,
                longitude,
                altitude_msl,
                relative_altitude,
                heading,
            } => {
                let s = &mut self.snapshot;
                s.latitude = latitude;
                s.longitude = longitude;
                s.altitude_msl = altitude_msl;
                s.relative_altitude = relative_altitude;
                if let Some(heading) = heading {
                    s.heading = heading;
                }
                let log = self.apply_fix(latitude, longitude);
                ApplyOutcome { snapshot_changed: changed, log }
            }
            PartialUpdate::Attitude { roll, pitch, yaw } => {
                self.snapshot.attitude = Attitude { roll, pitch, yaw };
                ApplyOutcome { snapshot_changed: changed, log: None }
            }
            PartialUpdate::Battery { voltage, remaining_percent, current, sensors_health } => {
                let s = &mut self.snapshot;
                s.battery_voltage = voltage;
                s.battery_remaining_percent = remaining_percent;
                s.battery_current = current;
                s.sensors_health = sensors_health;
                ApplyOutcome { snapshot_changed: changed, log: None }
            }
            PartialUpdate::Gps { fix_type, satellite_count } => {
                self.snapshot.gps_fix_type = fix_type;
                self.snapshot.satellite_count = satellite_count;
                ApplyOutcome { snapshot_changed: changed, log: None }
            }
            PartialUpdate::Hud {
                airspeed,
                groundspeed,
                heading,
                throttle_percent,
                altitude_msl,
                climb_rate,
            } => {
                let s = &mut self.snapshot;
                s.airspeed = airspeed;
                s.groundspeed = groundspeed;
                s.heading = heading;
                s.throttle_percent = throttle_percent;
                s.altitude_msl = altitude_msl;
                s.climb_rate = climb_rate;
                ApplyOutcome { snapshot_changed: changed, log: None }
            }
            PartialUpdate::StatusText { severity, text } => {
                debug!(severity, "Status text: {}", text);
                ApplyOutcome { snapshot_changed: false, log: Some(LogEvent::now(text)) }
            }
        }
    }

    fn apply_heartbeat(
        &mut self,
        flight_mode_code: u32,
        armed: bool,
        system_status: u8,
        now: Instant,
    ) -> ApplyOutcome {
        let s = &mut self.snapshot;
        let mut changed = false;

        if s.flight_mode_code != flight_mode_code || s.flight_mode == UNKNOWN_MODE {
            s.flight_mode_code = flight_mode_code;
            s.flight_mode = flight_mode_name(flight_mode_code);
            changed = true;
        }
        if s.system_status != system_status {
            s.system_status = system_status;
            changed = true;
        }

        let log = match (self.arm, armed) {
            (ArmState::Disarmed, true) => {
                self.arm = ArmState::Armed { since: now };
                s.armed = true;
                s.flight_started_at = Some(Utc::now());
                s.flight_time = FlightTime(0);
                changed = true;
                info!(mode = %s.flight_mode, "Vehicle armed");
                Some(LogEvent::now("Vehicle armed"))
            }
            (ArmState::Armed { .. }, false) => {
                self.arm = ArmState::Disarmed;
                s.armed = false;
                s.flight_started_at = None;
                changed = true;
                info!(flight_time = %s.flight_time, "Vehicle disarmed");
                Some(LogEvent::now("Vehicle disarmed"))
            }
            _ => None,
        };

        ApplyOutcome { snapshot_changed: changed, log }
    }

    /// Home, odometer and bearing for a position report.
    fn apply_fix(&mut self, latitude: f64, longitude: f64) -> Option<LogEvent> {
        if latitude == 0.0 || longitude == 0.0 {
            return None;
        }
        let fix = GeoPoint::new(latitude, longitude);
        let mut log = None;

        if self.home == HomeState::AwaitingHome {
            self.home = HomeState::HomeSet(fix);
            self.snapshot.home_position = Some(fix);
            info!(latitude, longitude, "Home position acquired");
            log = Some(LogEvent::now(format!(
                "Home position set: {:.6}, {:.6}",
                latitude, longitude
            )));
        }

        if let Some(previous) = self.previous_fix {
            let moved = previous.distance_to(&fix);
            if moved > MIN_MOVEMENT_METERS && moved < MAX_MOVEMENT_METERS {
                self.snapshot.distance_travelled_meters += moved;
            }
        }
        self.previous_fix = Some(fix);

        if let HomeState::HomeSet(home) = self.home {
            self.snapshot.bearing_from_home_degrees = Some(home.bearing_to(&fix));
            self.snapshot.bearing_to_home_degrees = Some(fix.bearing_to(&home));
        }

        log
    }

    /// Recompute the displayed flight time. Returns true when it changed.
    pub fn tick_flight_timer(&mut self, now: Instant) -> bool {
        let ArmState::Armed { since } = self.arm else { return false };
        let elapsed = FlightTime(now.saturating_duration_since(since).as_secs());
        if elapsed == self.snapshot.flight_time {
            return false;
        }
        self.snapshot.flight_time = elapsed;
        true
    }

    /// Record link state from the transport boundary. Returns true when it changed.
    pub fn set_connected(&mut self, connected: bool) -> bool {
        if self.snapshot.connected == connected {
            return false;
        }
        self.snapshot.connected = connected;
        true
    }
}

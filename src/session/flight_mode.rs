//! ArduCopter flight-mode names keyed by HEARTBEAT `custom_mode`.

const COPTER_MODES: &[(u32, &str)] = &[
    (0, "STABILIZE"),
    (1, "ACRO"),
    (2, "ALT_HOLD"),
    (3, "AUTO"),
    (4, "GUIDED"),
    (5, "LOITER"),
    (6, "RTL"),
    (7, "CIRCLE"),
    (9, "LAND"),
    (11, "DRIFT"),
    (13, "SPORT"),
    (14, "FLIP"),
    (15, "AUTOTUNE"),
    (16, "POSHOLD"),
    (17, "BRAKE"),
    (18, "THROW"),
    (19, "AVOID_ADSB"),
    (20, "GUIDED_NOGPS"),
    (21, "SMART_RTL"),
    (22, "FLOWHOLD"),
    (23, "FOLLOW"),
    (24, "ZIGZAG"),
    (25, "SYSTEMID"),
    (26, "AUTOROTATE"),
    (27, "AUTO_RTL"),
];

/// Name shown before the first heartbeat arrives.
pub const UNKNOWN_MODE: &str = "UNKNOWN";

/// Display name for a mode code, `MODE n` for codes without a name.
pub fn flight_mode_name(code: u32) -> String {
    COPTER_MODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| format!("MODE {code}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_modes() {
        assert_eq!(flight_mode_name(4), "GUIDED");
        assert_eq!(flight_mode_name(27), "AUTO_RTL");
        assert_eq!(flight_mode_name(8), "MODE 8");
        assert_eq!(flight_mode_name(1000), "MODE 1000");
    }
}

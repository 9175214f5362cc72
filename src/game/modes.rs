//! Named time controls.

use std::time::Duration;

/// Supported time controls, named `<class>_<minutes>m_<increment>s`.
/// Bullet, blitz, rapid, classical.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GameMode {
    Bt1m0s,
    Bt2m1s,
    Bz3m0s,
    Bz3m2s,
    Bz5m0s,
    Bz5m5s,
    Rd10m0s,
    Rd15m10s,
    Cl30m0s,
    Cl60m0s,
}

impl GameMode {
    pub const ALL: [GameMode; 10] = [
        GameMode::Bt1m0s,
        GameMode::Bt2m1s,
        GameMode::Bz3m0s,
        GameMode::Bz3m2s,
        GameMode::Bz5m0s,
        GameMode::Bz5m5s,
        GameMode::Rd10m0s,
        GameMode::Rd15m10s,
        GameMode::Cl30m0s,
        GameMode::Cl60m0s,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bt_1m_0s" => Some(GameMode::Bt1m0s),
            "bt_2m_1s" => Some(GameMode::Bt2m1s),
            "bz_3m_0s" => Some(GameMode::Bz3m0s),
            "bz_3m_2s" => Some(GameMode::Bz3m2s),
            "bz_5m_0s" => Some(GameMode::Bz5m0s),
            "bz_5m_5s" => Some(GameMode::Bz5m5s),
            "rd_10m_0s" => Some(GameMode::Rd10m0s),
            "rd_15m_10s" => Some(GameMode::Rd15m10s),
            "cl_30m_0s" => Some(GameMode::Cl30m0s),
            "cl_60m_0s" => Some(GameMode::Cl60m0s),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameMode::Bt1m0s => "bt_1m_0s",
            GameMode::Bt2m1s => "bt_2m_1s",
            GameMode::Bz3m0s => "bz_3m_0s",
            GameMode::Bz3m2s => "bz_3m_2s",
            GameMode::Bz5m0s => "bz_5m_0s",
            GameMode::Bz5m5s => "bz_5m_5s",
            GameMode::Rd10m0s => "rd_10m_0s",
            GameMode::Rd15m10s => "rd_15m_10s",
            GameMode::Cl30m0s => "cl_30m_0s",
            GameMode::Cl60m0s => "cl_60m_0s",
        }
    }

    /// (initial time per side, Fischer increment).
    pub fn time_control(self) -> (Duration, Duration) {
        let (minutes, increment_secs) = match self {
            GameMode::Bt1m0s => (1, 0),
            GameMode::Bt2m1s => (2, 1),
            GameMode::Bz3m0s => (3, 0),
            GameMode::Bz3m2s => (3, 2),
            GameMode::Bz5m0s => (5, 0),
            GameMode::Bz5m5s => (5, 5),
            GameMode::Rd10m0s => (10, 0),
            GameMode::Rd15m10s => (15, 10),
            GameMode::Cl30m0s => (30, 0),
            GameMode::Cl60m0s => (60, 0),
        };
        (
            Duration::from_secs(minutes * 60),
            Duration::from_secs(increment_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips() {
        for mode in GameMode::ALL {
            assert_eq!(GameMode::parse(mode.as_str()), Some(mode));
        }
    }

    #[test]
    fn parse_rejects_unknown() {
        assert_eq!(GameMode::parse("bt_1m"), None);
        assert_eq!(GameMode::parse(""), None);
        assert_eq!(GameMode::parse("BT_1M_0S"), None);
    }

    #[test]
    fn time_controls() {
        assert_eq!(
            GameMode::Bt1m0s.time_control(),
            (Duration::from_secs(60), Duration::ZERO)
        );
        assert_eq!(
            GameMode::Rd15m10s.time_control(),
            (Duration::from_secs(900), Duration::from_secs(10))
        );
        assert_eq!(
            GameMode::Cl60m0s.time_control(),
            (Duration::from_secs(3600), Duration::ZERO)
        );
    }
}

// =============================================================================
// Session Timing Effect
// =============================================================================
//
// Advisory reliability factor by local hour. Reported alongside the signal,
// never applied to it. Ranges are checked in order, so the shared edge hours
// (10, 17) belong to the earlier rule.

use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPeriod {
    AfterHours,
    PreMarket,
    RegularHours,
    Overnight,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingEffect {
    pub period: SessionPeriod,
    pub multiplier: f64,
    pub confidence_factor: f64,
    pub hour: u32,
}

pub fn timing_effect_for_hour(hour: u32) -> TimingEffect {
    let (period, multiplier, confidence_factor) = match hour {
        17..=21 => (SessionPeriod::AfterHours, 0.8, 0.85),
        5..=10 => (SessionPeriod::PreMarket, 1.2, 1.1),
        11..=16 => (SessionPeriod::RegularHours, 1.0, 1.0),
        _ => (SessionPeriod::Overnight, 0.6, 0.7),
    };
    TimingEffect {
        period,
        multiplier,
        confidence_factor,
        hour,
    }
}

pub fn timing_effect(now: DateTime<Utc>, offset: FixedOffset) -> TimingEffect {
    timing_effect_for_hour(now.with_timezone(&offset).hour())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn edge_hours_go_to_the_earlier_rule() {
        assert_eq!(timing_effect_for_hour(10).period, SessionPeriod::PreMarket);
        assert_eq!(timing_effect_for_hour(17).period, SessionPeriod::AfterHours);
        assert_eq!(timing_effect_for_hour(11).period, SessionPeriod::RegularHours);
        assert_eq!(timing_effect_for_hour(22).period, SessionPeriod::Overnight);
        assert_eq!(timing_effect_for_hour(4).period, SessionPeriod::Overnight);
    }

    #[test]
    fn factors() {
        let t = timing_effect_for_hour(19);
        assert!((t.multiplier - 0.8).abs() < 1e-12);
        assert!((t.confidence_factor - 0.85).abs() < 1e-12);
        let t = timing_effect_for_hour(2);
        assert!((t.multiplier - 0.6).abs() < 1e-12);
    }

    #[test]
    fn uses_local_hour() {
        let offset = FixedOffset::west_opt(3 * 3600).unwrap();
        // 12:00 UTC is 09:00 at UTC-3.
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap();
        let t = timing_effect(now, offset);
        assert_eq!(t.hour, 9);
        assert_eq!(t.period, SessionPeriod::PreMarket);
    }
}

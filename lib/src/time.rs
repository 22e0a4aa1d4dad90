use std::{fmt, ops};

use serde::{Deserialize, Serialize};
use time::Duration;

/// Simulated time since the simulation started, in seconds.
#[derive(Copy, Clone, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SimTime(f64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0.0);

    pub fn new_seconds(sec: f64) -> Self {
        Self(sec)
    }

    pub fn new_hms(hours: u32, minutes: u8, seconds: u8, millis: u16) -> Self {
        Self(
            seconds as f64
                + 60.0 * minutes as f64
                + 3600.0 * hours as f64
                + millis as f64 / 1000.0,
        )
    }

    pub fn as_seconds(self) -> f64 {
        self.0
    }

    pub fn into_duration(self) -> Duration {
        Duration::seconds_f64(self.0)
    }

    pub fn days(self) -> i64 {
        self.into_duration().whole_days()
    }

    pub fn hours(self) -> u8 {
        (self.into_duration().whole_hours() % 24).unsigned_abs() as u8
    }

    pub fn whole_hours(self) -> i64 {
        self.into_duration().whole_hours()
    }

    pub fn minutes(self) -> u8 {
        (self.into_duration().whole_minutes() % 60).unsigned_abs() as u8
    }

    pub fn seconds(self) -> u8 {
        (self.into_duration().whole_seconds() % 60).unsigned_abs() as u8
    }

    pub fn millis(self) -> u16 {
        (self.into_duration().whole_milliseconds() % 1000).unsigned_abs() as u16
    }
}

impl ops::Add<f64> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: f64) -> Self::Output {
        SimTime(self.0 + rhs)
    }
}

impl ops::AddAssign<f64> for SimTime {
    fn add_assign(&mut self, rhs: f64) {
        self.0 += rhs;
    }
}

impl ops::Sub<SimTime> for SimTime {
    type Output = f64;

    fn sub(self, rhs: SimTime) -> Self::Output {
        self.0 - rhs.0
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.days() > 0 && !f.alternate() {
            write!(
                f,
                "T+{}:{:02}:{:02}:{:02}.{:>03}",
                self.days(),
                self.hours(),
                self.minutes(),
                self.seconds(),
                self.millis()
            )
        } else {
            write!(
                f,
                "T+{:02}:{:02}:{:02}.{:>03}",
                self.whole_hours(),
                self.minutes(),
                self.seconds(),
                self.millis()
            )
        }
    }
}

impl fmt::Debug for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SimTime({}s)", self.0)
    }
}

#[test]
fn formats_like_mission_clock() {
    assert_eq!(SimTime::new_hms(1, 2, 3, 250).to_string(), "T+01:02:03.250");
    assert_eq!(SimTime::new_seconds(37800.0).to_string(), "T+10:30:00.000");
    assert_eq!(
        SimTime::new_seconds(86400.0 + 61.5).to_string(),
        "T+1:00:01:01.500"
    );
    assert_eq!(
        format!("{:#}", SimTime::new_seconds(86400.0 + 61.5)),
        "T+24:01:01.500"
    );
}

//! Publish rate limiting.
//!
//! While the heat pump works, snapshots go out at most once per running
//! threshold; in standby at most once per standby threshold. A snapshot
//! carrying any error code always goes out.

use crate::snapshot::Snapshot;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub const DEFAULT_RUNNING_THRESHOLD: Duration = Duration::from_secs(10);
pub const DEFAULT_STANDBY_THRESHOLD: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Throttle {
    running: Duration,
    standby: Duration,
    last_emit: Option<DateTime<Utc>>,
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_RUNNING_THRESHOLD, DEFAULT_STANDBY_THRESHOLD)
    }
}

impl Throttle {
    pub fn new(running: Duration, standby: Duration) -> Self {
        Self {
            running,
            standby,
            last_emit: None,
        }
    }

    pub fn last_emit(&self) -> Option<DateTime<Utc>> {
        self.last_emit
    }

    /// Interval required since the last emit before `snapshot` may go out.
    pub fn required_interval(&self, snapshot: &Snapshot) -> Duration {
        if snapshot.errors.any() {
            Duration::ZERO
        } else if snapshot.is_running() {
            self.running
        } else {
            self.standby
        }
    }

    /// Decides whether a ready `snapshot` is published and, if so, records the
    /// emit time. Snapshots without a timestamp are never published.
    pub fn should_publish(&mut self, snapshot: &Snapshot) -> bool {
        let Some(timestamp) = snapshot.timestamp() else {
            return false;
        };
        let publish = snapshot.errors.any()
            || match self.last_emit {
                None => true,
                // A clock stepping backwards yields an error here; keep waiting.
                Some(last) => (timestamp - last)
                    .to_std()
                    .is_ok_and(|elapsed| elapsed > self.required_interval(snapshot)),
            };
        if publish {
            self.last_emit = Some(timestamp);
        }
        publish
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Errors, Machine, Record, States, Switch, Temperatures};
    use chrono::TimeZone;

    fn ready_snapshot(at: DateTime<Utc>, status: Switch, errors: Errors) -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot.apply(Record::Temperatures(Temperatures::default()), at);
        snapshot.apply(
            Record::States(States {
                status,
                ..States::default()
            }),
            at,
        );
        snapshot.apply(Record::Machine(Machine::default()), at);
        assert!(snapshot.apply(Record::Errors(errors), at));
        snapshot
    }

    fn at(seconds: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + chrono::Duration::seconds(seconds as i64)
    }

    #[test]
    fn standby_suppresses_within_threshold() {
        let mut throttle = Throttle::new(Duration::from_secs(10), Duration::from_secs(60));
        let first = ready_snapshot(at(0), Switch::Off, Errors::default());
        let second = ready_snapshot(at(30), Switch::Off, Errors::default());
        assert!(throttle.should_publish(&first));
        assert!(!throttle.should_publish(&second));
        assert_eq!(throttle.last_emit(), Some(at(0)));
    }

    #[test]
    fn interval_must_be_strictly_exceeded() {
        let mut throttle = Throttle::new(Duration::from_secs(10), Duration::from_secs(60));
        assert!(throttle.should_publish(&ready_snapshot(at(0), Switch::Off, Errors::default())));
        assert!(!throttle.should_publish(&ready_snapshot(at(60), Switch::Off, Errors::default())));
        assert!(throttle.should_publish(&ready_snapshot(at(61), Switch::Off, Errors::default())));
    }

    #[test]
    fn running_uses_running_threshold() {
        let mut throttle = Throttle::new(Duration::from_secs(10), Duration::from_secs(60));
        assert!(throttle.should_publish(&ready_snapshot(at(0), Switch::On, Errors::default())));
        assert!(!throttle.should_publish(&ready_snapshot(at(5), Switch::On, Errors::default())));
        assert!(throttle.should_publish(&ready_snapshot(at(11), Switch::On, Errors::default())));

        let mut pump_only = ready_snapshot(at(22), Switch::Off, Errors::default());
        pump_only.machine.pump_status = Switch::On;
        assert_eq!(throttle.required_interval(&pump_only), Duration::from_secs(10));
        assert!(throttle.should_publish(&pump_only));
    }

    #[test]
    fn errors_bypass_throttle() {
        let mut throttle = Throttle::default();
        let errors = Errors {
            error2: 41,
            ..Errors::default()
        };
        assert!(throttle.should_publish(&ready_snapshot(at(0), Switch::Off, errors)));
        assert!(throttle.should_publish(&ready_snapshot(at(0), Switch::Off, errors)));
        assert!(throttle.should_publish(&ready_snapshot(at(1), Switch::Off, errors)));
    }

    #[test]
    fn unstamped_snapshot_is_not_published() {
        let mut throttle = Throttle::default();
        assert!(!throttle.should_publish(&Snapshot::new()));
        assert_eq!(throttle.last_emit(), None);
    }
}

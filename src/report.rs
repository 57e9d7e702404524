use crate::types::{LogEntry, PlateStatus};
use chrono::{FixedOffset, NaiveDate};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyCounts {
    pub date: NaiveDate,
    pub registered: u64,
    pub unregistered: u64,
}

impl DailyCounts {
    pub fn total(&self) -> u64 {
        self.registered + self.unregistered
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub registered: u64,
    pub unregistered: u64,
}

impl Totals {
    pub fn total(&self) -> u64 {
        self.registered + self.unregistered
    }
}

/// Registered and unregistered detections per calendar day, where the day
/// boundary is midnight at `offset`. Oldest day first.
pub fn daily_counts(logs: &[LogEntry], offset: FixedOffset) -> Vec<DailyCounts> {
    let mut days: BTreeMap<NaiveDate, (u64, u64)> = BTreeMap::new();
    for log in logs {
        let date = log.timestamp.with_timezone(&offset).date_naive();
        let counts = days.entry(date).or_default();
        match log.status {
            PlateStatus::Registered => counts.0 += 1,
            PlateStatus::Unregistered => counts.1 += 1,
        }
    }
    days.into_iter()
        .map(|(date, (registered, unregistered))| DailyCounts {
            date,
            registered,
            unregistered,
        })
        .collect()
}

pub fn totals(days: &[DailyCounts]) -> Totals {
    days.iter().fold(Totals::default(), |acc, day| Totals {
        registered: acc.registered + day.registered,
        unregistered: acc.unregistered + day.unregistered,
    })
}

//! Plain-text rendering of the operator views.

use crate::feed::LiveEvents;
use crate::report::{DailyCounts, Totals};
use crate::types::{DetectionEvent, LogEntry, PlateStatus, VehicleRecord};
use chrono::{DateTime, FixedOffset, Utc};
use std::fmt::Write;

pub fn format_timestamp(ts: &DateTime<Utc>, offset: &FixedOffset) -> String {
    ts.with_timezone(offset)
        .format("%m/%d/%Y, %I:%M:%S %p")
        .to_string()
}

pub fn format_clock(ts: &DateTime<Utc>, offset: &FixedOffset) -> String {
    ts.with_timezone(offset).format("%I:%M:%S %p").to_string()
}

pub fn status_label(status: PlateStatus) -> &'static str {
    match status {
        PlateStatus::Registered => "✅ Registered",
        PlateStatus::Unregistered => "🚫 Unregistered",
    }
}

pub fn live_updates(live: &LiveEvents, offset: &FixedOffset) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Live Updates [{}]", live.state());
    if live.is_empty() {
        out.push_str("  No detections yet...\n");
        return out;
    }
    let _ = writeln!(out, "  {:>2} {:<10} {:<16} {}", "#", "Plate", "Status", "Time");
    for (row, event) in live.events().enumerate() {
        let _ = writeln!(
            out,
            "  {:>2} {:<10} {:<16} {}",
            row + 1,
            event.plate_number,
            status_label(event.status),
            format_clock(&event.timestamp, offset)
        );
    }
    out
}

pub fn vehicle_panel(event: Option<&DetectionEvent>, offset: &FixedOffset) -> String {
    let event = match event {
        Some(event) => event,
        None => return "No detection yet...\n".to_string(),
    };
    let vehicle = event.vehicle.as_ref();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Name:          {}",
        vehicle.map(|v| v.name.as_str()).unwrap_or("N/A")
    );
    let _ = writeln!(out, "Plate Number:  {}", event.plate_number);
    let _ = writeln!(
        out,
        "Date of Entry: {}",
        format_timestamp(&event.timestamp, offset)
    );
    if let Some(purpose) = vehicle.and_then(|v| v.purpose.as_deref()) {
        let _ = writeln!(out, "Purpose:       {}", purpose);
    }
    if let Some(picture) = vehicle.and_then(|v| v.profile_picture.as_deref()) {
        let _ = writeln!(out, "Photo:         {}", picture);
    }
    out
}

pub fn vehicles_table(vehicles: &[VehicleRecord], offset: &FixedOffset) -> String {
    if vehicles.is_empty() {
        return "No registered vehicles.\n".to_string();
    }
    let mut out = format!(
        "{:<24} {:<10} {:<24} {}\n",
        "Name", "Plate", "Purpose", "Date"
    );
    for v in vehicles {
        let _ = writeln!(
            out,
            "{:<24} {:<10} {:<24} {}",
            v.name,
            v.plate_number,
            v.purpose.as_deref().unwrap_or(""),
            format_timestamp(&v.date_registered, offset)
        );
    }
    out
}

pub fn vehicle_details(v: &VehicleRecord, offset: &FixedOffset) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Name:       {}", v.name);
    let _ = writeln!(out, "Plate:      {}", v.plate_number);
    let _ = writeln!(out, "Purpose:    {}", v.purpose.as_deref().unwrap_or("N/A"));
    let _ = writeln!(
        out,
        "Photo:      {}",
        v.profile_picture.as_deref().unwrap_or("N/A")
    );
    let _ = writeln!(
        out,
        "Registered: {}",
        format_timestamp(&v.date_registered, offset)
    );
    out
}

pub fn logs_table(logs: &[LogEntry], offset: &FixedOffset) -> String {
    if logs.is_empty() {
        return "No logs available yet...\n".to_string();
    }
    let mut out = format!("{:<6} {:<10} {:<16} {}\n", "ID", "Plate", "Status", "Time");
    for log in logs {
        let _ = writeln!(
            out,
            "{:<6} {:<10} {:<16} {}",
            log.id,
            log.plate_number,
            status_label(log.status),
            format_timestamp(&log.timestamp, offset)
        );
    }
    out
}

pub fn report_table(days: &[DailyCounts], totals: &Totals) -> String {
    if days.is_empty() {
        return "No detections to report.\n".to_string();
    }
    let mut out = format!(
        "{:<12} {:>10} {:>12} {:>7}\n",
        "Date", "Registered", "Unregistered", "Total"
    );
    for day in days {
        let _ = writeln!(
            out,
            "{:<12} {:>10} {:>12} {:>7}",
            day.date.format("%m/%d/%Y").to_string(),
            day.registered,
            day.unregistered,
            day.total()
        );
    }
    let _ = writeln!(
        out,
        "{:<12} {:>10} {:>12} {:>7}",
        "Total",
        totals.registered,
        totals.unregistered,
        totals.total()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedFilter;
    use crate::types::VehicleInfo;
    use chrono::TimeZone;

    fn manila() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    fn event() -> DetectionEvent {
        DetectionEvent {
            plate_number: "ABC1234".to_string(),
            status: PlateStatus::Registered,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 6, 5, 4).unwrap(),
            vehicle: Some(VehicleInfo {
                name: "Jane".to_string(),
                purpose: Some("Delivery".to_string()),
                profile_picture: None,
            }),
        }
    }

    #[test]
    fn timestamps_use_the_display_offset() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 6, 5, 4).unwrap();
        assert_eq!(format_timestamp(&ts, &manila()), "01/01/2024, 02:05:04 PM");
        assert_eq!(format_clock(&ts, &manila()), "02:05:04 PM");
    }

    #[test]
    fn empty_live_list() {
        let live = LiveEvents::new(FeedFilter::All);
        let text = live_updates(&live, &manila());
        assert!(text.contains("No detections yet..."));
        assert!(text.contains("[connecting]"));
    }

    #[test]
    fn live_list_rows() {
        let mut live = LiveEvents::new(FeedFilter::All);
        live.push(event());
        let text = live_updates(&live, &manila());
        assert!(text.lines().nth(2).unwrap().trim_start().starts_with("1 ABC1234"));
        assert!(text.contains("✅ Registered"));
    }

    #[test]
    fn panel_shows_vehicle_details() {
        let text = vehicle_panel(Some(&event()), &manila());
        assert!(text.contains("Jane"));
        assert!(text.contains("Purpose:       Delivery"));
        assert!(!text.contains("Photo"));

        let mut anonymous = event();
        anonymous.vehicle = None;
        assert!(vehicle_panel(Some(&anonymous), &manila()).contains("N/A"));
        assert_eq!(vehicle_panel(None, &manila()), "No detection yet...\n");
    }

    #[test]
    fn report_has_totals_row() {
        let days = vec![DailyCounts {
            date: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            registered: 3,
            unregistered: 1,
        }];
        let text = report_table(
            &days,
            &Totals {
                registered: 3,
                unregistered: 1,
            },
        );
        assert!(text.contains("01/01/2024"));
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().last().unwrap().starts_with("Total"));
    }
}

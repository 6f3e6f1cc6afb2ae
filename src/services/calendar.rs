use crate::models::{Booking, BookingStatus};

const ICS_STAMP: &str = "%Y%m%dT%H%M%S";

/// TEXT escaping per RFC 5545.
fn escape_text(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}

fn ics_status(status: BookingStatus) -> &'static str {
    match status {
        BookingStatus::Pending => "TENTATIVE",
        BookingStatus::Cancelled | BookingStatus::Rescheduled => "CANCELLED",
        _ => "CONFIRMED",
    }
}

pub fn generate_ics(booking: &Booking, business_name: &str) -> String {
    let dtstart = booking.starts_at().format(ICS_STAMP).to_string();
    let dtend = booking.ends_at().format(ICS_STAMP).to_string();
    let dtstamp = booking.updated_at.format(ICS_STAMP).to_string();
    let uid = format!("{}@servicebook", booking.id);

    let summary = escape_text(&format!("{} with {}", booking.service_type, business_name));
    let description = match &booking.rescheduled_from {
        Some(previous) => format!("Rescheduled from booking {previous}"),
        None => format!("Booking {}", booking.id),
    };
    let status = ics_status(booking.status);

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Servicebook//Scheduling//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         SUMMARY:{summary}\r\n\
         DESCRIPTION:{description}\r\n\
         STATUS:{status}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    )
}

use chrono::NaiveDate;

use crate::models::{AvailabilityRule, Booking, Scope, Slot};

#[derive(Debug, PartialEq)]
pub enum Unavailable {
    Overlaps { booking_id: String },
    DailyCapReached { count: usize, max: u32 },
}

impl std::fmt::Display for Unavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unavailable::Overlaps { booking_id } => {
                write!(f, "overlaps booking {booking_id} including buffer")
            }
            Unavailable::DailyCapReached { count, max } => {
                write!(f, "daily cap reached ({count}/{max})")
            }
        }
    }
}

/// Bookings that still hold a slot inside `scope`.
pub fn active_in_scope<'a>(
    bookings: &'a [Booking],
    scope: &'a Scope,
) -> impl Iterator<Item = &'a Booking> + 'a {
    bookings
        .iter()
        .filter(move |b| b.status.holds_slot() && scope.covers(b.date, &b.service_type))
}

pub fn count_bookings_on_date(
    bookings: &[Booking],
    date: NaiveDate,
    service_type: Option<&str>,
) -> usize {
    let scope = Scope::new(date, service_type);
    active_in_scope(bookings, &scope).count()
}

/// An existing booking blocks `[start - buffer, end + buffer)`.
pub fn overlaps(slot: &Slot, booking: &Booking, buffer_minutes: u32) -> bool {
    let blocked_from = booking.start_minute() as i64 - buffer_minutes as i64;
    let blocked_until = booking.end_minute() as i64 + buffer_minutes as i64;
    let slot_start = slot.start_minute() as i64;
    let slot_end = slot.end_minute() as i64;

    slot_start < blocked_until && blocked_from < slot_end
}

pub fn check_slot(
    rule: &AvailabilityRule,
    slot: &Slot,
    existing: &[Booking],
) -> Result<(), Unavailable> {
    let scope = Scope::new(slot.date, slot.service_type.as_deref());
    let active: Vec<&Booking> = active_in_scope(existing, &scope).collect();

    if rule.cap_reached(active.len()) {
        return Err(Unavailable::DailyCapReached {
            count: active.len(),
            max: rule.max_bookings_per_day.unwrap_or_default(),
        });
    }

    if let Some(clash) = active
        .iter()
        .find(|b| overlaps(slot, b, rule.buffer_minutes))
    {
        return Err(Unavailable::Overlaps {
            booking_id: clash.id.clone(),
        });
    }

    Ok(())
}

pub fn is_slot_available(rule: &AvailabilityRule, slot: &Slot, existing: &[Booking]) -> bool {
    check_slot(rule, slot, existing).is_ok()
}

pub fn free_slots(rule: &AvailabilityRule, candidates: Vec<Slot>, existing: &[Booking]) -> Vec<Slot> {
    candidates
        .into_iter()
        .filter(|slot| is_slot_available(rule, slot, existing))
        .collect()
}

use chrono::{NaiveDate, NaiveTime};

use crate::models::{weekday_index, AvailabilityRule, Slot, MINUTES_PER_DAY};

/// Picks the rule governing `day`: a rule for the requested service type
/// wins over the generic rule for that weekday.
pub fn select_rule<'a>(
    rules: &'a [AvailabilityRule],
    day_of_week: u8,
    service_type: Option<&str>,
) -> Option<&'a AvailabilityRule> {
    let mut for_day = rules.iter().filter(|r| r.day_of_week == day_of_week);

    if let Some(service_type) = service_type {
        let specific = for_day
            .clone()
            .find(|r| r.service_type.as_deref() == Some(service_type));
        if specific.is_some() {
            return specific;
        }
    }

    for_day.find(|r| r.is_generic())
}

/// Candidate slots for `date`, in start order. Pure: the same rules and date
/// always produce the same list. "Closed" and "no rule" both yield an empty
/// list.
pub fn generate_slots(
    rules: &[AvailabilityRule],
    date: NaiveDate,
    service_type: Option<&str>,
) -> Vec<Slot> {
    match select_rule(rules, weekday_index(date), service_type) {
        Some(rule) => slots_for_rule(rule, date, service_type),
        None => Vec::new(),
    }
}

/// Walks the rule's window in steps of duration + buffer. A slot may start
/// any time before closing but must finish on the same day.
pub fn slots_for_rule(rule: &AvailabilityRule, date: NaiveDate, service_type: Option<&str>) -> Vec<Slot> {
    if !rule.is_available || rule.duration_minutes == 0 {
        return Vec::new();
    }

    let close = rule.close_minute();
    let step = rule.step_minutes();
    let mut slots = Vec::new();
    let mut start = rule.open_minute();

    while start < close && start.saturating_add(rule.duration_minutes) <= MINUTES_PER_DAY {
        let Some(start_time) = NaiveTime::from_num_seconds_from_midnight_opt(start * 60, 0) else {
            break;
        };
        slots.push(Slot {
            date,
            start_time,
            duration_minutes: rule.duration_minutes,
            service_type: service_type.map(str::to_string),
        });
        start = start.saturating_add(step);
    }

    slots
}

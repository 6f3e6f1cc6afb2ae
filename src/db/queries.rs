use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    parse_date, parse_time, AvailabilityRule, Booking, BookingStatus, CancellationReason, Job,
    JobStatus, Quote, ServiceRequest, ServiceRequestStatus, Urgency, DATE_FORMAT, TIMESTAMP_FORMAT,
    TIME_FORMAT,
};

fn fmt_ts(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn fmt_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_ts(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .with_context(|| format!("invalid timestamp in database: {s}"))
}

// ── Availability Rules ──

const RULE_COLUMNS: &str = "id, day_of_week, is_available, start_time, end_time, duration_minutes, \
     buffer_minutes, max_bookings_per_day, service_type, created_at, updated_at";

pub fn save_rule(conn: &Connection, rule: &AvailabilityRule) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO availability_rules (id, day_of_week, is_available, start_time, end_time, duration_minutes,
                                         buffer_minutes, max_bookings_per_day, service_type, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(id) DO UPDATE SET
           is_available = excluded.is_available,
           start_time = excluded.start_time,
           end_time = excluded.end_time,
           duration_minutes = excluded.duration_minutes,
           buffer_minutes = excluded.buffer_minutes,
           max_bookings_per_day = excluded.max_bookings_per_day,
           updated_at = excluded.updated_at",
        params![
            rule.id,
            rule.day_of_week,
            rule.is_available,
            rule.start_time.format(TIME_FORMAT).to_string(),
            rule.end_time.format(TIME_FORMAT).to_string(),
            rule.duration_minutes,
            rule.buffer_minutes,
            rule.max_bookings_per_day,
            rule.service_type.as_deref().unwrap_or(""),
            fmt_ts(&rule.created_at),
            fmt_ts(&rule.updated_at),
        ],
    )?;
    Ok(())
}

pub fn list_rules(conn: &Connection) -> anyhow::Result<Vec<AvailabilityRule>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RULE_COLUMNS} FROM availability_rules ORDER BY day_of_week ASC, service_type ASC"
    ))?;
    let rows = stmt.query_map([], |row| Ok(parse_rule_row(row)))?;

    let mut rules = vec![];
    for row in rows {
        rules.push(row??);
    }
    Ok(rules)
}

pub fn get_rules_for_day(conn: &Connection, day_of_week: u8) -> anyhow::Result<Vec<AvailabilityRule>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RULE_COLUMNS} FROM availability_rules WHERE day_of_week = ?1 ORDER BY service_type ASC"
    ))?;
    let rows = stmt.query_map(params![day_of_week], |row| Ok(parse_rule_row(row)))?;

    let mut rules = vec![];
    for row in rows {
        rules.push(row??);
    }
    Ok(rules)
}

pub fn get_rule_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<AvailabilityRule>> {
    let result = conn
        .query_row(
            &format!("SELECT {RULE_COLUMNS} FROM availability_rules WHERE id = ?1"),
            params![id],
            |row| Ok(parse_rule_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn find_rule(
    conn: &Connection,
    day_of_week: u8,
    service_type: Option<&str>,
) -> anyhow::Result<Option<AvailabilityRule>> {
    let result = conn
        .query_row(
            &format!(
                "SELECT {RULE_COLUMNS} FROM availability_rules WHERE day_of_week = ?1 AND service_type = ?2"
            ),
            params![day_of_week, service_type.unwrap_or("")],
            |row| Ok(parse_rule_row(row)),
        )
        .optional()?;
    result.transpose()
}

fn parse_rule_row(row: &rusqlite::Row) -> anyhow::Result<AvailabilityRule> {
    let start_time: String = row.get(3)?;
    let end_time: String = row.get(4)?;
    let service_type: String = row.get(8)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(AvailabilityRule {
        id: row.get(0)?,
        day_of_week: row.get(1)?,
        is_available: row.get(2)?,
        start_time: parse_time(&start_time)?,
        end_time: parse_time(&end_time)?,
        duration_minutes: row.get(5)?,
        buffer_minutes: row.get(6)?,
        max_bookings_per_day: row.get(7)?,
        service_type: Some(service_type).filter(|s| !s.is_empty()),
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, customer_id, service_type, date, start_time, duration_minutes, status, \
     cancel_reason, cancel_note, rescheduled_from, rescheduled_to, created_at, updated_at";

pub fn create_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, customer_id, service_type, date, start_time, duration_minutes, status,
                               cancel_reason, cancel_note, rescheduled_from, rescheduled_to, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            booking.id,
            booking.customer_id,
            booking.service_type,
            fmt_date(&booking.date),
            booking.start_time.format(TIME_FORMAT).to_string(),
            booking.duration_minutes,
            booking.status.as_str(),
            booking.cancel_reason.map(|r| r.as_str()),
            booking.cancel_note,
            booking.rescheduled_from,
            booking.rescheduled_to,
            fmt_ts(&booking.created_at),
            fmt_ts(&booking.updated_at),
        ],
    )?;
    Ok(())
}

/// Persists the mutable part of a booking. Date, time and owner never change.
pub fn update_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, cancel_reason = ?2, cancel_note = ?3,
                             rescheduled_to = ?4, updated_at = ?5
         WHERE id = ?6",
        params![
            booking.status.as_str(),
            booking.cancel_reason.map(|r| r.as_str()),
            booking.cancel_note,
            booking.rescheduled_to,
            fmt_ts(&booking.updated_at),
            booking.id,
        ],
    )?;
    Ok(count > 0)
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
            params![id],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn get_bookings_on_date(conn: &Connection, date: &NaiveDate) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE date = ?1 ORDER BY start_time ASC, created_at ASC"
    ))?;
    let rows = stmt.query_map(params![fmt_date(date)], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn get_pending_created_before(
    conn: &Connection,
    cutoff: &NaiveDateTime,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE status = 'pending' AND created_at < ?1 ORDER BY created_at ASC"
    ))?;
    let rows = stmt.query_map(params![fmt_ts(cutoff)], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn get_all_bookings(
    conn: &Connection,
    status_filter: Option<BookingStatus>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match status_filter {
        Some(status) => (
            format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE status = ?1 ORDER BY date DESC, start_time DESC LIMIT ?2"
            ),
            vec![
                Box::new(status.as_str()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(limit),
            ],
        ),
        None => (
            format!("SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY date DESC, start_time DESC LIMIT ?1"),
            vec![Box::new(limit) as Box<dyn rusqlite::types::ToSql>],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let date: String = row.get(3)?;
    let start_time: String = row.get(4)?;
    let status: String = row.get(6)?;
    let cancel_reason: Option<String> = row.get(7)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;

    Ok(Booking {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        service_type: row.get(2)?,
        date: parse_date(&date)?,
        start_time: parse_time(&start_time)?,
        duration_minutes: row.get(5)?,
        status: BookingStatus::parse(&status)
            .ok_or_else(|| anyhow::anyhow!("unknown booking status: {status}"))?,
        cancel_reason: cancel_reason.as_deref().and_then(CancellationReason::parse),
        cancel_note: row.get(8)?,
        rescheduled_from: row.get(9)?,
        rescheduled_to: row.get(10)?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

// ── Service Requests ──

const REQUEST_COLUMNS: &str =
    "id, customer_id, category, description, urgency, preferred_date, status, created_at, updated_at";

pub fn create_service_request(conn: &Connection, request: &ServiceRequest) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO service_requests (id, customer_id, category, description, urgency, preferred_date, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            request.id,
            request.customer_id,
            request.category,
            request.description,
            request.urgency.as_str(),
            request.preferred_date.as_ref().map(fmt_date),
            request.status.as_str(),
            fmt_ts(&request.created_at),
            fmt_ts(&request.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update_service_request_status(conn: &Connection, request: &ServiceRequest) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE service_requests SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![request.status.as_str(), fmt_ts(&request.updated_at), request.id],
    )?;
    Ok(count > 0)
}

pub fn get_service_request(conn: &Connection, id: &str) -> anyhow::Result<Option<ServiceRequest>> {
    let result = conn
        .query_row(
            &format!("SELECT {REQUEST_COLUMNS} FROM service_requests WHERE id = ?1"),
            params![id],
            |row| Ok(parse_request_row(row)),
        )
        .optional()?;
    result.transpose()
}

fn parse_request_row(row: &rusqlite::Row) -> anyhow::Result<ServiceRequest> {
    let urgency: String = row.get(4)?;
    let preferred_date: Option<String> = row.get(5)?;
    let status: String = row.get(6)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    Ok(ServiceRequest {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        category: row.get(2)?,
        description: row.get(3)?,
        urgency: Urgency::parse(&urgency).unwrap_or_default(),
        preferred_date: preferred_date.as_deref().map(parse_date).transpose()?,
        status: ServiceRequestStatus::parse(&status)
            .ok_or_else(|| anyhow::anyhow!("unknown service request status: {status}"))?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

// ── Quotes ──

const QUOTE_COLUMNS: &str = "id, service_request_id, technician_id, estimated_hours, materials_cost_cents, \
     labor_cost_cents, total_cost_cents, customer_accepted, withdrawn, notes, created_at";

pub fn create_quote(conn: &Connection, quote: &Quote) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO quotes (id, service_request_id, technician_id, estimated_hours, materials_cost_cents,
                             labor_cost_cents, total_cost_cents, customer_accepted, withdrawn, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            quote.id,
            quote.service_request_id,
            quote.technician_id,
            quote.estimated_hours,
            quote.materials_cost_cents,
            quote.labor_cost_cents,
            quote.total_cost_cents,
            quote.customer_accepted,
            quote.withdrawn,
            quote.notes,
            fmt_ts(&quote.created_at),
        ],
    )?;
    Ok(())
}

pub fn update_quote_flags(conn: &Connection, quote: &Quote) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE quotes SET customer_accepted = ?1, withdrawn = ?2 WHERE id = ?3",
        params![quote.customer_accepted, quote.withdrawn, quote.id],
    )?;
    Ok(count > 0)
}

pub fn get_quote(conn: &Connection, id: &str) -> anyhow::Result<Option<Quote>> {
    let result = conn
        .query_row(
            &format!("SELECT {QUOTE_COLUMNS} FROM quotes WHERE id = ?1"),
            params![id],
            |row| Ok(parse_quote_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn get_quotes_for_request(conn: &Connection, service_request_id: &str) -> anyhow::Result<Vec<Quote>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {QUOTE_COLUMNS} FROM quotes WHERE service_request_id = ?1 ORDER BY created_at ASC, id ASC"
    ))?;
    let rows = stmt.query_map(params![service_request_id], |row| Ok(parse_quote_row(row)))?;

    let mut quotes = vec![];
    for row in rows {
        quotes.push(row??);
    }
    Ok(quotes)
}

fn parse_quote_row(row: &rusqlite::Row) -> anyhow::Result<Quote> {
    let created_at: String = row.get(10)?;
    Ok(Quote {
        id: row.get(0)?,
        service_request_id: row.get(1)?,
        technician_id: row.get(2)?,
        estimated_hours: row.get(3)?,
        materials_cost_cents: row.get(4)?,
        labor_cost_cents: row.get(5)?,
        total_cost_cents: row.get(6)?,
        customer_accepted: row.get(7)?,
        withdrawn: row.get(8)?,
        notes: row.get(9)?,
        created_at: parse_ts(&created_at)?,
    })
}

// ── Jobs ──

const JOB_COLUMNS: &str = "id, service_request_id, quote_id, technician_id, scheduled_date, status, \
     actual_hours, customer_rating, customer_feedback, created_at, updated_at";

pub fn create_job(conn: &Connection, job: &Job) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO jobs (id, service_request_id, quote_id, technician_id, scheduled_date, status,
                           actual_hours, customer_rating, customer_feedback, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            job.id,
            job.service_request_id,
            job.quote_id,
            job.technician_id,
            job.scheduled_date.as_ref().map(fmt_date),
            job.status.as_str(),
            job.actual_hours,
            job.customer_rating,
            job.customer_feedback,
            fmt_ts(&job.created_at),
            fmt_ts(&job.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update_job(conn: &Connection, job: &Job) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE jobs SET status = ?1, actual_hours = ?2, customer_rating = ?3, customer_feedback = ?4, updated_at = ?5
         WHERE id = ?6",
        params![
            job.status.as_str(),
            job.actual_hours,
            job.customer_rating,
            job.customer_feedback,
            fmt_ts(&job.updated_at),
            job.id,
        ],
    )?;
    Ok(count > 0)
}

pub fn get_job(conn: &Connection, id: &str) -> anyhow::Result<Option<Job>> {
    let result = conn
        .query_row(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
            params![id],
            |row| Ok(parse_job_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn get_job_for_request(conn: &Connection, service_request_id: &str) -> anyhow::Result<Option<Job>> {
    let result = conn
        .query_row(
            &format!(
                "SELECT {JOB_COLUMNS} FROM jobs WHERE service_request_id = ?1 ORDER BY created_at DESC LIMIT 1"
            ),
            params![service_request_id],
            |row| Ok(parse_job_row(row)),
        )
        .optional()?;
    result.transpose()
}

fn parse_job_row(row: &rusqlite::Row) -> anyhow::Result<Job> {
    let scheduled_date: Option<String> = row.get(4)?;
    let status: String = row.get(5)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(Job {
        id: row.get(0)?,
        service_request_id: row.get(1)?,
        quote_id: row.get(2)?,
        technician_id: row.get(3)?,
        scheduled_date: scheduled_date.as_deref().map(parse_date).transpose()?,
        status: JobStatus::parse(&status).ok_or_else(|| anyhow::anyhow!("unknown job status: {status}"))?,
        actual_hours: row.get(6)?,
        customer_rating: row.get(7)?,
        customer_feedback: row.get(8)?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

// ── Monthly Activity ──

#[derive(Debug, Clone, serde::Serialize)]
pub struct MonthlyActivity {
    pub month: String,
    pub bookings_created: i64,
    pub bookings_confirmed: i64,
    pub bookings_cancelled: i64,
    pub bookings_rescheduled: i64,
    pub bookings_expired: i64,
    pub slot_contention: i64,
    pub jobs_completed: i64,
}

fn current_month() -> String {
    Utc::now().format("%Y-%m").to_string()
}

/// `column` must be one of the fixed counter names of `monthly_activity`.
pub fn increment_monthly(conn: &Connection, column: &'static str) -> anyhow::Result<()> {
    let month = current_month();
    conn.execute(
        &format!(
            "INSERT INTO monthly_activity (month, {column}) VALUES (?1, 1)
             ON CONFLICT(month) DO UPDATE SET {column} = {column} + 1"
        ),
        params![month],
    )?;
    Ok(())
}

pub fn get_recent_monthly_activity(conn: &Connection, months: usize) -> anyhow::Result<Vec<MonthlyActivity>> {
    let now = Utc::now();
    let mut result = Vec::with_capacity(months);

    for i in 0..months {
        let date = now - chrono::Months::new(i as u32);
        let month = date.format("%Y-%m").to_string();

        let activity = conn
            .query_row(
                "SELECT month, bookings_created, bookings_confirmed, bookings_cancelled, bookings_rescheduled,
                        bookings_expired, slot_contention, jobs_completed
                 FROM monthly_activity WHERE month = ?1",
                params![month],
                |row| {
                    Ok(MonthlyActivity {
                        month: row.get(0)?,
                        bookings_created: row.get(1)?,
                        bookings_confirmed: row.get(2)?,
                        bookings_cancelled: row.get(3)?,
                        bookings_rescheduled: row.get(4)?,
                        bookings_expired: row.get(5)?,
                        slot_contention: row.get(6)?,
                        jobs_completed: row.get(7)?,
                    })
                },
            )
            .optional()?;

        result.push(activity.unwrap_or(MonthlyActivity {
            month,
            bookings_created: 0,
            bookings_confirmed: 0,
            bookings_cancelled: 0,
            bookings_rescheduled: 0,
            bookings_expired: 0,
            slot_contention: 0,
            jobs_completed: 0,
        }));
    }

    // Return oldest first
    result.reverse();
    Ok(result)
}

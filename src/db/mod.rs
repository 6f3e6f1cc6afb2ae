pub mod migrations;
pub mod queries;

use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;

use crate::models::{AvailabilityRule, Booking, BookingStatus, Job, Quote, ServiceRequest};

pub fn init_db(path: &str) -> anyhow::Result<Connection> {
    let conn = Connection::open(path).context("failed to open database")?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .context("failed to set database pragmas")?;

    migrations::run_migrations(&conn)?;

    Ok(conn)
}

/// Storage operations the scheduling core relies on. Each call is atomic;
/// the composite writes (`reschedule_booking`, `accept_quote`,
/// `save_job_and_request`) commit all of their records or none.
pub trait Repository: Send + Sync {
    fn list_rules(&self) -> anyhow::Result<Vec<AvailabilityRule>>;
    fn rules_for_day(&self, day_of_week: u8) -> anyhow::Result<Vec<AvailabilityRule>>;
    fn get_rule(&self, id: &str) -> anyhow::Result<Option<AvailabilityRule>>;
    fn find_rule(
        &self,
        day_of_week: u8,
        service_type: Option<&str>,
    ) -> anyhow::Result<Option<AvailabilityRule>>;
    fn save_rule(&self, rule: &AvailabilityRule) -> anyhow::Result<()>;

    fn insert_booking(&self, booking: &Booking) -> anyhow::Result<()>;
    fn update_booking(&self, booking: &Booking) -> anyhow::Result<()>;
    fn get_booking(&self, id: &str) -> anyhow::Result<Option<Booking>>;
    fn bookings_on_date(&self, date: NaiveDate) -> anyhow::Result<Vec<Booking>>;
    fn list_bookings(&self, status: Option<BookingStatus>, limit: i64) -> anyhow::Result<Vec<Booking>>;
    fn pending_created_before(&self, cutoff: NaiveDateTime) -> anyhow::Result<Vec<Booking>>;
    fn reschedule_booking(&self, original: &Booking, replacement: &Booking) -> anyhow::Result<()>;

    fn insert_service_request(&self, request: &ServiceRequest) -> anyhow::Result<()>;
    fn update_service_request(&self, request: &ServiceRequest) -> anyhow::Result<()>;
    fn get_service_request(&self, id: &str) -> anyhow::Result<Option<ServiceRequest>>;

    fn insert_quote(&self, quote: &Quote) -> anyhow::Result<()>;
    fn update_quote(&self, quote: &Quote) -> anyhow::Result<()>;
    fn get_quote(&self, id: &str) -> anyhow::Result<Option<Quote>>;
    fn quotes_for_request(&self, service_request_id: &str) -> anyhow::Result<Vec<Quote>>;
    fn accept_quote(&self, quote: &Quote, request: &ServiceRequest, job: &Job) -> anyhow::Result<()>;

    fn get_job(&self, id: &str) -> anyhow::Result<Option<Job>>;
    fn job_for_request(&self, service_request_id: &str) -> anyhow::Result<Option<Job>>;
    fn update_job(&self, job: &Job) -> anyhow::Result<()>;
    fn save_job_and_request(&self, job: &Job, request: &ServiceRequest) -> anyhow::Result<()>;
}

pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        Ok(Self::new(init_db(path)?))
    }

    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn recent_activity(&self, months: usize) -> anyhow::Result<Vec<queries::MonthlyActivity>> {
        queries::get_recent_monthly_activity(&self.conn(), months)
    }
}

fn ensure_updated(updated: bool, what: &str, id: &str) -> anyhow::Result<()> {
    anyhow::ensure!(updated, "{what} {id} disappeared during update");
    Ok(())
}

impl Repository for SqliteRepository {
    fn list_rules(&self) -> anyhow::Result<Vec<AvailabilityRule>> {
        queries::list_rules(&self.conn())
    }

    fn rules_for_day(&self, day_of_week: u8) -> anyhow::Result<Vec<AvailabilityRule>> {
        queries::get_rules_for_day(&self.conn(), day_of_week)
    }

    fn get_rule(&self, id: &str) -> anyhow::Result<Option<AvailabilityRule>> {
        queries::get_rule_by_id(&self.conn(), id)
    }

    fn find_rule(
        &self,
        day_of_week: u8,
        service_type: Option<&str>,
    ) -> anyhow::Result<Option<AvailabilityRule>> {
        queries::find_rule(&self.conn(), day_of_week, service_type)
    }

    fn save_rule(&self, rule: &AvailabilityRule) -> anyhow::Result<()> {
        queries::save_rule(&self.conn(), rule)
    }

    fn insert_booking(&self, booking: &Booking) -> anyhow::Result<()> {
        queries::create_booking(&self.conn(), booking)
    }

    fn update_booking(&self, booking: &Booking) -> anyhow::Result<()> {
        let updated = queries::update_booking(&self.conn(), booking)?;
        ensure_updated(updated, "booking", &booking.id)
    }

    fn get_booking(&self, id: &str) -> anyhow::Result<Option<Booking>> {
        queries::get_booking_by_id(&self.conn(), id)
    }

    fn bookings_on_date(&self, date: NaiveDate) -> anyhow::Result<Vec<Booking>> {
        queries::get_bookings_on_date(&self.conn(), &date)
    }

    fn list_bookings(&self, status: Option<BookingStatus>, limit: i64) -> anyhow::Result<Vec<Booking>> {
        queries::get_all_bookings(&self.conn(), status, limit)
    }

    fn pending_created_before(&self, cutoff: NaiveDateTime) -> anyhow::Result<Vec<Booking>> {
        queries::get_pending_created_before(&self.conn(), &cutoff)
    }

    fn reschedule_booking(&self, original: &Booking, replacement: &Booking) -> anyhow::Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        queries::create_booking(&tx, replacement)?;
        let updated = queries::update_booking(&tx, original)?;
        ensure_updated(updated, "booking", &original.id)?;
        tx.commit().context("failed to commit reschedule")?;
        Ok(())
    }

    fn insert_service_request(&self, request: &ServiceRequest) -> anyhow::Result<()> {
        queries::create_service_request(&self.conn(), request)
    }

    fn update_service_request(&self, request: &ServiceRequest) -> anyhow::Result<()> {
        let updated = queries::update_service_request_status(&self.conn(), request)?;
        ensure_updated(updated, "service request", &request.id)
    }

    fn get_service_request(&self, id: &str) -> anyhow::Result<Option<ServiceRequest>> {
        queries::get_service_request(&self.conn(), id)
    }

    fn insert_quote(&self, quote: &Quote) -> anyhow::Result<()> {
        queries::create_quote(&self.conn(), quote)
    }

    fn update_quote(&self, quote: &Quote) -> anyhow::Result<()> {
        let updated = queries::update_quote_flags(&self.conn(), quote)?;
        ensure_updated(updated, "quote", &quote.id)
    }

    fn get_quote(&self, id: &str) -> anyhow::Result<Option<Quote>> {
        queries::get_quote(&self.conn(), id)
    }

    fn quotes_for_request(&self, service_request_id: &str) -> anyhow::Result<Vec<Quote>> {
        queries::get_quotes_for_request(&self.conn(), service_request_id)
    }

    fn accept_quote(&self, quote: &Quote, request: &ServiceRequest, job: &Job) -> anyhow::Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        ensure_updated(queries::update_quote_flags(&tx, quote)?, "quote", &quote.id)?;
        ensure_updated(
            queries::update_service_request_status(&tx, request)?,
            "service request",
            &request.id,
        )?;
        queries::create_job(&tx, job)?;
        tx.commit().context("failed to commit quote acceptance")?;
        Ok(())
    }

    fn get_job(&self, id: &str) -> anyhow::Result<Option<Job>> {
        queries::get_job(&self.conn(), id)
    }

    fn job_for_request(&self, service_request_id: &str) -> anyhow::Result<Option<Job>> {
        queries::get_job_for_request(&self.conn(), service_request_id)
    }

    fn update_job(&self, job: &Job) -> anyhow::Result<()> {
        let updated = queries::update_job(&self.conn(), job)?;
        ensure_updated(updated, "job", &job.id)
    }

    fn save_job_and_request(&self, job: &Job, request: &ServiceRequest) -> anyhow::Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        ensure_updated(queries::update_job(&tx, job)?, "job", &job.id)?;
        ensure_updated(
            queries::update_service_request_status(&tx, request)?,
            "service request",
            &request.id,
        )?;
        tx.commit().context("failed to commit job update")?;
        Ok(())
    }
}

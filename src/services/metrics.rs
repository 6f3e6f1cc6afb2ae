use crate::db::{queries, SqliteRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    BookingCreated,
    BookingConfirmed,
    BookingCancelled,
    BookingRescheduled,
    BookingExpired,
    SlotContention,
    JobCompleted,
}

impl Metric {
    pub fn column(&self) -> &'static str {
        match self {
            Metric::BookingCreated => "bookings_created",
            Metric::BookingConfirmed => "bookings_confirmed",
            Metric::BookingCancelled => "bookings_cancelled",
            Metric::BookingRescheduled => "bookings_rescheduled",
            Metric::BookingExpired => "bookings_expired",
            Metric::SlotContention => "slot_contention",
            Metric::JobCompleted => "jobs_completed",
        }
    }
}

/// Counter sink handed to the coordinator. Recording never fails the caller.
pub trait MetricsSink: Send + Sync {
    fn record(&self, metric: Metric);
}

impl MetricsSink for SqliteRepository {
    fn record(&self, metric: Metric) {
        if let Err(e) = queries::increment_monthly(&self.conn(), metric.column()) {
            tracing::warn!(error = %e, metric = metric.column(), "failed to record metric");
        }
    }
}

/// Discards everything.
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record(&self, _metric: Metric) {}
}

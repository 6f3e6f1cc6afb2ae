use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{
    minute_of_day, weekday_index, AvailabilityRule, Booking, BookingStatus, CancellationReason,
    DomainEvent, RuleDraft, Scope, Slot, TIME_FORMAT,
};
use crate::services::billing::{BillingProvider, PaymentOutcome};
use crate::services::conflicts;
use crate::services::locks::KeyedLocks;
use crate::services::metrics::{Metric, MetricsSink};
use crate::services::notify::Notifier;
use crate::services::slots;

pub const DEFAULT_BOOKING_LIMIT: i64 = 100;

/// Owns every write to bookings and service requests. Claims are serialized
/// per (date, service type) scope; request, quote and job changes per
/// service request. Reads go straight to the repository.
pub struct Coordinator {
    pub(crate) repo: Arc<dyn Repository>,
    billing: Arc<dyn BillingProvider>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) metrics: Arc<dyn MetricsSink>,
    slot_locks: KeyedLocks<Scope>,
    pub(crate) request_locks: KeyedLocks<String>,
    payments_in_flight: Mutex<HashSet<String>>,
    payment_window: Duration,
}

/// Marks a booking's payment as in flight until dropped.
struct PaymentClaim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    booking_id: String,
}

impl Drop for PaymentClaim<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.booking_id);
    }
}

pub(crate) fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn booking_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("booking {id}"))
}

fn slot_taken(date: NaiveDate, start_time: NaiveTime, service_type: &str) -> AppError {
    AppError::SlotNoLongerAvailable {
        date,
        start_time: start_time.format(TIME_FORMAT).to_string(),
        service_type: service_type.to_string(),
    }
}

fn ensure_not_past(date: NaiveDate, start_time: NaiveTime, now: NaiveDateTime) -> Result<(), AppError> {
    if date.and_time(start_time) <= now {
        return Err(AppError::Validation(format!(
            "{date} {} is in the past",
            start_time.format(TIME_FORMAT)
        )));
    }
    Ok(())
}

fn clean_service_type(service_type: &str) -> Result<&str, AppError> {
    let trimmed = service_type.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("service_type is required".to_string()));
    }
    Ok(trimmed)
}

impl Coordinator {
    pub fn new(
        repo: Arc<dyn Repository>,
        billing: Arc<dyn BillingProvider>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<dyn MetricsSink>,
        payment_window: Duration,
    ) -> Self {
        Self {
            repo,
            billing,
            notifier,
            metrics,
            slot_locks: KeyedLocks::new(),
            request_locks: KeyedLocks::new(),
            payments_in_flight: Mutex::new(HashSet::new()),
            payment_window,
        }
    }

    pub fn payment_window(&self) -> Duration {
        self.payment_window
    }

    // ── Rules ──

    pub fn list_rules(&self) -> Result<Vec<AvailabilityRule>, AppError> {
        Ok(self.repo.list_rules()?)
    }

    /// Creates or replaces the rule for the draft's (day, service type) pair.
    /// Existing bookings keep the duration they were made with.
    pub fn upsert_rule(&self, draft: RuleDraft) -> Result<AvailabilityRule, AppError> {
        let now = now();
        let service_type = draft.normalized_service_type();
        let existing = self
            .repo
            .find_rule(draft.day_of_week, service_type.as_deref())?;

        let (id, created_at) = match existing {
            Some(rule) => (rule.id, rule.created_at),
            None => (new_id(), now),
        };
        let rule = draft.into_rule(id, created_at, now);
        rule.validate()?;
        self.repo.save_rule(&rule)?;

        tracing::info!(
            rule_id = %rule.id,
            rule = %rule.to_human_readable(),
            "availability rule saved"
        );
        Ok(rule)
    }

    pub fn deactivate_rule(&self, id: &str) -> Result<AvailabilityRule, AppError> {
        let mut rule = self
            .repo
            .get_rule(id)?
            .ok_or_else(|| AppError::NotFound(format!("rule {id}")))?;

        rule.is_available = false;
        rule.updated_at = now();
        self.repo.save_rule(&rule)?;

        tracing::info!(rule_id = %rule.id, "availability rule deactivated");
        Ok(rule)
    }

    // ── Browsing ──

    pub fn generate_slots(&self, date: NaiveDate, service_type: Option<&str>) -> Result<Vec<Slot>, AppError> {
        let rules = self.repo.rules_for_day(weekday_index(date))?;
        Ok(slots::generate_slots(&rules, date, service_type))
    }

    pub fn count_bookings_on_date(&self, date: NaiveDate, service_type: Option<&str>) -> Result<usize, AppError> {
        let existing = self.repo.bookings_on_date(date)?;
        Ok(conflicts::count_bookings_on_date(&existing, date, service_type))
    }

    /// Free slots as of now. Lock-free: the answer can be stale by the time
    /// the customer books, which `request_booking` re-checks.
    pub fn availability(&self, date: NaiveDate, service_type: Option<&str>) -> Result<Vec<Slot>, AppError> {
        self.availability_at(date, service_type, now())
    }

    pub fn availability_at(
        &self,
        date: NaiveDate,
        service_type: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<Vec<Slot>, AppError> {
        if date < now.date() {
            return Ok(Vec::new());
        }

        let rules = self.repo.rules_for_day(weekday_index(date))?;
        let Some(rule) = slots::select_rule(&rules, weekday_index(date), service_type) else {
            return Ok(Vec::new());
        };
        let candidates = slots::slots_for_rule(rule, date, service_type);
        let existing = self.repo.bookings_on_date(date)?;

        let mut free = conflicts::free_slots(rule, candidates, &existing);
        if date == now.date() {
            let current = minute_of_day(now.time());
            free.retain(|slot| slot.start_minute() > current);
        }
        Ok(free)
    }

    // ── Bookings ──

    /// Re-checks the slot and records the PENDING booking while holding the
    /// scope lock, so two customers can never both win the same slot.
    pub fn request_booking(
        &self,
        customer_id: &str,
        date: NaiveDate,
        start_time: NaiveTime,
        service_type: &str,
    ) -> Result<Booking, AppError> {
        let customer_id = customer_id.trim();
        if customer_id.is_empty() {
            return Err(AppError::Validation("customer_id is required".to_string()));
        }
        let service_type = clean_service_type(service_type)?;
        ensure_not_past(date, start_time, now())?;

        let scope = Scope::new(date, Some(service_type));
        let booking = self.slot_locks.with_lock(&scope, || {
            let slot = self.claimable_slot(date, start_time, service_type, None)?;

            let now = now();
            let booking = Booking {
                id: new_id(),
                customer_id: customer_id.to_string(),
                service_type: service_type.to_string(),
                date,
                start_time: slot.start_time,
                duration_minutes: slot.duration_minutes,
                status: BookingStatus::Pending,
                cancel_reason: None,
                cancel_note: None,
                rescheduled_from: None,
                rescheduled_to: None,
                created_at: now,
                updated_at: now,
            };
            self.repo.insert_booking(&booking)?;
            Ok::<_, AppError>(booking)
        })?;

        tracing::info!(
            booking_id = %booking.id,
            scope = %scope,
            start_time = %booking.start_time.format(TIME_FORMAT),
            "booking requested"
        );
        self.metrics.record(Metric::BookingCreated);
        self.notifier.notify(&DomainEvent::BookingCreated {
            booking_id: booking.id.clone(),
            customer_id: booking.customer_id.clone(),
            service_type: booking.service_type.clone(),
            date: booking.date,
            start_time: booking.start_time.format(TIME_FORMAT).to_string(),
        });
        Ok(booking)
    }

    /// Must run under the scope lock. `ignore` excludes a booking that is
    /// about to give up its own slot.
    fn claimable_slot(
        &self,
        date: NaiveDate,
        start_time: NaiveTime,
        service_type: &str,
        ignore: Option<&str>,
    ) -> Result<Slot, AppError> {
        let rules = self.repo.rules_for_day(weekday_index(date))?;
        let rule = slots::select_rule(&rules, weekday_index(date), Some(service_type));
        let slot = rule.and_then(|rule| {
            slots::slots_for_rule(rule, date, Some(service_type))
                .into_iter()
                .find(|slot| slot.start_time == start_time)
                .map(|slot| (rule, slot))
        });

        let Some((rule, slot)) = slot else {
            tracing::info!(%date, service_type, "requested slot is not offered");
            return Err(slot_taken(date, start_time, service_type));
        };

        let mut existing = self.repo.bookings_on_date(date)?;
        if let Some(ignore) = ignore {
            existing.retain(|b| b.id != ignore);
        }

        if let Err(reason) = conflicts::check_slot(rule, &slot, &existing) {
            tracing::info!(
                %date,
                service_type,
                start_time = %start_time.format(TIME_FORMAT),
                %reason,
                "slot claim rejected"
            );
            self.metrics.record(Metric::SlotContention);
            return Err(slot_taken(date, start_time, service_type));
        }

        Ok(slot)
    }

    /// Charges the customer, then confirms. A declined payment cancels the
    /// booking and frees the slot; an unreachable provider leaves it PENDING
    /// for the sweep. The booking is claimed before billing is called, so a
    /// second confirm, a cancel or the sweep cannot race the charge.
    pub async fn confirm_booking(&self, id: &str) -> Result<Booking, AppError> {
        let scope = self.get_booking(id)?.scope();
        let _claim = self.slot_locks.with_lock(&scope, || {
            let booking = self.get_booking(id)?;
            if !booking.status.can_transition_to(BookingStatus::Confirmed) {
                return Err(AppError::InvalidTransition {
                    entity: "booking",
                    current: booking.status.as_str(),
                    requested: BookingStatus::Confirmed.as_str(),
                });
            }
            self.claim_payment(id)
        })?;

        let outcome = self.billing.confirm_payment(id).await.map_err(|e| {
            tracing::warn!(booking_id = %id, error = %e, "billing provider unavailable");
            AppError::Billing(e.to_string())
        })?;

        match outcome {
            PaymentOutcome::Approved => {
                let booking = self.update_booking_locked(id, |b| {
                    b.transition_to(BookingStatus::Confirmed, now())
                })?;
                tracing::info!(booking_id = %id, "booking confirmed");
                self.metrics.record(Metric::BookingConfirmed);
                self.notifier.notify(&DomainEvent::BookingConfirmed {
                    booking_id: booking.id.clone(),
                });
                Ok(booking)
            }
            PaymentOutcome::Declined { reason } => {
                tracing::warn!(booking_id = %id, %reason, "payment declined, releasing slot");
                let released = self.cancel_where(
                    id,
                    CancellationReason::BillingFailed,
                    Some(reason.clone()),
                    |_| Ok(()),
                );
                match released {
                    Ok(_) => {}
                    Err(AppError::InvalidTransition { current, .. })
                        if current == BookingStatus::Cancelled.as_str() =>
                    {
                        tracing::debug!(booking_id = %id, "booking already cancelled");
                    }
                    Err(e) => return Err(e),
                }
                Err(AppError::BillingConfirmationFailed {
                    booking_id: id.to_string(),
                    reason,
                })
            }
        }
    }

    pub fn check_in(&self, id: &str) -> Result<Booking, AppError> {
        let booking = self.update_booking_locked(id, |b| b.transition_to(BookingStatus::InProgress, now()))?;
        tracing::info!(booking_id = %id, "customer checked in");
        self.notifier.notify(&DomainEvent::BookingStarted {
            booking_id: booking.id.clone(),
        });
        Ok(booking)
    }

    pub fn check_out(&self, id: &str) -> Result<Booking, AppError> {
        let booking = self.update_booking_locked(id, |b| b.transition_to(BookingStatus::Completed, now()))?;
        tracing::info!(booking_id = %id, "booking completed");
        self.notifier.notify(&DomainEvent::BookingCompleted {
            booking_id: booking.id.clone(),
        });
        Ok(booking)
    }

    /// Refused while the booking's payment is being processed.
    pub fn cancel_booking(
        &self,
        id: &str,
        reason: CancellationReason,
        note: Option<String>,
    ) -> Result<Booking, AppError> {
        self.cancel_where(id, reason, note, |b| self.ensure_no_payment_in_flight(&b.id))
    }

    fn cancel_where(
        &self,
        id: &str,
        reason: CancellationReason,
        note: Option<String>,
        guard: impl FnOnce(&Booking) -> Result<(), AppError>,
    ) -> Result<Booking, AppError> {
        let note = note.filter(|n| !n.trim().is_empty());
        let booking = self.update_booking_locked(id, |b| {
            guard(b)?;
            b.cancel(reason, note, now())
        })?;

        tracing::info!(booking_id = %id, reason = reason.as_str(), "booking cancelled");
        self.metrics.record(Metric::BookingCancelled);
        self.notifier.notify(&DomainEvent::BookingCancelled {
            booking_id: booking.id.clone(),
            reason: reason.as_str().to_string(),
        });
        Ok(booking)
    }

    /// Claims the new slot and retires the original in one write. The
    /// original's own occupancy does not count against the new slot. Returns
    /// the replacement booking.
    pub fn reschedule_booking(
        &self,
        id: &str,
        new_date: NaiveDate,
        new_start: NaiveTime,
    ) -> Result<Booking, AppError> {
        let original = self.get_booking(id)?;
        if !original.status.can_transition_to(BookingStatus::Rescheduled) {
            return Err(AppError::InvalidTransition {
                entity: "booking",
                current: original.status.as_str(),
                requested: BookingStatus::Rescheduled.as_str(),
            });
        }
        ensure_not_past(new_date, new_start, now())?;

        let old_scope = original.scope();
        let new_scope = Scope::new(new_date, Some(&original.service_type));

        let replacement = self.slot_locks.with_pair(&old_scope, &new_scope, || {
            self.ensure_no_payment_in_flight(id)?;
            let mut original = self.get_booking(id)?;
            let now = now();
            original.transition_to(BookingStatus::Rescheduled, now)?;

            let slot = self.claimable_slot(new_date, new_start, &original.service_type, Some(id))?;
            let replacement = Booking {
                id: new_id(),
                customer_id: original.customer_id.clone(),
                service_type: original.service_type.clone(),
                date: new_date,
                start_time: slot.start_time,
                duration_minutes: slot.duration_minutes,
                status: BookingStatus::Pending,
                cancel_reason: None,
                cancel_note: None,
                rescheduled_from: Some(original.id.clone()),
                rescheduled_to: None,
                created_at: now,
                updated_at: now,
            };
            original.rescheduled_to = Some(replacement.id.clone());

            self.repo.reschedule_booking(&original, &replacement)?;
            Ok::<_, AppError>(replacement)
        })?;

        tracing::info!(
            booking_id = %id,
            replacement_id = %replacement.id,
            scope = %new_scope,
            "booking rescheduled"
        );
        self.metrics.record(Metric::BookingRescheduled);
        self.notifier.notify(&DomainEvent::BookingRescheduled {
            booking_id: id.to_string(),
            replacement_id: replacement.id.clone(),
        });
        Ok(replacement)
    }

    pub fn get_booking(&self, id: &str) -> Result<Booking, AppError> {
        self.repo.get_booking(id)?.ok_or_else(|| booking_not_found(id))
    }

    pub fn list_bookings(&self, status: Option<BookingStatus>, limit: Option<i64>) -> Result<Vec<Booking>, AppError> {
        let limit = limit.filter(|l| *l > 0).unwrap_or(DEFAULT_BOOKING_LIMIT);
        Ok(self.repo.list_bookings(status, limit)?)
    }

    /// Cancels PENDING bookings whose payment did not arrive within the
    /// window. Bookings confirmed in the meantime are left alone.
    pub fn expire_stale_pending(&self, now: NaiveDateTime) -> Result<usize, AppError> {
        let cutoff = now - self.payment_window;
        let stale = self.repo.pending_created_before(cutoff)?;
        let mut expired = 0;

        for candidate in stale {
            let result = self.update_booking_locked(&candidate.id, |b| {
                self.ensure_no_payment_in_flight(&b.id)?;
                b.cancel(
                    CancellationReason::PaymentTimeout,
                    Some("payment not received in time".to_string()),
                    now,
                )
            });

            match result {
                Ok(booking) => {
                    expired += 1;
                    tracing::info!(booking_id = %booking.id, "pending booking expired");
                    self.metrics.record(Metric::BookingExpired);
                    self.notifier.notify(&DomainEvent::BookingCancelled {
                        booking_id: booking.id.clone(),
                        reason: CancellationReason::PaymentTimeout.as_str().to_string(),
                    });
                }
                Err(AppError::InvalidTransition { current, .. }) => {
                    tracing::debug!(booking_id = %candidate.id, current, "booking moved on before expiry");
                }
                Err(AppError::PaymentInProgress { .. }) => {
                    tracing::debug!(booking_id = %candidate.id, "payment in flight, skipping expiry");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(expired)
    }

    /// Must run under the booking's scope lock.
    fn claim_payment(&self, id: &str) -> Result<PaymentClaim<'_>, AppError> {
        let mut in_flight = self
            .payments_in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(id.to_string()) {
            return Err(AppError::PaymentInProgress {
                booking_id: id.to_string(),
            });
        }
        Ok(PaymentClaim {
            in_flight: &self.payments_in_flight,
            booking_id: id.to_string(),
        })
    }

    fn ensure_no_payment_in_flight(&self, id: &str) -> Result<(), AppError> {
        let in_flight = self
            .payments_in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if in_flight.contains(id) {
            return Err(AppError::PaymentInProgress {
                booking_id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Applies `change` to the freshly loaded booking under its scope lock
    /// and persists it. Nothing is written when `change` fails.
    fn update_booking_locked(
        &self,
        id: &str,
        change: impl FnOnce(&mut Booking) -> Result<(), AppError>,
    ) -> Result<Booking, AppError> {
        let scope = self.get_booking(id)?.scope();
        self.slot_locks.with_lock(&scope, || {
            let mut booking = self.get_booking(id)?;
            change(&mut booking)?;
            self.repo.update_booking(&booking)?;
            Ok(booking)
        })
    }
}

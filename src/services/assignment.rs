use serde::Serialize;

use crate::errors::AppError;
use crate::models::{
    DomainEvent, Job, JobStatus, NewServiceRequest, Quote, QuoteEstimate, ServiceRequest,
    ServiceRequestStatus,
};
use crate::services::coordinator::{now, Coordinator};
use crate::services::metrics::Metric;

/// A service request with everything hanging off it.
#[derive(Debug, Serialize)]
pub struct ServiceRequestDetail {
    #[serde(flatten)]
    pub request: ServiceRequest,
    pub quotes: Vec<Quote>,
    pub job: Option<Job>,
}

fn request_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("service request {id}"))
}

impl Coordinator {
    /// Runs `f` with the service request's lock held. Quote acceptance, job
    /// transitions and rating all go through here.
    fn with_request<R>(&self, request_id: &str, f: impl FnOnce() -> Result<R, AppError>) -> Result<R, AppError> {
        self.request_locks.with_lock(&request_id.to_string(), f)
    }

    fn load_request(&self, id: &str) -> Result<ServiceRequest, AppError> {
        self.repo
            .get_service_request(id)?
            .ok_or_else(|| request_not_found(id))
    }

    fn load_quote(&self, id: &str) -> Result<Quote, AppError> {
        self.repo
            .get_quote(id)?
            .ok_or_else(|| AppError::NotFound(format!("quote {id}")))
    }

    pub fn get_job(&self, id: &str) -> Result<Job, AppError> {
        self.repo
            .get_job(id)?
            .ok_or_else(|| AppError::NotFound(format!("job {id}")))
    }

    pub fn create_service_request(&self, input: NewServiceRequest) -> Result<ServiceRequest, AppError> {
        input.validate()?;
        let now = now();
        if let Some(date) = input.preferred_date {
            if date < now.date() {
                return Err(AppError::Validation(format!(
                    "preferred_date {date} is in the past"
                )));
            }
        }

        let request = ServiceRequest {
            id: uuid::Uuid::new_v4().to_string(),
            customer_id: input.customer_id.trim().to_string(),
            category: input.category.trim().to_string(),
            description: input.description.trim().to_string(),
            urgency: input.urgency,
            preferred_date: input.preferred_date,
            status: ServiceRequestStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.repo.insert_service_request(&request)?;

        tracing::info!(
            service_request_id = %request.id,
            category = %request.category,
            urgency = request.urgency.as_str(),
            "service request created"
        );
        self.notifier.notify(&DomainEvent::ServiceRequestCreated {
            service_request_id: request.id.clone(),
            category: request.category.clone(),
        });
        Ok(request)
    }

    pub fn get_service_request(&self, id: &str) -> Result<ServiceRequestDetail, AppError> {
        let request = self.load_request(id)?;
        let quotes = self.repo.quotes_for_request(id)?;
        let job = self.repo.job_for_request(id)?;
        Ok(ServiceRequestDetail { request, quotes, job })
    }

    /// Cancels a request that has not started. A scheduled job goes with it.
    pub fn cancel_service_request(&self, id: &str) -> Result<ServiceRequest, AppError> {
        let (request, cancelled_job) = self.with_request(id, || {
            let mut request = self.load_request(id)?;
            let now = now();
            request.transition_to(ServiceRequestStatus::Cancelled, now)?;

            match self.repo.job_for_request(id)? {
                Some(mut job) if job.status == JobStatus::Scheduled => {
                    job.transition_to(JobStatus::Cancelled, now)?;
                    self.repo.save_job_and_request(&job, &request)?;
                    Ok((request, Some(job.id)))
                }
                _ => {
                    self.repo.update_service_request(&request)?;
                    Ok((request, None))
                }
            }
        })?;

        tracing::info!(service_request_id = %id, "service request cancelled");
        if let Some(job_id) = cancelled_job {
            self.notifier.notify(&DomainEvent::JobCancelled { job_id });
        }
        self.notifier.notify(&DomainEvent::ServiceRequestCancelled {
            service_request_id: request.id.clone(),
        });
        Ok(request)
    }

    /// One open quote per technician per request; only PENDING requests take
    /// new quotes.
    pub fn submit_quote(
        &self,
        request_id: &str,
        technician_id: &str,
        estimate: QuoteEstimate,
    ) -> Result<Quote, AppError> {
        let technician_id = technician_id.trim();
        if technician_id.is_empty() {
            return Err(AppError::Validation("technician_id is required".to_string()));
        }
        estimate.validate()?;

        let quote = self.with_request(request_id, || {
            let request = self.load_request(request_id)?;
            let existing = self.repo.quotes_for_request(request_id)?;

            if existing.iter().any(|q| q.customer_accepted) {
                return Err(AppError::AlreadyAccepted {
                    service_request_id: request_id.to_string(),
                });
            }
            if request.status != ServiceRequestStatus::Pending {
                return Err(AppError::RequestClosed {
                    id: request.id,
                    status: request.status.as_str(),
                });
            }
            if existing
                .iter()
                .any(|q| q.technician_id == technician_id && !q.withdrawn)
            {
                return Err(AppError::DuplicateQuote {
                    technician_id: technician_id.to_string(),
                });
            }

            let quote = Quote {
                id: uuid::Uuid::new_v4().to_string(),
                service_request_id: request.id.clone(),
                technician_id: technician_id.to_string(),
                estimated_hours: estimate.estimated_hours,
                materials_cost_cents: estimate.materials_cost_cents,
                labor_cost_cents: estimate.labor_cost_cents,
                total_cost_cents: estimate.total_cost_cents(),
                customer_accepted: false,
                withdrawn: false,
                notes: estimate.notes.clone().filter(|n| !n.trim().is_empty()),
                created_at: now(),
            };
            self.repo.insert_quote(&quote)?;
            Ok(quote)
        })?;

        tracing::info!(
            quote_id = %quote.id,
            service_request_id = %request_id,
            technician_id,
            total_cost_cents = quote.total_cost_cents,
            "quote received"
        );
        self.notifier.notify(&DomainEvent::QuoteReceived {
            quote_id: quote.id.clone(),
            service_request_id: quote.service_request_id.clone(),
            technician_id: quote.technician_id.clone(),
            total_cost_cents: quote.total_cost_cents,
        });
        Ok(quote)
    }

    pub fn withdraw_quote(&self, quote_id: &str) -> Result<Quote, AppError> {
        let request_id = self.load_quote(quote_id)?.service_request_id;

        let quote = self.with_request(&request_id, || {
            let mut quote = self.load_quote(quote_id)?;
            if !quote.is_open() {
                return Err(AppError::InvalidTransition {
                    entity: "quote",
                    current: if quote.customer_accepted { "accepted" } else { "withdrawn" },
                    requested: "withdrawn",
                });
            }
            quote.withdrawn = true;
            self.repo.update_quote(&quote)?;
            Ok(quote)
        })?;

        tracing::info!(quote_id, service_request_id = %request_id, "quote withdrawn");
        self.notifier.notify(&DomainEvent::QuoteWithdrawn {
            quote_id: quote.id.clone(),
        });
        Ok(quote)
    }

    /// Accepts the quote, assigns the request and spawns a SCHEDULED job in
    /// one write. A second acceptance on the same request fails.
    pub fn accept_quote(&self, quote_id: &str) -> Result<Job, AppError> {
        let request_id = self.load_quote(quote_id)?.service_request_id;

        let job = self.with_request(&request_id, || {
            let mut quote = self.load_quote(quote_id)?;
            let mut request = self.load_request(&request_id)?;

            let siblings = self.repo.quotes_for_request(&request_id)?;
            if siblings.iter().any(|q| q.customer_accepted) {
                return Err(AppError::AlreadyAccepted {
                    service_request_id: request_id.clone(),
                });
            }
            if quote.withdrawn {
                return Err(AppError::InvalidTransition {
                    entity: "quote",
                    current: "withdrawn",
                    requested: "accepted",
                });
            }

            let now = now();
            request.transition_to(ServiceRequestStatus::Assigned, now)?;
            quote.customer_accepted = true;

            let job = Job {
                id: uuid::Uuid::new_v4().to_string(),
                service_request_id: request.id.clone(),
                quote_id: quote.id.clone(),
                technician_id: quote.technician_id.clone(),
                scheduled_date: request.preferred_date,
                status: JobStatus::Scheduled,
                actual_hours: None,
                customer_rating: None,
                customer_feedback: None,
                created_at: now,
                updated_at: now,
            };
            self.repo.accept_quote(&quote, &request, &job)?;
            Ok(job)
        })?;

        tracing::info!(
            quote_id,
            job_id = %job.id,
            technician_id = %job.technician_id,
            "quote accepted, job scheduled"
        );
        self.notifier.notify(&DomainEvent::QuoteAccepted {
            quote_id: quote_id.to_string(),
            job_id: job.id.clone(),
        });
        Ok(job)
    }

    /// Moves the job and its request together.
    fn advance_job(
        &self,
        job_id: &str,
        job_status: JobStatus,
        request_status: ServiceRequestStatus,
        before_save: impl FnOnce(&mut Job),
    ) -> Result<Job, AppError> {
        let request_id = self.get_job(job_id)?.service_request_id;

        self.with_request(&request_id, || {
            let mut job = self.get_job(job_id)?;
            let mut request = self.load_request(&request_id)?;
            let now = now();

            job.transition_to(job_status, now)?;
            request.transition_to(request_status, now)?;
            before_save(&mut job);

            self.repo.save_job_and_request(&job, &request)?;
            Ok(job)
        })
    }

    pub fn start_job(&self, job_id: &str) -> Result<Job, AppError> {
        let job = self.advance_job(
            job_id,
            JobStatus::InProgress,
            ServiceRequestStatus::InProgress,
            |_| {},
        )?;
        tracing::info!(job_id, "job started");
        self.notifier.notify(&DomainEvent::JobStarted {
            job_id: job.id.clone(),
        });
        Ok(job)
    }

    pub fn complete_job(&self, job_id: &str, actual_hours: f64) -> Result<Job, AppError> {
        if !actual_hours.is_finite() || actual_hours <= 0.0 {
            return Err(AppError::Validation(
                "actual_hours must be a positive number".to_string(),
            ));
        }

        let job = self.advance_job(
            job_id,
            JobStatus::Completed,
            ServiceRequestStatus::Completed,
            |job| job.actual_hours = Some(actual_hours),
        )?;
        tracing::info!(job_id, actual_hours, "job completed");
        self.metrics.record(Metric::JobCompleted);
        self.notifier.notify(&DomainEvent::JobCompleted {
            job_id: job.id.clone(),
            actual_hours,
        });
        Ok(job)
    }

    pub fn cancel_job(&self, job_id: &str) -> Result<Job, AppError> {
        let job = self.advance_job(
            job_id,
            JobStatus::Cancelled,
            ServiceRequestStatus::Cancelled,
            |_| {},
        )?;
        tracing::info!(job_id, "job cancelled");
        self.notifier.notify(&DomainEvent::JobCancelled {
            job_id: job.id.clone(),
        });
        Ok(job)
    }

    /// The customer's one rating. Repeat attempts fail with `AlreadyRated`.
    pub fn rate_job(&self, job_id: &str, stars: u8, feedback: Option<String>) -> Result<Job, AppError> {
        let request_id = self.get_job(job_id)?.service_request_id;

        let job = self.with_request(&request_id, || {
            let mut job = self.get_job(job_id)?;
            job.rate(stars, feedback, now())?;
            self.repo.update_job(&job)?;
            Ok(job)
        })?;

        tracing::info!(job_id, stars, "job rated");
        self.notifier.notify(&DomainEvent::JobRated {
            job_id: job.id.clone(),
            stars,
        });
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::models::Urgency;
    use crate::services::coordinator::tests::{harness, Harness};

    fn open_request(h: &Harness) -> ServiceRequest {
        h.coordinator
            .create_service_request(NewServiceRequest {
                customer_id: "cust-1".to_string(),
                category: "plumbing".to_string(),
                description: "kitchen sink leaks".to_string(),
                urgency: Urgency::High,
                preferred_date: NaiveDate::from_ymd_opt(2030, 6, 3),
            })
            .unwrap()
    }

    fn estimate(hours: f64, labor: i64) -> QuoteEstimate {
        QuoteEstimate {
            estimated_hours: hours,
            materials_cost_cents: 2_500,
            labor_cost_cents: labor,
            notes: None,
        }
    }

    #[test]
    fn test_second_acceptance_is_rejected() {
        let h = harness();
        let c = &h.coordinator;
        let request = open_request(&h);
        let a = c.submit_quote(&request.id, "tech-a", estimate(2.0, 12_000)).unwrap();
        let b = c.submit_quote(&request.id, "tech-b", estimate(3.0, 9_000)).unwrap();
        assert_eq!(a.total_cost_cents, 14_500);

        let job = c.accept_quote(&a.id).unwrap();
        assert_eq!(job.status, JobStatus::Scheduled);
        assert_eq!(job.technician_id, "tech-a");
        assert_eq!(job.scheduled_date, request.preferred_date);

        assert!(matches!(c.accept_quote(&b.id), Err(AppError::AlreadyAccepted { .. })));

        let detail = c.get_service_request(&request.id).unwrap();
        assert_eq!(detail.request.status, ServiceRequestStatus::Assigned);
        assert_eq!(detail.job.unwrap().technician_id, "tech-a");
        let accepted: Vec<_> = detail.quotes.iter().filter(|q| q.customer_accepted).collect();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].id, a.id);
    }

    #[test]
    fn test_duplicate_quote_until_withdrawn() {
        let h = harness();
        let c = &h.coordinator;
        let request = open_request(&h);
        let first = c.submit_quote(&request.id, "tech-a", estimate(2.0, 10_000)).unwrap();

        assert!(matches!(
            c.submit_quote(&request.id, "tech-a", estimate(1.0, 8_000)),
            Err(AppError::DuplicateQuote { .. })
        ));

        let withdrawn = c.withdraw_quote(&first.id).unwrap();
        assert!(withdrawn.withdrawn);
        assert!(matches!(c.accept_quote(&first.id), Err(AppError::InvalidTransition { .. })));
        assert!(matches!(c.withdraw_quote(&first.id), Err(AppError::InvalidTransition { .. })));

        c.submit_quote(&request.id, "tech-a", estimate(1.0, 8_000)).unwrap();
    }

    #[test]
    fn test_quotes_after_assignment_are_rejected() {
        let h = harness();
        let c = &h.coordinator;
        let request = open_request(&h);
        let quote = c.submit_quote(&request.id, "tech-a", estimate(2.0, 10_000)).unwrap();
        c.accept_quote(&quote.id).unwrap();

        assert!(matches!(
            c.submit_quote(&request.id, "tech-b", estimate(1.0, 5_000)),
            Err(AppError::AlreadyAccepted { .. })
        ));
        assert!(matches!(c.withdraw_quote(&quote.id), Err(AppError::InvalidTransition { .. })));

        let cancelled = open_request(&h);
        c.cancel_service_request(&cancelled.id).unwrap();
        assert!(matches!(
            c.submit_quote(&cancelled.id, "tech-b", estimate(1.0, 5_000)),
            Err(AppError::RequestClosed { status: "cancelled", .. })
        ));
    }

    #[test]
    fn test_job_lifecycle_and_single_rating() {
        let h = harness();
        let c = &h.coordinator;
        let request = open_request(&h);
        let quote = c.submit_quote(&request.id, "tech-a", estimate(2.0, 10_000)).unwrap();
        let job = c.accept_quote(&quote.id).unwrap();

        assert!(matches!(c.rate_job(&job.id, 5, None), Err(AppError::Validation(_))));
        assert!(matches!(c.complete_job(&job.id, 2.0), Err(AppError::InvalidTransition { .. })));

        c.start_job(&job.id).unwrap();
        assert_eq!(
            c.get_service_request(&request.id).unwrap().request.status,
            ServiceRequestStatus::InProgress
        );
        assert!(matches!(c.complete_job(&job.id, 0.0), Err(AppError::Validation(_))));
        let done = c.complete_job(&job.id, 2.5).unwrap();
        assert_eq!(done.actual_hours, Some(2.5));
        assert_eq!(
            c.get_service_request(&request.id).unwrap().request.status,
            ServiceRequestStatus::Completed
        );

        let rated = c.rate_job(&job.id, 5, Some("great".to_string())).unwrap();
        assert_eq!(rated.customer_rating, Some(5));
        assert!(matches!(c.rate_job(&job.id, 3, None), Err(AppError::AlreadyRated { .. })));
        assert_eq!(c.get_job(&job.id).unwrap().customer_feedback.as_deref(), Some("great"));

        assert_eq!(h.repo.recent_activity(1).unwrap()[0].jobs_completed, 1);
        assert_eq!(
            h.notifier.kinds(),
            vec![
                "service_request_created",
                "quote_received",
                "quote_accepted",
                "job_started",
                "job_completed",
                "job_rated"
            ]
        );
    }

    #[test]
    fn test_cancel_job_only_before_start() {
        let h = harness();
        let c = &h.coordinator;

        let request = open_request(&h);
        let quote = c.submit_quote(&request.id, "tech-a", estimate(2.0, 10_000)).unwrap();
        let job = c.accept_quote(&quote.id).unwrap();
        let cancelled = c.cancel_job(&job.id).unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert_eq!(
            c.get_service_request(&request.id).unwrap().request.status,
            ServiceRequestStatus::Cancelled
        );

        let request = open_request(&h);
        let quote = c.submit_quote(&request.id, "tech-b", estimate(2.0, 10_000)).unwrap();
        let job = c.accept_quote(&quote.id).unwrap();
        c.start_job(&job.id).unwrap();
        assert!(matches!(c.cancel_job(&job.id), Err(AppError::InvalidTransition { .. })));
        assert!(matches!(
            c.cancel_service_request(&request.id),
            Err(AppError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_cancelling_assigned_request_cancels_scheduled_job() {
        let h = harness();
        let c = &h.coordinator;
        let request = open_request(&h);
        let quote = c.submit_quote(&request.id, "tech-a", estimate(2.0, 10_000)).unwrap();
        let job = c.accept_quote(&quote.id).unwrap();

        c.cancel_service_request(&request.id).unwrap();
        assert_eq!(c.get_job(&job.id).unwrap().status, JobStatus::Cancelled);
    }

    #[test]
    fn test_request_validation() {
        let h = harness();
        let c = &h.coordinator;
        let blank = NewServiceRequest {
            customer_id: "cust-1".to_string(),
            category: " ".to_string(),
            description: "x".to_string(),
            urgency: Urgency::Low,
            preferred_date: None,
        };
        assert!(matches!(c.create_service_request(blank), Err(AppError::Validation(_))));

        let past = NewServiceRequest {
            customer_id: "cust-1".to_string(),
            category: "roofing".to_string(),
            description: "x".to_string(),
            urgency: Urgency::Low,
            preferred_date: NaiveDate::from_ymd_opt(2020, 1, 1),
        };
        assert!(matches!(c.create_service_request(past), Err(AppError::Validation(_))));
        assert!(matches!(c.get_service_request("missing"), Err(AppError::NotFound(_))));
        assert!(matches!(c.accept_quote("missing"), Err(AppError::NotFound(_))));
    }
}

//! Student -> alumni connection requests.
//!
//! `pending` moves to `accepted` or `rejected` exactly once. Each side polls
//! for unseen events and acknowledges them in bulk.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

use super::{WorkflowError, WorkflowResult, CONNECTION_REQUESTS_TOTAL};
use crate::db::{
    ConnectionAction, ConnectionRequest, ConnectionStatus, ConnectionView, IdentitySummary, Party,
    Role, SentRequestStatus,
};
use crate::store::{ConnectionStore, IdentityStore, ResolveOutcome, StoreError};

#[derive(Clone)]
pub struct ConnectionWorkflow {
    connections: Arc<dyn ConnectionStore>,
    identities: Arc<dyn IdentityStore>,
}

/// Treat blank ids the same as absent ones
fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl ConnectionWorkflow {
    pub fn new(connections: Arc<dyn ConnectionStore>, identities: Arc<dyn IdentityStore>) -> Self {
        Self {
            connections,
            identities,
        }
    }

    #[instrument(skip(self))]
    pub async fn create_request(
        &self,
        from_student: Option<&str>,
        to_alumni: Option<&str>,
    ) -> WorkflowResult<ConnectionRequest> {
        let (Some(from_student), Some(to_alumni)) = (present(from_student), present(to_alumni)) else {
            return Err(WorkflowError::MissingFields("Missing fields"));
        };

        self.expect_role(from_student, Role::Student, "fromStudent must be a registered student")
            .await?;
        self.expect_role(to_alumni, Role::Alumni, "toAlumni must be a registered alumni")
            .await?;

        let request = ConnectionRequest::new_pending(from_student.to_string(), to_alumni.to_string());

        // The store rejects a second pending request for the pair atomically
        match self.connections.insert_pending_request(&request).await {
            Ok(()) => {}
            Err(StoreError::Conflict) => {
                metrics::counter!(CONNECTION_REQUESTS_TOTAL, "outcome" => "duplicate").increment(1);
                return Err(WorkflowError::DuplicateRequest);
            }
            Err(e) => return Err(e.into()),
        }

        metrics::counter!(CONNECTION_REQUESTS_TOTAL, "outcome" => "created").increment(1);
        info!(request_id = %request.id, "Connection request created");
        Ok(request)
    }

    #[instrument(skip(self))]
    pub async fn respond(
        &self,
        request_id: Option<&str>,
        action: Option<&str>,
    ) -> WorkflowResult<ConnectionRequest> {
        let (Some(request_id), Some(action)) = (present(request_id), present(action)) else {
            return Err(WorkflowError::MissingFields("Missing fields"));
        };

        let action: ConnectionAction = action.parse().map_err(|message| WorkflowError::Validation {
            field: "action",
            message,
        })?;

        match self.connections.resolve_request(request_id, action).await? {
            ResolveOutcome::Resolved(request) => {
                let outcome = request.status.as_str();
                metrics::counter!(CONNECTION_REQUESTS_TOTAL, "outcome" => outcome).increment(1);
                info!(request_id = %request.id, status = %request.status, "Connection request resolved");
                Ok(request)
            }
            ResolveOutcome::NotFound => Err(WorkflowError::NotFound("Request not found")),
            ResolveOutcome::AlreadyResolved(status) => Err(WorkflowError::AlreadyResolved(status)),
        }
    }

    /// Pending requests addressed to an alumni, with the requesting student attached
    pub async fn received(&self, alumni_id: &str) -> WorkflowResult<Vec<ConnectionView>> {
        let requests = self
            .connections
            .requests_to_alumni(alumni_id, Some(ConnectionStatus::Pending))
            .await?;
        self.with_counterparts(requests, Party::Alumni).await
    }

    /// Accepted connections of a student, with the alumni attached
    pub async fn my_connections(&self, student_id: &str) -> WorkflowResult<Vec<ConnectionView>> {
        let requests = self
            .connections
            .requests_from_student(student_id, Some(ConnectionStatus::Accepted))
            .await?;
        self.with_counterparts(requests, Party::Student).await
    }

    /// Every request a student has sent, reduced to target and status
    pub async fn sent_requests(&self, student_id: &str) -> WorkflowResult<Vec<SentRequestStatus>> {
        let requests = self.connections.requests_from_student(student_id, None).await?;
        Ok(requests
            .into_iter()
            .map(|r| SentRequestStatus {
                alumni_id: r.to_alumni,
                status: r.status,
            })
            .collect())
    }

    /// Events the party has not acknowledged yet
    pub async fn notifications(&self, party: Party, party_id: &str) -> WorkflowResult<Vec<ConnectionView>> {
        let requests = self.connections.unseen_requests(party, party_id).await?;
        self.with_counterparts(requests, party).await
    }

    /// Acknowledge everything currently unseen for the party
    #[instrument(skip(self))]
    pub async fn mark_seen(&self, party: Party, party_id: Option<&str>) -> WorkflowResult<u64> {
        let Some(party_id) = present(party_id) else {
            return Err(WorkflowError::MissingFields(match party {
                Party::Alumni => "alumniId is required",
                Party::Student => "studentId is required",
            }));
        };
        Ok(self.connections.mark_requests_seen(party, party_id).await?)
    }

    async fn expect_role(&self, id: &str, role: Role, message: &'static str) -> WorkflowResult<()> {
        match self.identities.find_by_id(id).await? {
            Some(identity) if identity.role() == role => Ok(()),
            _ => Err(WorkflowError::UnknownParty(message)),
        }
    }

    /// Attach the identity on the other side of each request. `viewer` is the
    /// party looking at the list.
    async fn with_counterparts(
        &self,
        requests: Vec<ConnectionRequest>,
        viewer: Party,
    ) -> WorkflowResult<Vec<ConnectionView>> {
        let mut cache: HashMap<String, Option<IdentitySummary>> = HashMap::new();
        let mut views = Vec::with_capacity(requests.len());

        for request in requests {
            let other = match viewer {
                Party::Alumni => &request.from_student,
                Party::Student => &request.to_alumni,
            };
            let summary = match cache.get(other) {
                Some(summary) => summary.clone(),
                None => {
                    let summary = self
                        .identities
                        .find_by_id(other)
                        .await?
                        .map(|i| IdentitySummary::from(&i));
                    cache.insert(other.clone(), summary.clone());
                    summary
                }
            };

            views.push(match viewer {
                Party::Alumni => ConnectionView {
                    request,
                    student: summary,
                    alumni: None,
                },
                Party::Student => ConnectionView {
                    request,
                    student: None,
                    alumni: summary,
                },
            });
        }

        Ok(views)
    }
}

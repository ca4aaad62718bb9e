//! Role-scoped commitment reporting.
//!
//! Every operation takes the [`AuthorizationContext`] the guard produced and
//! narrows reads and writes to its [`DataScope`](crate::auth::DataScope).
//! Writes that change dashboard state publish on the [`UpdateBus`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::auth::{
    AuthError, AuthorizationContext, Role, ValidationError, assert_positive_int, assert_status,
    validate::assert_present,
};
use crate::bus::{UpdateBus, UpdateEvent, UpdateKind};
use crate::store::{Commitment, NewCommitment, StatusChange, Store, StoreError};
use crate::{Clock, Result};

const COMMITMENTS_SOURCE: &str = "commitments";
const ALERTS_SOURCE: &str = "alerts";

/// Percentage of promised votes that were reported.
///
/// Zero when nothing was promised. Over-delivery is reported as is, above 100.
pub fn completion(promised: i64, reported: i64) -> f64 {
    if promised == 0 {
        return 0.0;
    }
    reported as f64 * 100.0 / promised as f64
}

/// A commitment plus its completion percentage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentView {
    #[serde(flatten)]
    pub commitment: Commitment,
    pub completion: f64,
}

impl From<Commitment> for CommitmentView {
    fn from(commitment: Commitment) -> Self {
        let completion = completion(commitment.promised_votes, commitment.reported_votes);
        Self {
            commitment,
            completion,
        }
    }
}

/// Body of a commitment creation request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentInput {
    /// Required for admins; leaders may omit it or must pass their own.
    #[serde(default)]
    pub leader_id: Option<String>,
    #[serde(default)]
    pub delegate_id: Option<String>,
    pub description: String,
    pub promised_votes: i64,
    #[serde(default)]
    pub reported_votes: i64,
}

/// Confirmation returned after an alert went out.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertReceipt {
    pub ts: i64,
    pub delivered: usize,
}

/// Commitment projections and writes for one deployment.
#[derive(Clone)]
pub struct Reports {
    store: Arc<dyn Store>,
    bus: UpdateBus,
    clock: Arc<dyn Clock>,
}

fn require_role(ctx: &AuthorizationContext, allowed: &[Role]) -> Result<()> {
    if allowed.contains(&ctx.role) {
        Ok(())
    } else {
        Err(AuthError::Forbidden { role: ctx.role }.into())
    }
}

fn not_found(id: i64) -> crate::Error {
    StoreError::NotFound {
        entity: "commitment",
        id: id.to_string(),
    }
    .into()
}

impl Reports {
    pub fn new(store: Arc<dyn Store>, bus: UpdateBus, clock: Arc<dyn Clock>) -> Self {
        Self { store, bus, clock }
    }

    pub fn bus(&self) -> &UpdateBus {
        &self.bus
    }

    fn notify(&self, kind: UpdateKind, source: &str) -> usize {
        let event = UpdateEvent::new(self.clock.now_millis())
            .with_kind(kind)
            .with_source(source);
        self.bus.publish(&event)
    }

    /// Commitments visible to the caller, ordered by id.
    pub async fn list_commitments(&self, ctx: &AuthorizationContext) -> Result<Vec<CommitmentView>> {
        let rows = self.store.commitments(&ctx.scope()).await?;
        Ok(rows.into_iter().map(CommitmentView::from).collect())
    }

    /// One commitment, if it exists and lies inside the caller's scope.
    pub async fn commitment(&self, ctx: &AuthorizationContext, id: i64) -> Result<CommitmentView> {
        let id = assert_positive_int("id", id)?;
        let commitment = self.scoped(ctx, id).await?;
        Ok(commitment.into())
    }

    async fn scoped(&self, ctx: &AuthorizationContext, id: i64) -> Result<Commitment> {
        let scope = ctx.scope();
        self.store
            .commitment(id)
            .await?
            .filter(|c| scope.permits(&c.leader_id, c.delegate_id.as_deref()))
            .ok_or_else(|| not_found(id))
    }

    /// Record a new commitment. Admins name any leader; leaders only themselves.
    pub async fn create_commitment(
        &self,
        ctx: &AuthorizationContext,
        input: CommitmentInput,
    ) -> Result<CommitmentView> {
        require_role(ctx, &[Role::Admin, Role::Leader])?;

        let description = assert_present("description", &input.description)?.trim().to_string();
        let promised_votes = assert_positive_int("promisedVotes", input.promised_votes)?;
        if input.reported_votes < 0 {
            return Err(ValidationError::Invalid {
                field: "reportedVotes",
                reason: "must not be negative".to_string(),
            }
            .into());
        }

        let requested = input.leader_id.filter(|id| !id.trim().is_empty());
        let leader_id = match ctx.role {
            Role::Admin => requested.ok_or(ValidationError::MissingField { field: "leaderId" })?,
            _ => {
                let Some(own) = ctx.leader_id.clone() else {
                    return Err(AuthError::Forbidden { role: ctx.role }.into());
                };
                match requested {
                    Some(other) if other != own => {
                        tracing::info!(user_id = ctx.user_id, "leader tried to create for another leader");
                        return Err(AuthError::Forbidden { role: ctx.role }.into());
                    }
                    _ => own,
                }
            }
        };

        let commitment = self
            .store
            .insert_commitment(NewCommitment {
                leader_id,
                delegate_id: input.delegate_id.filter(|id| !id.trim().is_empty()),
                description,
                promised_votes,
                reported_votes: input.reported_votes,
                created_at: self.clock.now_millis(),
            })
            .await?;
        tracing::info!(commitment_id = commitment.id, user_id = ctx.user_id, "commitment created");

        self.notify(UpdateKind::Commitment, COMMITMENTS_SOURCE);
        Ok(commitment.into())
    }

    /// Move a commitment to `status` and notify live feeds.
    ///
    /// Ids outside the caller's scope are indistinguishable from missing ones.
    pub async fn update_commitment_status(
        &self,
        ctx: &AuthorizationContext,
        id: i64,
        status: &str,
    ) -> Result<CommitmentView> {
        require_role(ctx, &[Role::Admin, Role::Leader])?;
        let id = assert_positive_int("id", id)?;
        let status = assert_status(status)?;

        self.scoped(ctx, id).await?;
        let updated = self
            .store
            .set_commitment_status(id, status, ctx.user_id, self.clock.now_millis())
            .await?;
        tracing::info!(
            commitment_id = id,
            status = status.as_str(),
            user_id = ctx.user_id,
            "commitment status changed"
        );

        self.notify(UpdateKind::Commitment, COMMITMENTS_SOURCE);
        Ok(updated.into())
    }

    /// Audit trail of one commitment, for callers who can see it.
    pub async fn status_history(
        &self,
        ctx: &AuthorizationContext,
        id: i64,
    ) -> Result<Vec<StatusChange>> {
        let id = assert_positive_int("id", id)?;
        self.scoped(ctx, id).await?;
        self.store.status_history(id).await
    }

    /// Broadcast an alert to every open live feed.
    pub async fn publish_alert(
        &self,
        ctx: &AuthorizationContext,
        message: &str,
    ) -> Result<AlertReceipt> {
        require_role(ctx, &[Role::Admin])?;
        let message = assert_present("message", message)?.trim();

        let ts = self.clock.now_millis();
        let event = UpdateEvent::new(ts)
            .with_kind(UpdateKind::Alert)
            .with_source(ALERTS_SOURCE);
        let delivered = self.bus.publish(&event);
        tracing::info!(user_id = ctx.user_id, delivered, alert = message, "alert published");
        Ok(AlertReceipt { ts, delivered })
    }
}

//! Back-office dependencies for domain activities (using traits for
//! testability)
//!
//! Central dependency container handed to every domain activity. All
//! external services sit behind trait abstractions so tests can swap in the
//! in-memory kernel from `test_dependencies`.

use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::common::{AuditEntry, BackofficeError, BackofficeResult};
use crate::config::BackofficeConfig;
use crate::domains::bulk_ops::models::ReviewDecision;
use crate::domains::directory::models::BusinessRecord;
use crate::kernel::pg::{PgAuditSink, PgDirectoryStore};
use crate::kernel::{BaseApprovalChannel, BaseAuditSink, BaseAuthorizer, BaseDirectoryStore};

// =============================================================================
// ConfiguredAuthorizer (implements BaseAuthorizer from a static admin list)
// =============================================================================

/// Admin check against the configured identifier list. Session handling and
/// identity proof live outside this crate; by the time an actor string gets
/// here it is authenticated.
pub struct ConfiguredAuthorizer {
    admin_identifiers: Vec<String>,
}

impl ConfiguredAuthorizer {
    pub fn new(admin_identifiers: Vec<String>) -> Self {
        Self { admin_identifiers }
    }
}

#[async_trait]
impl BaseAuthorizer for ConfiguredAuthorizer {
    async fn is_admin(&self, actor: &str) -> BackofficeResult<bool> {
        Ok(self.admin_identifiers.iter().any(|a| a == actor))
    }
}

// =============================================================================
// QualityScoreChannel (deterministic BaseApprovalChannel)
// =============================================================================

/// Deterministic stand-in for a live review UI: approves any record whose
/// quality score clears the floor. Same record, same decision, every time.
pub struct QualityScoreChannel {
    pub min_quality: f64,
}

impl QualityScoreChannel {
    pub fn new(min_quality: f64) -> Self {
        Self { min_quality }
    }
}

impl Default for QualityScoreChannel {
    fn default() -> Self {
        Self { min_quality: 75.0 }
    }
}

#[async_trait]
impl BaseApprovalChannel for QualityScoreChannel {
    async fn request_review(&self, record: &BusinessRecord) -> BackofficeResult<ReviewDecision> {
        if record.quality_score >= self.min_quality {
            Ok(ReviewDecision::Approved)
        } else {
            Ok(ReviewDecision::Declined {
                reason: format!(
                    "quality score {:.1} below review floor {:.1}",
                    record.quality_score, self.min_quality
                ),
            })
        }
    }
}

// =============================================================================
// BackofficeDeps
// =============================================================================

/// Dependencies accessible to domain activities (using traits for
/// testability)
#[derive(Clone)]
pub struct BackofficeDeps {
    pub store: Arc<dyn BaseDirectoryStore>,
    pub audit: Arc<dyn BaseAuditSink>,
    pub authorizer: Arc<dyn BaseAuthorizer>,
    pub approvals: Arc<dyn BaseApprovalChannel>,
    /// Wall-clock ceiling for one batch commit; expiry is a batch-level
    /// failure, never a hang.
    pub batch_timeout: Duration,
}

impl BackofficeDeps {
    pub fn new(
        store: Arc<dyn BaseDirectoryStore>,
        audit: Arc<dyn BaseAuditSink>,
        authorizer: Arc<dyn BaseAuthorizer>,
        approvals: Arc<dyn BaseApprovalChannel>,
        batch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            audit,
            authorizer,
            approvals,
            batch_timeout,
        }
    }

    /// Production wiring: Postgres store and audit sink, configured admin
    /// list, deterministic review channel.
    pub fn postgres(pool: PgPool, config: &BackofficeConfig) -> Self {
        Self {
            store: Arc::new(PgDirectoryStore::new(pool.clone())),
            audit: Arc::new(PgAuditSink::new(pool)),
            authorizer: Arc::new(ConfiguredAuthorizer::new(config.admin_identifiers.clone())),
            approvals: Arc::new(QualityScoreChannel::default()),
            batch_timeout: Duration::from_secs(config.batch_timeout_secs),
        }
    }
}

/// Gate for every mutating entry point.
pub async fn ensure_admin(deps: &BackofficeDeps, actor: &str) -> BackofficeResult<()> {
    if deps.authorizer.is_admin(actor).await? {
        Ok(())
    } else {
        Err(BackofficeError::AdminRequired)
    }
}

/// Append to the audit trail without letting sink failures reach the caller.
/// Transport errors degrade to a local warning - mutations never block on
/// the trail.
pub async fn emit_audit(deps: &BackofficeDeps, entry: AuditEntry) {
    let action = entry.action;
    if let Err(err) = deps.audit.append(entry).await {
        warn!(action = action.as_str(), error = %err, "audit sink append failed; entry logged locally only");
    }
}

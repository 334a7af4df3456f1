//! Typed ID definitions for all domain entities.
//!
//! Type aliases over [`Id`] give compile-time safety for ID usage throughout
//! the crate: a `BusinessId` cannot be passed where an `OperationId` is
//! expected.

pub use super::id::Id;

// ============================================================================
// Entity marker types
// ============================================================================
//
// Named so they never collide with the model structs they identify.

/// Marker type for business records.
pub struct Business;

/// Marker type for customer inquiries (child records of a business).
pub struct InquiryRecord;

/// Marker type for ownership claims (child records of a business).
pub struct ClaimRecord;

/// Marker type for bulk operations.
pub struct Operation;

/// Marker type for pre-operation snapshots.
pub struct SnapshotCapture;

/// Marker type for audit trail entries.
pub struct AuditRecord;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

/// Typed ID for business records.
pub type BusinessId = Id<Business>;

/// Typed ID for inquiries.
pub type InquiryId = Id<InquiryRecord>;

/// Typed ID for ownership claims.
pub type ClaimId = Id<ClaimRecord>;

/// Typed ID for bulk operations.
pub type OperationId = Id<Operation>;

/// Typed ID for snapshots.
pub type SnapshotId = Id<SnapshotCapture>;

/// Typed ID for audit entries.
pub type AuditEntryId = Id<AuditRecord>;

// Kernel - infrastructure layer
//
// Trait-based dependency injection for persistence, audit, authorization,
// and the pluggable approval channel. Domain activities receive a
// BackofficeDeps and never touch a concrete backend directly.

pub mod deps;
pub mod pg;
pub mod test_dependencies;
pub mod traits;

pub use deps::{emit_audit, ensure_admin, BackofficeDeps, ConfiguredAuthorizer, QualityScoreChannel};
pub use pg::{PgAuditSink, PgDirectoryStore};
pub use traits::{
    BaseApprovalChannel, BaseAuditSink, BaseAuthorizer, BaseDirectoryStore, ChildCounts,
};

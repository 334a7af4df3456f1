pub mod business;
pub mod claim;
pub mod inquiry;

pub use business::{ApprovalStatus, BusinessRecord, FieldUpdate, FilterCriterion};
pub use claim::{ClaimStatus, OwnershipClaim};
pub use inquiry::Inquiry;

pub mod clock;
pub mod config;
pub mod dedup;
pub mod domain;
pub mod errors;
pub mod validation;

pub use clock::{Clock, FixedClock, OrgTimeZone, SystemClock, WorkingHours};
pub use dedup::DeduplicationGuard;
pub use domain::event::EventId;
pub use domain::leave::{
    CandidateLeave, InterpretedLeave, Leave, LeaveId, LeaveType, NewLeave, UnknownLeaveType,
};
pub use domain::query::{LeaveStats, QueryIntent, QueryType};
pub use errors::{ApplicationError, InterfaceError};
pub use validation::{AcceptedLeave, LeaveRejection, LeaveValidator, ValidationOutcome};

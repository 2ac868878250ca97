pub mod event;
pub mod leave;
pub mod query;

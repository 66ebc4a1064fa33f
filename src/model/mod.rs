pub mod api;
pub mod auth;
pub mod chain;
pub mod election;
pub mod id;
pub mod master;

/// Users are identified by a plain number, assigned outside this service.
pub type User = u32;

//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Expiration sweep: prunes every runtime store that has a policy

mod expiration;

pub use expiration::spawn_expiration_task;

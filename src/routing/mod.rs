//! Routing Module
//!
//! Maps intercepted requests to strategies.

mod matcher;
mod router;

pub use matcher::{Matcher, RequestPredicate};
pub use router::{Route, Router};

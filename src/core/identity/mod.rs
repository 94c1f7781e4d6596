//! Patient identity resolution
//!
//! Resolves which destination patient a source person is. The default
//! [`NameMatchResolver`] accepts only an exact match on normalized full names
//! and never guesses between several candidates.

pub mod normalize;
pub mod resolver;

pub use normalize::{names_match, normalize_name};
pub use resolver::{IdentityResolver, MatchPath, NameMatchResolver, NoMatchReason, Resolution};

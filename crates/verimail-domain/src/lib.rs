//! Shared domain vocabulary for the email-verification pipeline.

pub mod id;
pub mod token;

pub use id::{OutboxIntentId, UserId};
pub use token::{TokenParseError, VerificationToken};

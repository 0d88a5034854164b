//! sea-orm entities owned by the verification service.

pub mod email_verification_outbox;
pub mod users;

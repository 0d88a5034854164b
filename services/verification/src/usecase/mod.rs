pub mod issue;
pub mod outbox;
pub mod verify;

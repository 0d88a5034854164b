pub mod db;
pub mod publisher;

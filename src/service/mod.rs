pub mod auth;
pub mod booking;
pub mod datetime;
pub mod email;
pub mod reconcile;
pub mod scheduling;
pub mod session_store;

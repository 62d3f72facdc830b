//! API handlers.

pub mod accounts;
pub mod admin;
pub mod contests;
pub mod credits;
pub mod health;
pub mod payments;
pub mod views;
pub mod webhooks;

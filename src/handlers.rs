// src/handlers.rs

pub mod agreements;
pub mod licenses;
pub mod renewals;
pub mod subscriptions;

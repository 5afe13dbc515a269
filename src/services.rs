// src/services.rs

pub mod agreement_service;
pub mod auth;
pub mod catalog_client;
pub mod email_service;
pub mod license_service;
pub mod subscription_service;

#[cfg(test)]
pub mod test_support;

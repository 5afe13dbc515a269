// src/models.rs

pub mod agreement;
pub mod auth;
pub mod email;
pub mod history;
pub mod license;
pub mod rbac;
pub mod subscription;

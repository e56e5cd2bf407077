//! config/mod.rs
pub mod mailing_config;

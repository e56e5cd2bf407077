//! services/mod.rs
//! Módulo que agrupa los distintos "servicios" o "capas de negocio" de la app.

pub mod clock;
pub mod dispatcher;
pub mod due_policy;
pub mod mailing_store;
pub mod scheduler;
pub mod transport;

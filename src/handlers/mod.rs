//! handlers/mod.rs
//! Endpoints HTTP: disparo de pasadas y consulta de mailings.
pub mod dispatch_handler;
pub mod mailing_handler;

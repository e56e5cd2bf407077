//! models/mod.rs
//! Módulo raíz para modelos/estructuras compartidas.

pub mod dispatch_model;
pub mod mailing_model;

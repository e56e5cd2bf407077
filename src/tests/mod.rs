//! tests/mod.rs
//! Pruebas unitarias del servicio de mailings.

mod model_tests;
mod support;
mod transport_tests;

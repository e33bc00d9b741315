//! Catalog integration layer for the shelfwise book-tracking backend.
//!
//! Request handlers resolve works through [`application::mirror`]; background
//! work (stats recomputation, notification fan-out, publication polling and
//! cache maintenance) runs under [`application::jobs::TaskSupervisor`].

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;

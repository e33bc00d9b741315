//! Application services layer.

pub mod catalog;
pub mod error;
pub mod fanout;
pub mod imports;
pub mod jobs;
pub mod mirror;
pub mod notifications;
pub mod repos;

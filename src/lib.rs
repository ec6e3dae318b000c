#![forbid(unsafe_code)]

pub mod agenda;
pub mod app;
pub mod approval;
pub mod cache;
pub mod cli;
pub mod error;
pub mod formats;
pub mod logging;
pub mod minutes;
pub mod pending_store;
pub mod report;
pub mod roster;
pub mod scanner;
pub mod schedule;

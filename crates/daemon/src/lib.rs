#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Tender parser daemon: accepts parse tasks over HTTP, bounds concurrent
//! browser extractions, and persists task/tender state in an embedded
//! document store.

pub mod auth;
pub mod config;
pub mod db;
pub mod extract;
pub mod http;
pub mod manager;
pub mod parse;
pub mod sweep;

//! AnimeFlow API Library
//!
//! An anime catalog kept as a single JSON document in a remote store
//! (GitHub repository file, JSONBin bin or memory), with comments, accounts,
//! interactions and video source resolution exposed through REST endpoints.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod resolver;
pub mod routes;
pub mod store;

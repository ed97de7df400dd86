//! Client library for the SchoolDesk school-management backend.
//!
//! The heart of the crate is [`api::ApiClient`], an authenticated HTTP
//! client that recovers from expired access tokens with a single,
//! de-duplicated session refresh.

pub mod api;
pub mod config;
pub mod setup;

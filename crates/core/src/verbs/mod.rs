//! Verb handlers for the client and admin channels (spec §4.4, §4.5, §4.6).

pub mod admin;
pub mod message;
pub mod session;
pub mod trickle;

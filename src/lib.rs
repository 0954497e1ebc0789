//! stationFlow: procedural radio scheduling library.
//!
//! Turns a declarative station description into reproducible day-long
//! playlists and mixes them into two-track compositions with ducking.
//! The `stationflow` CLI consumes this crate.

pub mod builder;
pub mod catalog;
pub mod compositor;
pub mod condition;
pub mod config;
pub mod continuity;
pub mod error;
pub mod program;
pub mod random;
pub mod rules;
pub mod source;
pub mod station;
pub mod timeline;

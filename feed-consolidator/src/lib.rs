//! Transit feed consolidation engine.
//!
//! Turns a scheduling-database export (trips with per-day service bitmaps,
//! vehicle circulations and timetable periods) into merged trips with
//! compact weekday calendars and identifiers that stay stable from one
//! daily export to the next.

pub mod blocks;
pub mod calendar;
pub mod config;
pub mod domain;
pub mod identity;
pub mod merge;
pub mod pipeline;
pub mod schedule;
pub mod source;
pub mod versioned;

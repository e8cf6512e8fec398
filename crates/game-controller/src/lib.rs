//! Turn-by-turn 2048 play on top of `twenty48-core`, with local score
//! history and leaderboard persistence.

pub mod config;
pub mod controller;
pub mod history;
pub mod input;
pub mod session;
pub mod store;
pub mod submitter;

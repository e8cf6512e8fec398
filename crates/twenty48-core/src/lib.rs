//! twenty48-core: the 2048 grid engine.
//!
//! This crate provides:
//! - A compact `Grid` type (`engine::Grid`) packed into a `u64`
//! - Pure move/merge (`apply_move`) reporting score delta, merge events and wins
//! - Terminal detection (`has_legal_move`) and seedable tile spawning
//!
//! Quick start:
//! ```
//! use twenty48_core::engine::{self as GameEngine, Direction};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! // Optional: build the line table up front
//! GameEngine::new();
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let g0 = GameEngine::initialize(&mut rng);
//! let out = GameEngine::apply_move(g0, Direction::Left);
//! let g1 = if out.changed { GameEngine::place_random_tile(out.grid, &mut rng) } else { g0 };
//! assert!(GameEngine::has_legal_move(g1));
//! ```
pub mod engine;

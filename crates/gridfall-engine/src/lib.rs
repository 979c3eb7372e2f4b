//! # gridfall-engine
//!
//! Authoritative Connect-Four rules: the 6×7 board, move legality,
//! gravity, turn alternation, and win detection.
//!
//! This crate does no I/O and holds no locks. A [`Game`] has exactly
//! one owner at a time — in the server that owner is the lobby actor,
//! which serializes move evaluation for free.
//!
//! ## Crate Position
//!
//! Foundation crate. `gridfall-protocol` reuses [`Board`] and [`Color`]
//! in its wire payloads; `gridfall-server` drives [`Game::apply`].

#![deny(unsafe_code)]

mod board;
mod game;

pub use board::{Board, COLS, Color, ROWS};
pub use game::{Applied, Game, GameError, Move};

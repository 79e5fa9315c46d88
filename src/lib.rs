//! sente-mcts: a neural-network-guided MCTS engine core for Go.
//!
//! The heart of the crate is [`search::Search`], a concurrent Monte Carlo
//! Tree Search coordinator: parallel workers descend one shared tree under
//! virtual loss, expand leaves through a policy/value [`eval::Evaluator`],
//! and the driver enforces time, playout and visit budgets before choosing
//! a move with pass- and resign-aware selection.
//!
//! ## Modules
//!
//! - [`game`] - Board, rules, superko history and position hashing
//! - [`node`] - Shared tree nodes with lock-free statistics
//! - [`ucb`] - PUCT child scoring with virtual loss
//! - [`search`] - The search driver: simulations, workers, think/ponder
//! - [`transposition_table`] - Statistics aliasing across transpositions
//! - [`time_control`] - Clocks and per-move budgets
//! - [`eval`] - Network evaluation interface
//! - [`training`] - Self-play sample collection
//! - [`config`] - Runtime options
//!
//! ## Example
//!
//! ```
//! use sente_mcts::config::SearchOptions;
//! use sente_mcts::eval::UniformEvaluator;
//! use sente_mcts::game::{Color, GameState};
//! use sente_mcts::search::{Search, NORMAL};
//! use sente_mcts::transposition_table::TranspositionTable;
//! use std::sync::Arc;
//!
//! let state = GameState::new(9, 7.5);
//! let opts = SearchOptions {
//!     max_playouts: 100,
//!     quiet: true,
//!     ..SearchOptions::default()
//! };
//! let mut search = Search::new(
//!     state.clone(),
//!     Arc::new(UniformEvaluator),
//!     Arc::new(TranspositionTable::new()),
//!     opts,
//! );
//! let best = search.think(Color::Black, &state, NORMAL);
//! println!("best move: {}", state.move_to_text(best));
//! ```

pub mod config;
pub mod eval;
pub mod game;
pub mod node;
pub mod search;
pub mod time_control;
pub mod training;
pub mod transposition_table;
pub mod ucb;

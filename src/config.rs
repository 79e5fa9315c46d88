//! Runtime search configuration.
//!
//! Options are read-only while a search is in flight; the driver copies
//! what it needs before spawning workers.

use serde::{Deserialize, Serialize};

/// Engine configuration, stable for the duration of one search.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Cap on valid simulations. 0 means unlimited.
    pub max_playouts: u32,
    /// Cap on root visits. 0 means unlimited.
    pub max_visits: u32,
    /// Worker count, driver included. Minimum 1.
    pub num_threads: usize,
    /// Resign threshold in percent. Negative selects the default (10%),
    /// 0 disables resignation entirely.
    pub resign_pct: i32,
    /// Choose the move proportionally to visits for this many opening moves.
    pub random_cnt: u32,
    /// Mix Dirichlet noise into the root priors (self-play exploration).
    pub noise: bool,
    /// Disable the pass-sanity heuristics (pure self-play).
    pub dumbpass: bool,
    /// Suppress stats and analysis output.
    pub quiet: bool,
    /// PUCT exploration constant.
    pub c_puct: f32,
    /// Fixed RNG seed for reproducible searches.
    pub seed: Option<u64>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_playouts: 0,
            max_visits: 0,
            num_threads: 1,
            resign_pct: -1,
            random_cnt: 0,
            noise: false,
            dumbpass: false,
            quiet: false,
            c_puct: 0.8,
            seed: None,
        }
    }
}

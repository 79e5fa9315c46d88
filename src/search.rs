//! The concurrent search driver.
//!
//! One foreground thread plus `num_threads - 1` scoped workers descend the
//! shared tree under virtual loss. Each simulation clones the reference
//! position and recurses with its private copy; node statistics are backed
//! up through lock-free atomics. The driver stops the search on whichever
//! fires first: per-move deadline, playout cap, visit cap, or an external
//! clear of the running flag.
//!
//! Structural tree work (sorting, noise, superko pruning, rerooting) only
//! happens through `&mut self`, which the borrow checker makes unreachable
//! until every worker has been joined.

use crate::config::SearchOptions;
use crate::eval::Evaluator;
use crate::game::{Color, GameState, Vertex, PASS, RESIGN};
use crate::node::UCTNode;
use crate::training::TrainingBuffer;
use crate::transposition_table::TranspositionTable;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Hard cap on live tree vertices. Expansion beyond it degrades to leaf
/// evaluation instead of growing the tree.
pub const MAX_TREE_SIZE: usize = 10_000_000;

/// Dirichlet noise parameters for root exploration (self-play).
const NOISE_EPSILON: f32 = 0.25;
const NOISE_ALPHA: f32 = 0.03;

/// Emit an analysis line at most this often, centiseconds.
const ANALYSIS_INTERVAL_CENTIS: i32 = 250;

/// Pass-behavior flags for [`Search::get_best_move`]. OR-combinable.
pub type PassFlag = u32;
pub const NORMAL: PassFlag = 0;
pub const NOPASS: PassFlag = 1;
pub const NORESIGN: PassFlag = 2;

/// Outcome of one simulation: an evaluation from Black's perspective, or
/// invalid when the descent hit a dead end (superko child, expansion race).
#[derive(Clone, Copy, Debug, Default)]
pub struct SearchResult {
    eval: Option<f32>,
}

impl SearchResult {
    /// A freshly evaluated leaf.
    pub fn from_eval(eval: f32) -> Self {
        Self { eval: Some(eval) }
    }

    /// A terminal double-pass position, mapped onto {0, 0.5, 1}.
    pub fn from_score(score: f32) -> Self {
        let eval = if score > 0.0 {
            1.0
        } else if score < 0.0 {
            0.0
        } else {
            0.5
        };
        Self { eval: Some(eval) }
    }

    #[inline]
    pub fn valid(&self) -> bool {
        self.eval.is_some()
    }

    #[inline]
    pub fn eval(&self) -> Option<f32> {
        self.eval
    }
}

/// The search coordinator: owns the root, drives workers, chooses the move.
pub struct Search {
    root: UCTNode,
    rootstate: GameState,
    evaluator: Arc<dyn Evaluator>,
    tt: Arc<TranspositionTable>,
    opts: SearchOptions,
    run: Arc<AtomicBool>,
    playouts: AtomicU32,
    nodes: AtomicUsize,
    max_playouts: u32,
    max_visits: u32,
    rng: StdRng,
    training: TrainingBuffer,
}

impl Search {
    pub fn new(
        rootstate: GameState,
        evaluator: Arc<dyn Evaluator>,
        tt: Arc<TranspositionTable>,
        opts: SearchOptions,
    ) -> Self {
        let rng = match opts.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut search = Self {
            root: UCTNode::default(),
            rootstate,
            evaluator,
            tt,
            run: Arc::new(AtomicBool::new(false)),
            playouts: AtomicU32::new(0),
            nodes: AtomicUsize::new(1),
            max_playouts: u32::MAX,
            max_visits: u32::MAX,
            rng,
            training: TrainingBuffer::new(),
            opts,
        };
        search.set_playout_limit(search.opts.max_playouts);
        search.set_visit_limit(search.opts.max_visits);
        search
    }

    /// Cap on valid simulations. 0 means unlimited.
    pub fn set_playout_limit(&mut self, playouts: u32) {
        self.max_playouts = if playouts == 0 { u32::MAX } else { playouts };
    }

    /// Cap on root visits. 0 means unlimited.
    pub fn set_visit_limit(&mut self, visits: u32) {
        self.max_visits = if visits == 0 { u32::MAX } else { visits };
    }

    #[inline]
    pub fn max_playouts(&self) -> u32 {
        self.max_playouts
    }

    #[inline]
    pub fn max_visits(&self) -> u32 {
        self.max_visits
    }

    #[inline]
    pub fn playouts(&self) -> u32 {
        self.playouts.load(Ordering::Relaxed)
    }

    /// Live tree vertices, upper bound.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn root(&self) -> &UCTNode {
        &self.root
    }

    #[inline]
    pub fn root_state(&self) -> &GameState {
        &self.rootstate
    }

    #[inline]
    pub fn options(&self) -> &SearchOptions {
        &self.opts
    }

    #[inline]
    pub fn training(&self) -> &TrainingBuffer {
        &self.training
    }

    #[inline]
    pub fn training_mut(&mut self) -> &mut TrainingBuffer {
        &mut self.training
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.run.load(Ordering::Relaxed)
    }

    /// Handle for external interrupts: storing `false` makes every worker
    /// and the driver wind down after their in-flight simulation.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.run)
    }

    #[inline]
    pub fn playout_or_visit_limit_reached(&self) -> bool {
        self.playouts() >= self.max_playouts || self.root.get_visits() >= self.max_visits
    }

    fn increment_playouts(&self) {
        self.playouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Adopt a new reference position, rerooting the tree when komi or the
    /// position changed; playouts always restart from zero.
    pub fn set_gamestate(&mut self, g: &GameState) {
        self.playouts.store(0, Ordering::Relaxed);
        if self.rootstate.komi() != g.komi() || self.rootstate.board_hash() != g.board_hash() {
            let root = std::mem::take(&mut self.root);
            self.root = root.find_new_root_from_state(&self.rootstate, g);
        }
        self.rootstate = g.clone();
        self.nodes.store(self.root.count_nodes(), Ordering::Relaxed);
    }

    /// One simulation from `node`, recursing on a private `state` copy.
    ///
    /// Applies exactly one virtual loss and one undo on `node` regardless of
    /// the return path. A superko descent invalidates the offending child
    /// and unwinds as invalid; invalid results back up nothing and are not
    /// counted as playouts.
    pub fn play_simulation(&self, state: &mut GameState, node: &UCTNode) -> SearchResult {
        let color = state.side_to_move();
        let hash = state.board_hash();
        let komi = state.komi();

        let mut result = SearchResult::default();

        self.tt.sync(hash, komi, node);
        node.virtual_loss();

        if !node.has_children() {
            if state.passes() >= 2 {
                result = SearchResult::from_score(state.final_score());
            } else if self.nodes.load(Ordering::Relaxed) < MAX_TREE_SIZE {
                if let Some(eval) =
                    node.create_children(&self.nodes, state, self.evaluator.as_ref())
                {
                    result = SearchResult::from_eval(eval);
                }
            } else {
                let eval = node.eval_state(state, self.evaluator.as_ref());
                result = SearchResult::from_eval(eval);
            }
        }

        if node.has_children() && !result.valid() {
            if let Some(next) = node.uct_select_child(color, self.opts.c_puct) {
                let mv = next.get_move();

                if mv != PASS {
                    state.play_move(mv);
                    if !state.superko() {
                        result = self.play_simulation(state, next);
                    } else {
                        next.invalidate();
                    }
                } else {
                    state.play_pass();
                    result = self.play_simulation(state, next);
                }
            }
        }

        if let Some(eval) = result.eval() {
            node.update(eval);
        }
        node.virtual_loss_undo();
        self.tt.update(hash, komi, node);

        result
    }

    /// Background worker: simulate from the root until the running flag
    /// clears or a budget predicate fires.
    fn worker_loop(&self) {
        loop {
            let mut scratch = self.rootstate.clone();
            let result = self.play_simulation(&mut scratch, &self.root);
            if result.valid() {
                self.increment_playouts();
            }
            if !self.is_running() || self.playout_or_visit_limit_reached() {
                break;
            }
        }
    }

    /// Resign unless the score, game phase or configuration forbids it.
    pub fn should_resign(&self, passflag: PassFlag, bestscore: f32) -> bool {
        if passflag & NORESIGN != 0 {
            // resign not allowed
            return false;
        }
        if self.opts.resign_pct == 0 {
            // resign not allowed
            return false;
        }

        let visits = self.root.get_visits();
        if visits < 500.min(self.max_playouts) {
            // low visits
            return false;
        }

        let board_squares = self.rootstate.boardsize() * self.rootstate.boardsize();
        let move_threshold = board_squares / 4;
        let movenum = self.rootstate.movenum() as usize;
        if movenum <= move_threshold {
            // too early in game to resign
            return false;
        }

        let color = self.rootstate.side_to_move();

        let is_default_resign = self.opts.resign_pct < 0;
        let resign_threshold =
            0.01 * (if is_default_resign { 10 } else { self.opts.resign_pct }) as f32;
        if bestscore > resign_threshold {
            return false;
        }

        if self.rootstate.handicap() > 0 && color == Color::White && is_default_resign {
            let handicap_resign_threshold =
                resign_threshold / (1 + self.rootstate.handicap()) as f32;

            // Blend the thresholds over the first part of the game, since
            // the weaker side may still squander its stones.
            let blend_ratio = (movenum as f32 / (0.6 * board_squares as f32)).min(1.0);
            let blended_resign_threshold = blend_ratio * resign_threshold
                + (1.0 - blend_ratio) * handicap_resign_threshold;
            if bestscore > blended_resign_threshold {
                return false;
            }
        }

        true
    }

    /// Pick the move to play from the finished search, applying the
    /// pass/no-pass/resign policy selected by `passflag`.
    pub fn get_best_move(&mut self, passflag: PassFlag) -> Vertex {
        let color = self.rootstate.side_to_move();

        // Make sure best is first.
        self.root.sort_children(color);

        // Early game: randomize the top move proportionally to visits.
        if self.rootstate.movenum() < self.opts.random_cnt {
            let (root, rng) = (&mut self.root, &mut self.rng);
            root.randomize_first_proportionally(rng);
        }

        let Some(first_child) = self.root.get_first_child() else {
            return PASS;
        };
        let mut bestmove = first_child.get_move();

        // Do we have statistics on the moves?
        if let Some(first_child) = self.root.get_first_child() {
            if first_child.first_visit() {
                return bestmove;
            }
        }

        let mut bestscore = first_child.get_eval(color);

        if passflag & NOPASS != 0 {
            // Were we going to pass?
            if bestmove == PASS {
                if let Some(nopass) = self.root.get_nopass_child(&self.rootstate) {
                    self.log("Preferring not to pass.");
                    bestmove = nopass.get_move();
                    bestscore = if nopass.first_visit() {
                        1.0
                    } else {
                        nopass.get_eval(color)
                    };
                } else {
                    self.log("Pass is the only acceptable move.");
                }
            }
        } else if !self.opts.dumbpass && bestmove == PASS {
            // Passing is on top. Check with a full Trump-Taylor count,
            // dead stones as placed, whether passing ends the game at a
            // loss; if so clean up instead.
            let score = self.rootstate.final_score();
            if (score > 0.0 && color == Color::White) || (score < 0.0 && color == Color::Black) {
                self.log("Passing loses :-(");
                if let Some(nopass) = self.root.get_nopass_child(&self.rootstate) {
                    self.log("Avoiding pass because it loses.");
                    bestmove = nopass.get_move();
                    bestscore = if nopass.first_visit() {
                        1.0
                    } else {
                        nopass.get_eval(color)
                    };
                } else {
                    self.log("No alternative to passing.");
                }
            } else {
                self.log("Passing wins :-)");
            }
        } else if !self.opts.dumbpass && self.rootstate.last_move() == Some(PASS) {
            // The opponent passed and the search did not choose to answer
            // in kind. Pass out when that already wins.
            let score = self.rootstate.final_score();
            if (score > 0.0 && color == Color::White) || (score < 0.0 && color == Color::Black) {
                self.log("Passing loses, I'll play on.");
            } else {
                self.log("Passing wins, I'll pass out.");
                bestmove = PASS;
            }
        }

        // If we aren't passing, should we consider resigning?
        if bestmove != PASS && self.should_resign(passflag, bestscore) {
            if !self.opts.quiet {
                info!("Eval ({:.2}%) looks bad. Resigning.", 100.0 * bestscore);
            }
            bestmove = RESIGN;
        }

        bestmove
    }

    /// Principal variation from `node`, as move text. Stops at the first
    /// unexpanded or unvisited best child.
    pub fn get_pv(&self, state: &mut GameState, node: &UCTNode) -> String {
        if !node.has_children() {
            return String::new();
        }

        let Some(best_child) = node.get_best_root_child(state.side_to_move()) else {
            return String::new();
        };
        if best_child.first_visit() {
            return String::new();
        }

        let best_move = best_child.get_move();
        let mut res = state.move_to_text(best_move);
        state.play_move(best_move);

        let next = self.get_pv(state, best_child);
        if !next.is_empty() {
            res.push(' ');
            res.push_str(&next);
        }
        res
    }

    /// Log per-move statistics for the sorted root children. At least two
    /// moves are always listed, so a single-candidate search stays
    /// explainable.
    pub fn dump_stats(&mut self) {
        if self.opts.quiet || !self.root.has_children() {
            return;
        }

        let color = self.rootstate.side_to_move();

        // Sort children, put best move on top.
        self.root.sort_children(color);

        let Some(first_child) = self.root.get_first_child() else {
            return;
        };
        if first_child.first_visit() {
            return;
        }

        let mut movecount = 0;
        for child in self.root.get_children() {
            movecount += 1;
            if movecount > 2 && child.get_visits() == 0 {
                break;
            }

            let tmp = self.rootstate.move_to_text(child.get_move());
            let mut pvstring = tmp.clone();

            let mut tmpstate = self.rootstate.clone();
            tmpstate.play_move(child.get_move());
            let continuation = self.get_pv(&mut tmpstate, child);
            if !continuation.is_empty() {
                pvstring.push(' ');
                pvstring.push_str(&continuation);
            }

            info!(
                "{:>4} -> {:7} (V: {:5.2}%) (N: {:5.2}%) PV: {}",
                tmp,
                child.get_visits(),
                child.get_eval(color) * 100.0,
                child.get_score() * 100.0,
                pvstring
            );
        }
    }

    /// Periodic progress line: playouts, root winrate, PV.
    pub fn dump_analysis(&self, playouts: u32) {
        if self.opts.quiet {
            return;
        }

        let mut tempstate = self.rootstate.clone();
        let color = tempstate.side_to_move();

        let pvstring = self.get_pv(&mut tempstate, &self.root);
        let winrate = 100.0 * self.root.get_eval(color);
        info!("Playouts: {}, Win: {:5.2}%, PV: {}", playouts, winrate, pvstring);
    }

    /// Search the position and play the chosen move on the reference state.
    ///
    /// Reuses the existing tree when it matches, runs the worker pool until
    /// the per-move time budget or a cap fires, then reroots onto the chosen
    /// move and returns it.
    pub fn think(&mut self, color: Color, g: &GameState, passflag: PassFlag) -> Vertex {
        self.set_gamestate(g);

        // Start counting time for us.
        self.rootstate.start_clock(color);
        self.rootstate.set_to_move(color);

        let start = Instant::now();
        let boardsize = self.rootstate.boardsize();
        self.rootstate.time_control_mut().set_boardsize(boardsize);
        let time_for_move = self.rootstate.time_control().max_time_for_move(color);

        if !self.opts.quiet {
            info!("Thinking at most {:.1} seconds...", time_for_move as f32 / 100.0);
        }

        // Create a sorted list of legal moves, so something legal and decent
        // is playable even in time trouble.
        let root_eval = if !self.root.has_children() {
            self.root
                .create_children(&self.nodes, &self.rootstate, self.evaluator.as_ref())
                .unwrap_or(0.5)
        } else {
            self.root.get_eval(color)
        };
        self.root.kill_superkos(&self.rootstate);
        if self.opts.noise {
            let (root, rng) = (&mut self.root, &mut self.rng);
            root.dirichlet_noise(NOISE_EPSILON, NOISE_ALPHA, rng);
        }

        if !self.opts.quiet {
            info!(
                "NN eval={}",
                if color == Color::Black {
                    root_eval
                } else {
                    1.0 - root_eval
                }
            );
        }

        self.run.store(true, Ordering::Relaxed);
        let num_threads = self.opts.num_threads.max(1);
        {
            let this: &Search = &*self;
            thread::scope(|s| {
                for _ in 1..num_threads {
                    s.spawn(|| this.worker_loop());
                }

                let mut last_update = 0;
                loop {
                    let mut currstate = this.rootstate.clone();
                    let result = this.play_simulation(&mut currstate, &this.root);
                    if result.valid() {
                        this.increment_playouts();
                    }

                    let elapsed_centis = centis_since(start);

                    // Output some stats every few seconds.
                    if elapsed_centis - last_update > ANALYSIS_INTERVAL_CENTIS {
                        last_update = elapsed_centis;
                        this.dump_analysis(this.playouts());
                    }

                    let keeprunning = this.is_running()
                        && elapsed_centis < time_for_move
                        && !this.playout_or_visit_limit_reached();
                    if !keeprunning {
                        break;
                    }
                }

                // Stop the search; scope exit joins the workers.
                this.run.store(false, Ordering::Relaxed);
            });
        }

        self.rootstate.stop_clock(color);
        if !self.root.has_children() {
            return PASS;
        }

        self.dump_stats();
        self.training.record(&self.rootstate, &self.root);

        let elapsed_centis = centis_since(start);
        if elapsed_centis + 1 > 0 {
            if !self.opts.quiet {
                info!(
                    "{} visits, {} nodes, {} playouts, {} n/s",
                    self.root.get_visits(),
                    self.node_count(),
                    self.playouts(),
                    (self.playouts() as i64 * 100) / (elapsed_centis as i64 + 1)
                );
            }
        }

        let bestmove = self.get_best_move(passflag);
        self.rootstate.play_move(bestmove);
        self.root = std::mem::take(&mut self.root).find_new_root(bestmove);
        bestmove
    }

    /// Search the opponent's time: no deadline, no noise, no superko
    /// pruning, no training record, and the tree survives unrerooted. Runs
    /// until `input_pending` reports pending input or the running flag is
    /// cleared.
    pub fn ponder<F>(&mut self, g: &GameState, input_pending: F)
    where
        F: Fn() -> bool,
    {
        self.set_gamestate(g);

        self.run.store(true, Ordering::Relaxed);
        let num_threads = self.opts.num_threads.max(1);
        {
            let this: &Search = &*self;
            thread::scope(|s| {
                for _ in 1..num_threads {
                    s.spawn(|| this.worker_loop());
                }

                loop {
                    let mut currstate = this.rootstate.clone();
                    let result = this.play_simulation(&mut currstate, &this.root);
                    if result.valid() {
                        this.increment_playouts();
                    }
                    if input_pending() || !this.is_running() {
                        break;
                    }
                }

                this.run.store(false, Ordering::Relaxed);
            });
        }

        self.dump_stats();
        if !self.opts.quiet {
            info!("{} visits, {} nodes", self.root.get_visits(), self.node_count());
        }
    }

    fn log(&self, line: &str) {
        if !self.opts.quiet {
            info!("{}", line);
        }
    }
}

fn centis_since(start: Instant) -> i32 {
    (start.elapsed().as_millis() / 10) as i32
}

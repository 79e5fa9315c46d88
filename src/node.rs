//! Search tree nodes with lock-free statistics.
//!
//! The tree under the root is shared by all workers. Visit counts, value
//! sums and virtual losses are atomics updated without locks during descent
//! and backup; the child list is a one-shot initialization, so only the
//! first worker to reach a leaf expands it. Structural operations (sorting,
//! noise, rerooting) take `&mut self` and are therefore only reachable once
//! every worker has been joined.

use crate::eval::Evaluator;
use crate::game::{Color, GameState, Vertex, PASS};
use crate::ucb;
use rand_distr::{Dirichlet, Distribution};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;

/// Visit-equivalents one in-flight simulation adds to a node.
pub const VIRTUAL_LOSS_COUNT: u32 = 3;

/// Add a delta to an f64 stored as atomic bits.
fn atomic_add_f64(cell: &AtomicU64, delta: f64) {
    let mut current = cell.load(Ordering::Relaxed);
    loop {
        let updated = (f64::from_bits(current) + delta).to_bits();
        match cell.compare_exchange_weak(current, updated, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return,
            Err(observed) => current = observed,
        }
    }
}

/// One vertex of the shared search tree.
#[derive(Debug)]
pub struct UCTNode {
    mv: Vertex,
    /// Prior probability from the policy network.
    score: f32,
    /// Network value of the position this node's priors came from, used as
    /// first-play urgency for unvisited children. Black's perspective.
    net_eval: f32,
    visits: AtomicU32,
    /// Sum of backed-up evals from Black's perspective, as f64 bits.
    blackevals: AtomicU64,
    virtual_loss: AtomicU32,
    valid: AtomicBool,
    expanding: AtomicBool,
    children: OnceLock<Vec<UCTNode>>,
}

impl UCTNode {
    pub fn new(mv: Vertex, score: f32, net_eval: f32) -> Self {
        Self {
            mv,
            score,
            net_eval,
            visits: AtomicU32::new(0),
            blackevals: AtomicU64::new(0f64.to_bits()),
            virtual_loss: AtomicU32::new(0),
            valid: AtomicBool::new(true),
            expanding: AtomicBool::new(false),
            children: OnceLock::new(),
        }
    }

    #[inline]
    pub fn get_move(&self) -> Vertex {
        self.mv
    }

    /// Prior probability ("score") of this node's move.
    #[inline]
    pub fn get_score(&self) -> f32 {
        self.score
    }

    #[inline]
    pub fn get_visits(&self) -> u32 {
        self.visits.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn first_visit(&self) -> bool {
        self.get_visits() == 0
    }

    #[inline]
    pub fn get_virtual_loss(&self) -> u32 {
        self.virtual_loss.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn valid(&self) -> bool {
        self.valid.load(Ordering::Relaxed)
    }

    /// Mark this node unreachable (superko). Selection skips it afterwards.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Relaxed);
    }

    pub fn has_children(&self) -> bool {
        self.children.get().map_or(false, |c| !c.is_empty())
    }

    pub fn get_children(&self) -> &[UCTNode] {
        self.children.get().map_or(&[], |c| c.as_slice())
    }

    pub fn get_first_child(&self) -> Option<&UCTNode> {
        self.get_children().first()
    }

    /// Apply a virtual loss for the duration of one descent.
    pub fn virtual_loss(&self) {
        self.virtual_loss
            .fetch_add(VIRTUAL_LOSS_COUNT, Ordering::Relaxed);
    }

    /// Undo exactly one [`UCTNode::virtual_loss`].
    pub fn virtual_loss_undo(&self) {
        self.virtual_loss
            .fetch_sub(VIRTUAL_LOSS_COUNT, Ordering::Relaxed);
    }

    /// Back up one simulation result (Black's perspective).
    pub fn update(&self, eval: f32) {
        self.visits.fetch_add(1, Ordering::Relaxed);
        atomic_add_f64(&self.blackevals, eval as f64);
    }

    /// Overwrite the accumulated statistics. Transposition adoption only.
    pub fn set_stats(&self, visits: u32, blackevals: f64) {
        self.visits.store(visits, Ordering::Relaxed);
        self.blackevals
            .store(blackevals.to_bits(), Ordering::Relaxed);
    }

    /// Accumulated Black-perspective value sum.
    pub fn get_blackevals(&self) -> f64 {
        f64::from_bits(self.blackevals.load(Ordering::Relaxed))
    }

    /// Winrate from `color`'s perspective.
    ///
    /// In-flight virtual losses count as losses for the asking color, so
    /// concurrent selectors spread out. An unvisited node reports its
    /// first-play urgency (the network value it inherited at creation).
    pub fn get_eval(&self, color: Color) -> f32 {
        let visits = self.get_visits();
        let black_sum = self.get_blackevals() as f32;
        let wins = match color {
            Color::Black => black_sum,
            Color::White => visits as f32 - black_sum,
        };
        let fpu = match color {
            Color::Black => self.net_eval,
            Color::White => 1.0 - self.net_eval,
        };
        ucb::virtual_loss_eval(wins, visits, self.get_virtual_loss(), fpu)
    }

    /// Expand this leaf: evaluate the position, attach one child per legal
    /// move (pass included) with renormalized priors, and grow `node_count`.
    ///
    /// One-shot: exactly one caller expands a given node. Losing racers get
    /// `None` and their simulation unwinds as invalid; the next descent sees
    /// the children. Returns the network value from Black's perspective.
    pub fn create_children(
        &self,
        node_count: &AtomicUsize,
        state: &GameState,
        evaluator: &dyn Evaluator,
    ) -> Option<f32> {
        if self.children.get().is_some() {
            return None;
        }
        if self.expanding.swap(true, Ordering::Acquire) {
            return None;
        }

        let output = evaluator.evaluate(state);
        let eval = output.value;
        let color = state.side_to_move();
        let board_vertices = state.boardsize() * state.boardsize();

        let mut moves: Vec<(Vertex, f32)> = Vec::new();
        for vertex in 0..board_vertices as Vertex {
            if state.is_legal(vertex, color) {
                moves.push((vertex, output.policy[vertex as usize]));
            }
        }
        moves.push((PASS, output.policy[board_vertices]));

        let prior_sum: f32 = moves.iter().map(|&(_, p)| p).sum();
        let uniform = 1.0 / moves.len() as f32;
        let mut children = Vec::with_capacity(moves.len());
        for (vertex, prior) in moves {
            let prior = if prior_sum > 0.0 {
                prior / prior_sum
            } else {
                uniform
            };
            children.push(UCTNode::new(vertex, prior, eval));
        }

        node_count.fetch_add(children.len(), Ordering::Relaxed);
        self.children
            .set(children)
            .expect("children created twice");
        Some(eval)
    }

    /// Evaluate the position without growing the tree (tree-size cap hit).
    pub fn eval_state(&self, state: &GameState, evaluator: &dyn Evaluator) -> f32 {
        evaluator.evaluate(state).value
    }

    /// Pick the next child by PUCT for `color`, skipping invalidated ones.
    pub fn uct_select_child(&self, color: Color, c_puct: f32) -> Option<&UCTNode> {
        let children = self.children.get()?;
        let parent_visits = self.get_visits();

        let mut best: Option<&UCTNode> = None;
        let mut best_score = f32::NEG_INFINITY;
        for child in children {
            if !child.valid() {
                continue;
            }
            let q = child.get_eval(color);
            let effective_visits = child.get_visits() + child.get_virtual_loss();
            let score =
                ucb::puct_score(parent_visits, child.get_score(), effective_visits, q, c_puct);
            if score > best_score {
                best_score = score;
                best = Some(child);
            }
        }
        best
    }

    /// Sort children best-first for `color`: visits, then winrate, then
    /// prior. Requires exclusive access, i.e. all workers joined.
    pub fn sort_children(&mut self, color: Color) {
        let Some(children) = self.children.get_mut() else {
            return;
        };
        children.sort_by(|a, b| {
            b.get_visits()
                .cmp(&a.get_visits())
                .then_with(|| {
                    b.get_eval(color)
                        .partial_cmp(&a.get_eval(color))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| {
                    b.get_score()
                        .partial_cmp(&a.get_score())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });
    }

    /// Swap a visit-proportionally sampled child into first position.
    /// Early-game move diversity for self-play.
    pub fn randomize_first_proportionally<R: rand::Rng>(&mut self, rng: &mut R) {
        let Some(children) = self.children.get_mut() else {
            return;
        };
        let total: u32 = children.iter().map(|c| c.get_visits()).sum();
        if total == 0 {
            return;
        }

        // Walk the cumulative visit counts until the drawn index falls
        // inside a child's share.
        let mut remaining = rng.gen_range(0..total);
        let mut pick = children.len() - 1;
        for (i, child) in children.iter().enumerate() {
            let visits = child.get_visits();
            if remaining < visits {
                pick = i;
                break;
            }
            remaining -= visits;
        }
        children.swap(0, pick);
    }

    /// Mix Dirichlet noise into the children's priors.
    pub fn dirichlet_noise<R: rand::Rng>(&mut self, epsilon: f32, alpha: f32, rng: &mut R) {
        let Some(children) = self.children.get_mut() else {
            return;
        };
        if children.len() < 2 || epsilon <= 0.0 {
            return;
        }

        let dirichlet = Dirichlet::new_with_size(alpha, children.len()).unwrap();
        let noise: Vec<f32> = dirichlet.sample(rng);
        for (child, n) in children.iter_mut().zip(noise) {
            child.score = (1.0 - epsilon) * child.score + epsilon * n;
        }
    }

    /// Invalidate root children whose move would repeat an earlier position.
    pub fn kill_superkos(&self, state: &GameState) {
        for child in self.get_children() {
            let mv = child.get_move();
            if mv == PASS {
                continue;
            }
            let mut scratch = state.clone();
            scratch.play_move(mv);
            if scratch.superko() {
                child.invalidate();
            }
        }
    }

    /// Best root child for `color`: most visits, winrate as tiebreak.
    pub fn get_best_root_child(&self, color: Color) -> Option<&UCTNode> {
        self.get_children()
            .iter()
            .filter(|c| c.valid())
            .max_by(|a, b| {
                a.get_visits().cmp(&b.get_visits()).then_with(|| {
                    a.get_eval(color)
                        .partial_cmp(&b.get_eval(color))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
            })
    }

    /// Highest-preference child that does not pass and does not fill one of
    /// our own eyes. None when passing is the only acceptable move.
    pub fn get_nopass_child(&self, state: &GameState) -> Option<&UCTNode> {
        let color = state.side_to_move();
        self.get_children().iter().find(|c| {
            c.valid()
                && c.get_move() != PASS
                && !state.board().is_eye(c.get_move(), color)
        })
    }

    /// Count the vertices of this subtree, itself included.
    pub fn count_nodes(&self) -> usize {
        1 + self
            .get_children()
            .iter()
            .map(UCTNode::count_nodes)
            .sum::<usize>()
    }

    /// Promote the child reached by `mv` to root, releasing its siblings
    /// and their subtrees. A fresh sentinel root when no such child exists.
    pub fn find_new_root(mut self, mv: Vertex) -> UCTNode {
        if let Some(mut children) = self.children.take() {
            if let Some(pos) = children
                .iter()
                .position(|c| c.get_move() == mv && c.valid())
            {
                return children.swap_remove(pos);
            }
        }
        UCTNode::default()
    }

    /// Reroot for a new reference position: when `new_state` extends
    /// `old_state`'s move history, walk down the extra moves; otherwise the
    /// tree is stale and a fresh root is returned.
    pub fn find_new_root_from_state(self, old_state: &GameState, new_state: &GameState) -> UCTNode {
        let old_history = old_state.move_history();
        let new_history = new_state.move_history();
        if new_history.len() >= old_history.len()
            && new_history[..old_history.len()] == *old_history
        {
            let mut root = self;
            for &mv in &new_history[old_history.len()..] {
                root = root.find_new_root(mv);
            }
            root
        } else {
            UCTNode::default()
        }
    }
}

impl Default for UCTNode {
    /// The engine-start sentinel: a PASS root with zero prior and neutral
    /// value.
    fn default() -> Self {
        UCTNode::new(PASS, 0.0, 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::UniformEvaluator;

    fn expanded_node(state: &GameState) -> (UCTNode, AtomicUsize) {
        let node = UCTNode::default();
        let count = AtomicUsize::new(1);
        node.create_children(&count, state, &UniformEvaluator)
            .unwrap();
        (node, count)
    }

    #[test]
    fn test_update_and_eval_perspective() {
        let node = UCTNode::new(PASS, 0.5, 0.5);
        node.update(1.0);
        node.update(0.0);
        node.update(1.0);
        assert_eq!(node.get_visits(), 3);
        assert!((node.get_eval(Color::Black) - 2.0 / 3.0).abs() < 1e-6);
        assert!((node.get_eval(Color::White) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_unvisited_eval_is_fpu() {
        let node = UCTNode::new(PASS, 0.5, 0.7);
        assert!((node.get_eval(Color::Black) - 0.7).abs() < 1e-6);
        assert!((node.get_eval(Color::White) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_virtual_loss_round_trip() {
        let node = UCTNode::new(PASS, 0.5, 0.5);
        node.update(1.0);
        let clean = node.get_eval(Color::Black);
        node.virtual_loss();
        assert_eq!(node.get_virtual_loss(), VIRTUAL_LOSS_COUNT);
        assert!(node.get_eval(Color::Black) < clean);
        node.virtual_loss_undo();
        assert_eq!(node.get_virtual_loss(), 0);
        assert!((node.get_eval(Color::Black) - clean).abs() < 1e-6);
    }

    #[test]
    fn test_create_children_once() {
        let state = GameState::new(5, 7.5);
        let node = UCTNode::default();
        let count = AtomicUsize::new(1);

        let eval = node.create_children(&count, &state, &UniformEvaluator);
        assert_eq!(eval, Some(0.5));
        // 25 board moves plus pass.
        assert_eq!(node.get_children().len(), 26);
        assert_eq!(count.load(Ordering::Relaxed), 27);

        // A second expansion attempt is refused and allocates nothing.
        assert_eq!(node.create_children(&count, &state, &UniformEvaluator), None);
        assert_eq!(count.load(Ordering::Relaxed), 27);
    }

    #[test]
    fn test_children_priors_renormalized() {
        let state = GameState::new(5, 7.5);
        let (node, _) = expanded_node(&state);
        let sum: f32 = node.get_children().iter().map(|c| c.get_score()).sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_select_prefers_high_prior_then_backs_off() {
        let state = GameState::new(5, 7.5);
        let (node, _) = expanded_node(&state);
        node.update(0.5);

        let first = node.uct_select_child(Color::Black, 0.8).unwrap();
        let first_move = first.get_move();
        // Virtual loss on the selected child steers the next selector away.
        first.virtual_loss();
        let second = node.uct_select_child(Color::Black, 0.8).unwrap();
        assert_ne!(second.get_move(), first_move);
        first.virtual_loss_undo();
    }

    #[test]
    fn test_select_skips_invalidated() {
        let state = GameState::new(5, 7.5);
        let (node, _) = expanded_node(&state);
        node.update(0.5);

        let pick = node.uct_select_child(Color::Black, 0.8).unwrap();
        pick.update(1.0);
        pick.invalidate();
        let mv = pick.get_move();
        let next = node.uct_select_child(Color::Black, 0.8).unwrap();
        assert_ne!(next.get_move(), mv);
    }

    #[test]
    fn test_sort_children_by_visits() {
        let state = GameState::new(5, 7.5);
        let (mut node, _) = expanded_node(&state);
        {
            let children = node.get_children();
            children[3].update(1.0);
            children[3].update(1.0);
            children[7].update(0.0);
        }
        let busy = node.get_children()[3].get_move();
        node.sort_children(Color::Black);
        assert_eq!(node.get_first_child().unwrap().get_move(), busy);
        assert_eq!(node.get_first_child().unwrap().get_visits(), 2);
    }

    #[test]
    fn test_randomize_first_proportionally() {
        use rand::SeedableRng;
        let state = GameState::new(5, 7.5);
        let (mut node, _) = expanded_node(&state);
        // Only one child has visits, so it must end up first.
        let target = node.get_children()[9].get_move();
        node.get_children()[9].update(1.0);
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        node.randomize_first_proportionally(&mut rng);
        assert_eq!(node.get_first_child().unwrap().get_move(), target);
    }

    #[test]
    fn test_dirichlet_noise_keeps_distribution() {
        use rand::SeedableRng;
        let state = GameState::new(5, 7.5);
        let (mut node, _) = expanded_node(&state);
        let before: Vec<f32> = node.get_children().iter().map(|c| c.get_score()).collect();
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        node.dirichlet_noise(0.25, 0.03, &mut rng);
        let after: Vec<f32> = node.get_children().iter().map(|c| c.get_score()).collect();
        let sum: f32 = after.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert_ne!(before, after);
    }

    #[test]
    fn test_find_new_root_keeps_subtree() {
        let state = GameState::new(5, 7.5);
        let (node, _) = expanded_node(&state);
        let mv = node.get_children()[4].get_move();
        node.get_children()[4].update(1.0);

        let root = node.find_new_root(mv);
        assert_eq!(root.get_move(), mv);
        assert_eq!(root.get_visits(), 1);

        // Rerooting onto an unknown move yields the sentinel.
        let fresh = root.find_new_root(1234);
        assert_eq!(fresh.get_move(), PASS);
        assert_eq!(fresh.get_visits(), 0);
    }

    #[test]
    fn test_find_new_root_from_state_walks_history() {
        let state = GameState::new(5, 7.5);
        let (node, count) = expanded_node(&state);

        let mv = node.get_children()[2].get_move();
        let mut advanced = state.clone();
        advanced.play_move(mv);
        node.get_children()[2]
            .create_children(&count, &advanced, &UniformEvaluator)
            .unwrap();

        let root = node.find_new_root_from_state(&state, &advanced);
        assert_eq!(root.get_move(), mv);
        assert!(root.has_children());

        // A diverging history falls back to a fresh root.
        let mut other = GameState::new(5, 7.5);
        other.play_move(0);
        let stale = root.find_new_root_from_state(&advanced, &other);
        assert_eq!(stale.get_move(), PASS);
        assert!(!stale.has_children());
    }

    #[test]
    fn test_count_nodes() {
        let state = GameState::new(5, 7.5);
        let (node, _) = expanded_node(&state);
        assert_eq!(node.count_nodes(), 27);
    }

    #[test]
    fn test_nopass_child_skips_pass_and_eyes() {
        let mut state = GameState::new(5, 7.5);
        // Give Black an eye at A1.
        for text in ["A2", "B1", "B2"] {
            let mv = state.board().text_to_vertex(text).unwrap();
            state.play_move(mv);
            state.play_pass();
        }
        let (mut node, _) = expanded_node(&state);
        node.sort_children(Color::Black);
        let nopass = node.get_nopass_child(&state).unwrap();
        assert_ne!(nopass.get_move(), PASS);
        let eye = state.board().text_to_vertex("A1").unwrap();
        assert_ne!(nopass.get_move(), eye);
    }
}

//! PUCT score calculation for child selection.
//!
//! Implements the AlphaZero selection formula:
//! UCB(s,a) = Q(s,a) + c_puct * P(s,a) * sqrt(N(s)) / (1 + N(s,a))
//!
//! Q is a winrate in [0, 1] from the perspective of the color choosing, and
//! in-flight simulations (virtual losses) count as losses for whichever
//! color asks, steering concurrent workers apart.

/// PUCT score of one child.
///
/// # Arguments
/// * `parent_visits` - Total visits to the parent N(s)
/// * `prior` - Prior probability P(s,a) from the policy network
/// * `child_visits` - Child visits N(s,a), virtual losses included
/// * `q` - Child winrate for the selecting color
/// * `c_puct` - Exploration constant
#[inline]
pub fn puct_score(parent_visits: u32, prior: f32, child_visits: u32, q: f32, c_puct: f32) -> f32 {
    let exploration =
        c_puct * prior * (parent_visits as f32).sqrt() / (1.0 + child_visits as f32);
    q + exploration
}

/// Winrate for the selecting color under virtual loss.
///
/// `wins` is the accumulated win total for that color over `visits` real
/// visits. Each in-flight simulation adds a visit and no win, so the
/// penalized rate steers other workers elsewhere until backup. Unvisited
/// children fall back to `first_play_urgency`.
#[inline]
pub fn virtual_loss_eval(wins: f32, visits: u32, virtual_loss: u32, first_play_urgency: f32) -> f32 {
    let effective = visits + virtual_loss;
    if effective == 0 {
        first_play_urgency
    } else {
        wins / effective as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unvisited_child_uses_fpu() {
        let q = virtual_loss_eval(0.0, 0, 0, 0.42);
        assert!((q - 0.42).abs() < 1e-6);
        // Prior drives the exploration term: sqrt(100) * 0.5 / 1 = 5.0
        let score = puct_score(100, 0.5, 0, q, 1.0);
        assert!((score - 5.42).abs() < 1e-5);
    }

    #[test]
    fn test_exploration_decreases_with_visits() {
        let low = puct_score(100, 0.5, 1, 0.5, 1.0);
        let high = puct_score(100, 0.5, 50, 0.5, 1.0);
        assert!(low > high);
    }

    #[test]
    fn test_virtual_loss_reduces_eval() {
        let clean = virtual_loss_eval(5.0, 10, 0, 0.5);
        let loaded = virtual_loss_eval(5.0, 10, 3, 0.5);
        assert!((clean - 0.5).abs() < 1e-6);
        assert!(loaded < clean);
        // 5 wins over 13 effective visits.
        assert!((loaded - 5.0 / 13.0).abs() < 1e-6);
    }

    #[test]
    fn test_virtual_loss_alone_is_a_loss() {
        // An unvisited child with in-flight simulations scores as losing.
        let q = virtual_loss_eval(0.0, 0, 2, 0.9);
        assert_eq!(q, 0.0);
    }
}

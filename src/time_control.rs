//! Per-move time budgets and game clocks.
//!
//! All durations are centiseconds. Each color has a main-time clock and an
//! optional Canadian byo-yomi (N stones in T). The search driver asks for a
//! single per-move budget and charges elapsed time back through
//! [`TimeControl::start`] / [`TimeControl::stop`].

use crate::game::Color;
use std::time::Instant;

/// Subtracted from every budget to absorb scheduling and I/O latency.
const LAG_BUFFER_CENTIS: i32 = 10;

/// Smallest budget ever handed out.
const MIN_TIME_CENTIS: i32 = 10;

/// Game clock state for both colors.
#[derive(Clone, Debug)]
pub struct TimeControl {
    boardsize: usize,
    byo_time: i32,
    byo_stones: i32,
    remaining: [i32; 2],
    stones_left: [i32; 2],
    in_byo: [bool; 2],
    started: [Option<Instant>; 2],
}

impl TimeControl {
    /// Create clocks with `main_time` centiseconds per side and an optional
    /// Canadian byo-yomi of `byo_stones` stones in `byo_time` centiseconds
    /// (0 stones disables overtime).
    pub fn new(main_time: i32, byo_time: i32, byo_stones: i32) -> Self {
        Self {
            boardsize: 19,
            byo_time,
            byo_stones,
            remaining: [main_time; 2],
            stones_left: [byo_stones; 2],
            in_byo: [false; 2],
            started: [None; 2],
        }
    }

    pub fn set_boardsize(&mut self, size: usize) {
        self.boardsize = size;
    }

    /// Remaining time on a color's clock, centiseconds.
    pub fn remaining(&self, color: Color) -> i32 {
        self.remaining[color.index()]
    }

    pub fn in_byo(&self, color: Color) -> bool {
        self.in_byo[color.index()]
    }

    /// Overwrite a clock from an external report (GTP `time_left` style).
    /// `stones` = 0 means main time; nonzero means byo-yomi with that many
    /// stones outstanding.
    pub fn adjust_time(&mut self, color: Color, centis: i32, stones: i32) {
        let i = color.index();
        self.remaining[i] = centis;
        if stones > 0 {
            self.in_byo[i] = true;
            self.stones_left[i] = stones;
        } else {
            self.in_byo[i] = false;
            self.stones_left[i] = self.byo_stones;
        }
    }

    /// Budget for the next move, centiseconds.
    ///
    /// Main time is spread over the expected number of remaining moves for
    /// the board size; byo-yomi time is spread over the outstanding stones.
    pub fn max_time_for_move(&self, color: Color) -> i32 {
        let i = color.index();
        let budget = if self.in_byo[i] {
            self.remaining[i] / self.stones_left[i].max(1)
        } else {
            let mut alloc = self.remaining[i] / self.moves_expected();
            // With overtime behind us, the tail of main time can be spent
            // more freely.
            if self.byo_stones > 0 && self.byo_time > 0 {
                alloc = alloc.max(self.byo_time / self.byo_stones.max(1));
            }
            alloc
        };
        (budget - LAG_BUFFER_CENTIS).max(MIN_TIME_CENTIS)
    }

    /// Expected remaining moves for one player on this board size.
    fn moves_expected(&self) -> i32 {
        ((self.boardsize * self.boardsize) as i32 / 5).max(10)
    }

    /// Start charging `color`'s clock.
    pub fn start(&mut self, color: Color) {
        self.started[color.index()] = Some(Instant::now());
    }

    /// Stop charging `color`'s clock and deduct the elapsed time. Entering
    /// byo-yomi resets the period; finishing a period refills it.
    pub fn stop(&mut self, color: Color) {
        let i = color.index();
        let Some(started) = self.started[i].take() else {
            return;
        };
        let elapsed = (started.elapsed().as_millis() / 10) as i32;
        self.remaining[i] -= elapsed;

        if self.in_byo[i] {
            self.stones_left[i] -= 1;
            if self.stones_left[i] <= 0 {
                self.remaining[i] = self.byo_time;
                self.stones_left[i] = self.byo_stones;
            }
        } else if self.remaining[i] <= 0 && self.byo_stones > 0 && self.byo_time > 0 {
            self.in_byo[i] = true;
            self.remaining[i] += self.byo_time;
            self.stones_left[i] = self.byo_stones;
        }
    }
}

impl Default for TimeControl {
    /// 30 minutes main time, no overtime.
    fn default() -> Self {
        Self::new(30 * 60 * 100, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_scales_with_remaining_time() {
        let mut tc = TimeControl::new(100_000, 0, 0);
        tc.set_boardsize(19);
        let full = tc.max_time_for_move(Color::Black);
        tc.adjust_time(Color::Black, 10_000, 0);
        let low = tc.max_time_for_move(Color::Black);
        assert!(full > low);
        assert!(low >= MIN_TIME_CENTIS);
    }

    #[test]
    fn test_byo_yomi_budget() {
        let mut tc = TimeControl::new(0, 3_000, 10);
        tc.adjust_time(Color::White, 3_000, 10);
        // 30 seconds for 10 stones: 3 seconds per stone, minus lag.
        assert_eq!(tc.max_time_for_move(Color::White), 300 - LAG_BUFFER_CENTIS);
    }

    #[test]
    fn test_budget_floor() {
        let mut tc = TimeControl::new(5, 0, 0);
        tc.set_boardsize(9);
        assert_eq!(tc.max_time_for_move(Color::Black), MIN_TIME_CENTIS);
    }

    #[test]
    fn test_clock_charges_elapsed() {
        let mut tc = TimeControl::new(10_000, 0, 0);
        tc.start(Color::Black);
        std::thread::sleep(std::time::Duration::from_millis(30));
        tc.stop(Color::Black);
        assert!(tc.remaining(Color::Black) < 10_000);
        // White's clock is untouched.
        assert_eq!(tc.remaining(Color::White), 10_000);
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mut tc = TimeControl::default();
        let before = tc.remaining(Color::Black);
        tc.stop(Color::Black);
        assert_eq!(tc.remaining(Color::Black), before);
    }
}

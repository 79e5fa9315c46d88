//! Go board: stone placement, captures, legality and scoring.
//!
//! Cells are stored in a flat array (-1 white, 0 empty, 1 black). The board
//! maintains two incremental Zobrist hashes: the full hash (stones, simple-ko
//! point and side to move) used for transposition lookups, and the stones-only
//! hash used by the superko history.
//!
//! Scoring is Trump-Taylor: stones as placed plus empty regions bordered
//! exclusively by one color. Dead stones are not removed.

use super::zobrist::ZOBRIST;
use super::{Color, Vertex, PASS};
use smallvec::SmallVec;

/// Neighbor offsets for the 4 cardinal directions.
const NEIGHBORS: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Diagonal offsets, used by the single-point eye test.
const DIAGONALS: [(i32, i32); 4] = [(-1, -1), (-1, 1), (1, -1), (1, 1)];

/// Column letters in GTP coordinates. The letter I is skipped.
const COLUMNS: &[u8] = b"ABCDEFGHJKLMNOPQRST";

/// No simple-ko point on the board.
const NO_KO: Vertex = -1;

/// A Go board with incremental hashing.
#[derive(Clone, Debug)]
pub struct Board {
    size: usize,
    cells: Vec<i8>,
    to_move: Color,
    ko_point: Vertex,
    hash: u64,
    stone_hash: u64,
}

impl Board {
    /// Create an empty board. Black moves first.
    pub fn new(size: usize) -> Self {
        assert!((2..=19).contains(&size), "unsupported board size {}", size);
        Self {
            size,
            cells: vec![0; size * size],
            to_move: Color::Black,
            ko_point: NO_KO,
            hash: 0,
            stone_hash: 0,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.size * self.size
    }

    #[inline]
    pub fn get(&self, vertex: Vertex) -> i8 {
        self.cells[vertex as usize]
    }

    #[inline]
    pub fn to_move(&self) -> Color {
        self.to_move
    }

    /// Set the side to move, adjusting the full hash.
    pub fn set_to_move(&mut self, color: Color) {
        if self.to_move != color {
            self.hash ^= ZOBRIST.white_to_move;
            self.to_move = color;
        }
    }

    /// Full hash: stones, ko point and side to move.
    #[inline]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Stones-only hash, used for superko history.
    #[inline]
    pub fn stone_hash(&self) -> u64 {
        self.stone_hash
    }

    #[inline]
    pub fn ko_point(&self) -> Vertex {
        self.ko_point
    }

    #[inline]
    fn row_col(&self, vertex: Vertex) -> (usize, usize) {
        let v = vertex as usize;
        (v / self.size, v % self.size)
    }

    #[inline]
    fn vertex_at(&self, row: usize, col: usize) -> Vertex {
        (row * self.size + col) as Vertex
    }

    fn neighbors(&self, vertex: Vertex) -> SmallVec<[Vertex; 4]> {
        let (row, col) = self.row_col(vertex);
        let mut out = SmallVec::new();
        for &(dr, dc) in &NEIGHBORS {
            let nr = row as i32 + dr;
            let nc = col as i32 + dc;
            if nr >= 0 && nr < self.size as i32 && nc >= 0 && nc < self.size as i32 {
                out.push(self.vertex_at(nr as usize, nc as usize));
            }
        }
        out
    }

    /// Collect the group containing `vertex` into `group`, marking `visited`.
    fn find_group(&self, vertex: Vertex, group: &mut SmallVec<[Vertex; 64]>, visited: &mut [bool]) {
        group.clear();
        let color = self.get(vertex);
        if color == 0 {
            return;
        }

        let mut stack: SmallVec<[Vertex; 64]> = SmallVec::new();
        stack.push(vertex);
        visited[vertex as usize] = true;

        while let Some(v) = stack.pop() {
            group.push(v);
            for n in self.neighbors(v) {
                if !visited[n as usize] && self.get(n) == color {
                    visited[n as usize] = true;
                    stack.push(n);
                }
            }
        }
    }

    /// Fast liberty check with early exit.
    fn group_has_liberties(&self, group: &[Vertex]) -> bool {
        for &v in group {
            for n in self.neighbors(v) {
                if self.get(n) == 0 {
                    return true;
                }
            }
        }
        false
    }

    fn count_liberties(&self, group: &[Vertex]) -> usize {
        let mut seen = vec![false; self.num_vertices()];
        let mut count = 0;
        for &v in group {
            for n in self.neighbors(v) {
                if self.get(n) == 0 && !seen[n as usize] {
                    seen[n as usize] = true;
                    count += 1;
                }
            }
        }
        count
    }

    #[inline]
    fn toggle_stone(&mut self, vertex: Vertex, color: Color) {
        let key = ZOBRIST.stones[color.index()][vertex as usize];
        self.hash ^= key;
        self.stone_hash ^= key;
    }

    fn clear_ko(&mut self) {
        if self.ko_point != NO_KO {
            self.hash ^= ZOBRIST.ko[self.ko_point as usize];
            self.ko_point = NO_KO;
        }
    }

    fn set_ko(&mut self, vertex: Vertex) {
        self.ko_point = vertex;
        self.hash ^= ZOBRIST.ko[vertex as usize];
    }

    /// Remove captured opponent groups adjacent to the just-played stone.
    /// Returns the number of stones taken and the last emptied vertex.
    fn remove_captured_adjacent(&mut self, vertex: Vertex, color: Color) -> (usize, Vertex) {
        let opponent = color.opponent().sign();
        let mut visited = vec![false; self.num_vertices()];
        let mut group: SmallVec<[Vertex; 64]> = SmallVec::new();
        let mut captured = 0;
        let mut last_empty = NO_KO;

        for n in self.neighbors(vertex) {
            if self.get(n) == opponent && !visited[n as usize] {
                self.find_group(n, &mut group, &mut visited);
                if !self.group_has_liberties(&group) {
                    for &g in group.iter() {
                        self.cells[g as usize] = 0;
                        self.toggle_stone(g, color.opponent());
                        captured += 1;
                        last_empty = g;
                    }
                }
            }
        }

        (captured, last_empty)
    }

    /// Check whether placing `color` at `vertex` is legal: the point is
    /// empty, not the simple-ko point, and the move is not suicide.
    pub fn is_legal(&self, vertex: Vertex, color: Color) -> bool {
        if vertex < 0 || vertex as usize >= self.num_vertices() {
            return false;
        }
        if self.get(vertex) != 0 || vertex == self.ko_point {
            return false;
        }

        // An empty neighbor means the stone has a liberty outright.
        for n in self.neighbors(vertex) {
            if self.get(n) == 0 {
                return true;
            }
        }

        let opponent = color.opponent().sign();
        let mut visited = vec![false; self.num_vertices()];
        let mut group: SmallVec<[Vertex; 64]> = SmallVec::new();

        // Capturing an opponent group in atari at this point gains a liberty.
        for n in self.neighbors(vertex) {
            if self.get(n) == opponent && !visited[n as usize] {
                self.find_group(n, &mut group, &mut visited);
                let mut other_liberty = false;
                'group: for &g in group.iter() {
                    for gn in self.neighbors(g) {
                        if self.get(gn) == 0 && gn != vertex {
                            other_liberty = true;
                            break 'group;
                        }
                    }
                }
                if !other_liberty {
                    return true;
                }
            }
        }

        // Connecting to a friendly group that keeps a spare liberty.
        visited.fill(false);
        for n in self.neighbors(vertex) {
            if self.get(n) == color.sign() && !visited[n as usize] {
                self.find_group(n, &mut group, &mut visited);
                for &g in group.iter() {
                    for gn in self.neighbors(g) {
                        if self.get(gn) == 0 && gn != vertex {
                            return true;
                        }
                    }
                }
            }
        }

        false
    }

    /// Place a stone for `color`. The move must be legal.
    ///
    /// Removes captured opponent groups, updates the simple-ko point and both
    /// hashes, and flips the side to move.
    pub fn play(&mut self, vertex: Vertex, color: Color) {
        debug_assert!(self.is_legal(vertex, color));

        self.clear_ko();
        self.cells[vertex as usize] = color.sign();
        self.toggle_stone(vertex, color);

        let (captured, last_empty) = self.remove_captured_adjacent(vertex, color);

        // Single-stone capture by a lone stone in atari marks a ko.
        if captured == 1 {
            let mut visited = vec![false; self.num_vertices()];
            let mut group: SmallVec<[Vertex; 64]> = SmallVec::new();
            self.find_group(vertex, &mut group, &mut visited);
            if group.len() == 1 && self.count_liberties(&group) == 1 {
                self.set_ko(last_empty);
            }
        }

        self.set_to_move(color.opponent());
    }

    /// Pass: clears the ko point and flips the side to move.
    pub fn play_pass(&mut self) {
        self.clear_ko();
        self.set_to_move(self.to_move.opponent());
    }

    /// Single-point eye test for `color` at an empty `vertex`.
    ///
    /// All orthogonal neighbors must be own stones. Opposing diagonals break
    /// the eye: one suffices on the edge, two in the interior.
    pub fn is_eye(&self, vertex: Vertex, color: Color) -> bool {
        if self.get(vertex) != 0 {
            return false;
        }

        for n in self.neighbors(vertex) {
            if self.get(n) != color.sign() {
                return false;
            }
        }

        let (row, col) = self.row_col(vertex);
        let mut off_board = 0;
        let mut enemy = 0;
        for &(dr, dc) in &DIAGONALS {
            let nr = row as i32 + dr;
            let nc = col as i32 + dc;
            if nr < 0 || nr >= self.size as i32 || nc < 0 || nc >= self.size as i32 {
                off_board += 1;
            } else if self.get(self.vertex_at(nr as usize, nc as usize)) == color.opponent().sign() {
                enemy += 1;
            }
        }

        if off_board > 0 {
            enemy == 0
        } else {
            enemy <= 1
        }
    }

    /// Trump-Taylor score from Black's perspective, komi not applied.
    ///
    /// Stones count as placed; an empty region counts for the only color it
    /// borders. Regions touching both colors are neutral.
    pub fn area_score(&self) -> f32 {
        let mut black = 0.0f32;
        let mut white = 0.0f32;
        let mut visited = vec![false; self.num_vertices()];

        for v in 0..self.num_vertices() as Vertex {
            if visited[v as usize] {
                continue;
            }
            match self.get(v) {
                1 => black += 1.0,
                -1 => white += 1.0,
                _ => {
                    let (territory, borders_black, borders_white) =
                        self.flood_fill_territory(v, &mut visited);
                    if borders_black && !borders_white {
                        black += territory as f32;
                    } else if borders_white && !borders_black {
                        white += territory as f32;
                    }
                }
            }
        }

        black - white
    }

    fn flood_fill_territory(&self, start: Vertex, visited: &mut [bool]) -> (usize, bool, bool) {
        let mut count = 0;
        let mut borders_black = false;
        let mut borders_white = false;
        let mut stack = vec![start];

        while let Some(v) = stack.pop() {
            if visited[v as usize] {
                continue;
            }
            match self.get(v) {
                1 => {
                    borders_black = true;
                    continue;
                }
                -1 => {
                    borders_white = true;
                    continue;
                }
                _ => {}
            }
            visited[v as usize] = true;
            count += 1;
            for n in self.neighbors(v) {
                stack.push(n);
            }
        }

        (count, borders_black, borders_white)
    }

    /// GTP-style coordinate for a vertex ("D4"), or "pass"/"resign".
    pub fn vertex_to_text(&self, vertex: Vertex) -> String {
        if vertex == PASS {
            return "pass".to_string();
        }
        if vertex < 0 {
            return "resign".to_string();
        }
        let (row, col) = self.row_col(vertex);
        format!("{}{}", COLUMNS[col] as char, self.size - row)
    }

    /// Parse a GTP-style coordinate. Returns None for malformed input.
    pub fn text_to_vertex(&self, text: &str) -> Option<Vertex> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("pass") {
            return Some(PASS);
        }
        let mut chars = text.chars();
        let letter = chars.next()?.to_ascii_uppercase();
        let col = COLUMNS.iter().position(|&c| c as char == letter)?;
        let number: usize = chars.as_str().parse().ok()?;
        if col >= self.size || number == 0 || number > self.size {
            return None;
        }
        Some(self.vertex_at(self.size - number, col))
    }

    /// Render the board for debugging.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("   ");
        for col in 0..self.size {
            out.push(COLUMNS[col] as char);
            out.push(' ');
        }
        out.push('\n');
        for row in 0..self.size {
            out.push_str(&format!("{:2} ", self.size - row));
            for col in 0..self.size {
                let c = match self.get(self.vertex_at(row, col)) {
                    1 => 'X',
                    -1 => 'O',
                    _ => '.',
                };
                out.push(c);
                out.push(' ');
            }
            out.push('\n');
        }
        out
    }
}

//! Self-play training data collection.
//!
//! After every completed `think`, the driver records one sample: the
//! position tensor and the visit distribution over root moves. Samples are
//! persisted as JSON lines so a training pipeline can stream them.

use crate::game::{Color, GameState, PASS};
use crate::node::UCTNode;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("training file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("training sample serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One self-play position with its search-derived move distribution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingSample {
    /// Flat board cells: -1 white, 0 empty, 1 black.
    pub board: Vec<i8>,
    /// Side to move: +1 black, -1 white.
    pub to_move: i8,
    /// Move number at the recorded position.
    pub movenum: u32,
    /// Visit-normalized probabilities over `boardsize² + 1` moves,
    /// pass last.
    pub probabilities: Vec<f32>,
}

/// In-memory sample buffer with JSONL persistence.
#[derive(Default)]
pub struct TrainingBuffer {
    samples: Vec<TrainingSample>,
}

impl TrainingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the root visit distribution for `state`. Positions whose root
    /// has no visited children are skipped.
    pub fn record(&mut self, state: &GameState, root: &UCTNode) {
        let vertices = state.boardsize() * state.boardsize();
        let mut probabilities = vec![0.0f32; vertices + 1];
        let mut total = 0u32;

        for child in root.get_children() {
            let visits = child.get_visits();
            total += visits;
            let slot = if child.get_move() == PASS {
                vertices
            } else {
                child.get_move() as usize
            };
            probabilities[slot] = visits as f32;
        }
        if total == 0 {
            return;
        }
        for p in probabilities.iter_mut() {
            *p /= total as f32;
        }

        let board = (0..vertices as i32).map(|v| state.board().get(v)).collect();
        self.samples.push(TrainingSample {
            board,
            to_move: if state.side_to_move() == Color::Black {
                1
            } else {
                -1
            },
            movenum: state.movenum(),
            probabilities,
        });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn samples(&self) -> &[TrainingSample] {
        &self.samples
    }

    /// Write all samples as JSON lines.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TrainingError> {
        let mut out = BufWriter::new(File::create(path)?);
        for sample in &self.samples {
            serde_json::to_writer(&mut out, sample)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }

    /// Read a JSONL sample file written by [`TrainingBuffer::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TrainingError> {
        let reader = BufReader::new(File::open(path)?);
        let mut samples = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            samples.push(serde_json::from_str(&line)?);
        }
        Ok(Self { samples })
    }
}

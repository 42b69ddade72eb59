//! Aggregation and rendering of image pull progress
//!
//! The engine multiplexes events for every layer into one stream, in no
//! particular order. [`PullProgress`] folds them into one entry per layer
//! (first-seen order) and [`ProgressView`] redraws the whole block after
//! each change.

use crossterm::{cursor, queue, terminal};
use dbin_provider::PullEvent;
use std::collections::HashMap;
use std::io::{self, IsTerminal, Write};

/// Latest known byte counts for one layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerProgress {
    pub id: String,
    pub current: u64,
    pub total: u64,
}

impl LayerProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.current as f64 / self.total as f64 * 100.0
        }
    }

    fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(12)]
    }
}

/// Per-layer download state of one pull
#[derive(Debug, Default)]
pub struct PullProgress {
    layers: Vec<LayerProgress>,
    index: HashMap<String, usize>,
}

impl PullProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event in. Returns true when the aggregated view changed
    pub fn apply(&mut self, event: &PullEvent) -> bool {
        if !event.is_downloading() {
            return false;
        }
        let Some(id) = event.layer_id.as_deref() else {
            return false;
        };
        let current = event.current_bytes.unwrap_or(0);
        let total = event.total_bytes.unwrap_or(0);

        match self.index.get(id) {
            Some(&i) => {
                let layer = &mut self.layers[i];
                layer.current = current;
                layer.total = total;
            }
            None => {
                self.index.insert(id.to_string(), self.layers.len());
                self.layers.push(LayerProgress {
                    id: id.to_string(),
                    current,
                    total,
                });
            }
        }
        true
    }

    /// Layers in first-seen order
    pub fn layers(&self) -> &[LayerProgress] {
        &self.layers
    }

    /// One display line per layer with a known size
    pub fn lines(&self) -> Vec<String> {
        self.layers
            .iter()
            .filter(|l| l.total > 0)
            .map(|l| {
                format!(
                    "Downloading {}: {:.1}% of {:.2} MB",
                    l.short_id(),
                    l.percent(),
                    l.total as f64 / 1024.0 / 1024.0
                )
            })
            .collect()
    }
}

/// Redraws the aggregated progress block in place
pub struct ProgressView<W: Write> {
    out: W,
    drawn: usize,
    interactive: bool,
}

impl ProgressView<io::Stderr> {
    /// Draw on stderr when it is a terminal, stay silent otherwise
    pub fn stderr() -> Self {
        let out = io::stderr();
        let interactive = out.is_terminal();
        Self::new(out, interactive)
    }
}

impl<W: Write> ProgressView<W> {
    pub fn new(out: W, interactive: bool) -> Self {
        Self {
            out,
            drawn: 0,
            interactive,
        }
    }

    /// Replace the previously drawn block with the current state
    pub fn draw(&mut self, progress: &PullProgress) -> io::Result<()> {
        if !self.interactive {
            return Ok(());
        }

        let lines = progress.lines();
        if self.drawn > 0 {
            queue!(self.out, cursor::MoveUp(self.drawn as u16))?;
        }
        queue!(
            self.out,
            cursor::MoveToColumn(0),
            terminal::Clear(terminal::ClearType::FromCursorDown)
        )?;
        for line in &lines {
            writeln!(self.out, "{}", line)?;
        }
        self.drawn = lines.len();
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

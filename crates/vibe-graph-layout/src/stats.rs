//! Per-step statistics and their optional file output.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::error::LayoutResult;

/// How far back the energy difference column looks.
pub(crate) const ENERGY_DIFF_RANGE: usize = 30;

/// Figures describing the last completed step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StepStats {
    /// Step number (0-indexed).
    pub step: u64,
    /// Particles whose move exceeded the threshold.
    pub moved: usize,
    /// Longest move of the step.
    pub max_move: f32,
    /// Average move over the particles that moved.
    pub avg_move: f32,
    /// Total energy: sum of the net force magnitudes.
    pub energy: f32,
    /// Diagonal of the n-tree region at the start of the step.
    pub area: f32,
    /// Wall time of the step.
    pub duration: Duration,
}

/// Appends one whitespace-separated line per step:
/// `stabilization moved energy energy_diff max_move avg_move area`.
#[derive(Debug)]
pub(crate) struct StatsWriter {
    path: PathBuf,
    out: Option<BufWriter<File>>,
}

impl StatsWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            out: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file is created lazily on the first line.
    pub fn write(&mut self, stats: &StepStats, stabilization: f64, energy_diff: f32) -> LayoutResult<()> {
        let out = match &mut self.out {
            Some(out) => out,
            None => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)?;
                self.out.insert(BufWriter::new(file))
            }
        };

        writeln!(
            out,
            "{:.6} {} {:.6} {:.6} {:.6} {:.6} {:.6}",
            stabilization,
            stats.moved,
            stats.energy,
            energy_diff,
            stats.max_move,
            stats.avg_move,
            stats.area
        )?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_one_line_per_step() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("springbox.dat");
        let mut writer = StatsWriter::new(&path);

        let stats = StepStats {
            moved: 3,
            energy: 1.5,
            ..Default::default()
        };
        writer.write(&stats, 1.0, 0.25).unwrap();
        writer.write(&stats, 0.5, 0.0).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].split_whitespace().count(), 7);
        assert!(lines[0].starts_with("1.000000 3 1.500000 0.250000"));
        assert_eq!(writer.path(), path.as_path());
    }

    #[test]
    fn test_unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = StatsWriter::new(dir.path().join("missing").join("stats.dat"));

        assert!(writer.write(&StepStats::default(), 1.0, 0.0).is_err());
    }
}

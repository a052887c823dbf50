// Line-oriented diff between a baseline and a working document.

mod line;

pub use line::{line_diff, reconstruct_baseline, reconstruct_current, DiffHunk, DiffResult};

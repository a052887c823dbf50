use serde::{Deserialize, Serialize};

/// One element of a computed diff, in document order.
///
/// A `Header` marks the start of a contiguous run of added/removed lines
/// and carries the affected 1-based line ranges in both versions. Lines
/// inside a run are emitted removals-first, then additions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffHunk {
    Header { old_start: u32, old_count: u32, new_start: u32, new_count: u32 },
    Context { line: String },
    Added { line: String },
    Removed { line: String },
}

/// Result of diffing baseline content against current content.
///
/// Invariants: concatenating context + removed lines reconstructs the
/// baseline exactly; context + added lines reconstructs the current
/// content exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffResult {
    pub has_changes: bool,
    pub hunks: Vec<DiffHunk>,
    /// Number of added plus removed lines.
    pub change_count: usize,
}

impl DiffResult {
    fn unchanged(hunks: Vec<DiffHunk>) -> Self {
        Self { has_changes: false, hunks, change_count: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineEdit<'a> {
    Equal(&'a str),
    Added(&'a str),
    Removed(&'a str),
}

/// Computes a line diff from `baseline` to `current`.
///
/// Lines are split on `\n` boundaries; a trailing newline contributes a
/// final empty line so reconstruction is byte-exact. Classification uses
/// a longest-common-subsequence line diff; contiguous non-context runs
/// are grouped under a header hunk.
pub fn line_diff(baseline: &str, current: &str) -> DiffResult {
    let old_lines = split_lines(baseline);
    let new_lines = split_lines(current);

    if old_lines.is_empty() && new_lines.is_empty() {
        return DiffResult::unchanged(Vec::new());
    }
    if baseline == current {
        let hunks =
            old_lines.iter().map(|line| DiffHunk::Context { line: (*line).to_owned() }).collect();
        return DiffResult::unchanged(hunks);
    }

    let edits = myers_line_edits(&old_lines, &new_lines);
    group_into_hunks(&edits)
}

/// Rebuilds the baseline content from a hunk sequence (context + removed).
pub fn reconstruct_baseline(hunks: &[DiffHunk]) -> String {
    let lines: Vec<&str> = hunks
        .iter()
        .filter_map(|hunk| match hunk {
            DiffHunk::Context { line } | DiffHunk::Removed { line } => Some(line.as_str()),
            _ => None,
        })
        .collect();
    lines.join("\n")
}

/// Rebuilds the current content from a hunk sequence (context + added).
pub fn reconstruct_current(hunks: &[DiffHunk]) -> String {
    let lines: Vec<&str> = hunks
        .iter()
        .filter_map(|hunk| match hunk {
            DiffHunk::Context { line } | DiffHunk::Added { line } => Some(line.as_str()),
            _ => None,
        })
        .collect();
    lines.join("\n")
}

fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.split('\n').collect()
    }
}

fn group_into_hunks(edits: &[LineEdit<'_>]) -> DiffResult {
    let mut hunks = Vec::new();
    let mut change_count = 0usize;

    // 1-based cursors into both versions.
    let mut old_line = 1u32;
    let mut new_line = 1u32;

    let mut run_removed: Vec<&str> = Vec::new();
    let mut run_added: Vec<&str> = Vec::new();
    let mut run_start: Option<(u32, u32)> = None;

    fn flush_run(
        hunks: &mut Vec<DiffHunk>,
        run_removed: &mut Vec<&str>,
        run_added: &mut Vec<&str>,
        run_start: &mut Option<(u32, u32)>,
    ) {
        let Some((old_start, new_start)) = run_start.take() else {
            return;
        };
        hunks.push(DiffHunk::Header {
            old_start,
            old_count: run_removed.len() as u32,
            new_start,
            new_count: run_added.len() as u32,
        });
        for line in run_removed.drain(..) {
            hunks.push(DiffHunk::Removed { line: line.to_owned() });
        }
        for line in run_added.drain(..) {
            hunks.push(DiffHunk::Added { line: line.to_owned() });
        }
    }

    for edit in edits.iter().copied() {
        match edit {
            LineEdit::Equal(line) => {
                flush_run(&mut hunks, &mut run_removed, &mut run_added, &mut run_start);
                hunks.push(DiffHunk::Context { line: line.to_owned() });
                old_line += 1;
                new_line += 1;
            }
            LineEdit::Removed(line) => {
                run_start.get_or_insert((old_line, new_line));
                run_removed.push(line);
                change_count += 1;
                old_line += 1;
            }
            LineEdit::Added(line) => {
                run_start.get_or_insert((old_line, new_line));
                run_added.push(line);
                change_count += 1;
                new_line += 1;
            }
        }
    }
    flush_run(&mut hunks, &mut run_removed, &mut run_added, &mut run_start);

    DiffResult { has_changes: change_count > 0, hunks, change_count }
}

fn myers_line_edits<'a>(old_lines: &[&'a str], new_lines: &[&'a str]) -> Vec<LineEdit<'a>> {
    let old_len = old_lines.len();
    let new_len = new_lines.len();

    if old_len == 0 {
        return new_lines.iter().copied().map(LineEdit::Added).collect();
    }
    if new_len == 0 {
        return old_lines.iter().copied().map(LineEdit::Removed).collect();
    }

    let max = old_len + new_len;
    let offset = max as isize;
    let mut v = vec![0isize; 2 * max + 1];
    let mut trace: Vec<Vec<isize>> = Vec::with_capacity(max + 1);
    let mut solved_d = 0usize;

    'outer: for d in 0..=max {
        trace.push(v.clone());

        let d_isize = d as isize;
        let mut k = -d_isize;
        while k <= d_isize {
            let k_idx = (k + offset) as usize;
            let mut x = if k == -d_isize
                || (k != d_isize && v[(k - 1 + offset) as usize] < v[(k + 1 + offset) as usize])
            {
                v[(k + 1 + offset) as usize]
            } else {
                v[(k - 1 + offset) as usize] + 1
            };
            let mut y = x - k;

            while x < old_len as isize
                && y < new_len as isize
                && old_lines[x as usize] == new_lines[y as usize]
            {
                x += 1;
                y += 1;
            }

            v[k_idx] = x;

            if x >= old_len as isize && y >= new_len as isize {
                solved_d = d;
                break 'outer;
            }

            k += 2;
        }
    }

    backtrack_line_edits(old_lines, new_lines, &trace, solved_d, offset)
}

fn backtrack_line_edits<'a>(
    old_lines: &[&'a str],
    new_lines: &[&'a str],
    trace: &[Vec<isize>],
    solved_d: usize,
    offset: isize,
) -> Vec<LineEdit<'a>> {
    let mut edits = Vec::new();
    let mut x = old_lines.len() as isize;
    let mut y = new_lines.len() as isize;

    for d in (0..=solved_d).rev() {
        let v = &trace[d];
        let k = x - y;
        let d_isize = d as isize;

        let prev_k = if d == 0 {
            0
        } else if k == -d_isize
            || (k != d_isize && v[(k - 1 + offset) as usize] < v[(k + 1 + offset) as usize])
        {
            k + 1
        } else {
            k - 1
        };
        let prev_x = if d == 0 { 0 } else { v[(prev_k + offset) as usize] };
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            edits.push(LineEdit::Equal(old_lines[(x - 1) as usize]));
            x -= 1;
            y -= 1;
        }

        if d == 0 {
            break;
        }

        if x == prev_x {
            edits.push(LineEdit::Added(new_lines[(y - 1) as usize]));
            y -= 1;
        } else {
            edits.push(LineEdit::Removed(old_lines[(x - 1) as usize]));
            x -= 1;
        }
    }

    edits.reverse();
    edits
}

#[cfg(test)]
mod tests {
    use super::{line_diff, reconstruct_baseline, reconstruct_current, DiffHunk};
    use proptest::prelude::*;

    fn added_lines(hunks: &[DiffHunk]) -> Vec<&str> {
        hunks
            .iter()
            .filter_map(|hunk| match hunk {
                DiffHunk::Added { line } => Some(line.as_str()),
                _ => None,
            })
            .collect()
    }

    fn removed_lines(hunks: &[DiffHunk]) -> Vec<&str> {
        hunks
            .iter()
            .filter_map(|hunk| match hunk {
                DiffHunk::Removed { line } => Some(line.as_str()),
                _ => None,
            })
            .collect()
    }

    fn header_count(hunks: &[DiffHunk]) -> usize {
        hunks.iter().filter(|hunk| matches!(hunk, DiffHunk::Header { .. })).count()
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_documents_have_no_changes() {
        let result = line_diff("", "");
        assert!(!result.has_changes);
        assert_eq!(result.change_count, 0);
        assert!(result.hunks.is_empty());
    }

    #[test]
    fn identical_content_is_all_context() {
        let result = line_diff("alpha\nbeta", "alpha\nbeta");
        assert!(!result.has_changes);
        assert_eq!(result.change_count, 0);
        assert_eq!(
            result.hunks,
            vec![
                DiffHunk::Context { line: "alpha".into() },
                DiffHunk::Context { line: "beta".into() },
            ]
        );
    }

    #[test]
    fn insertion_into_empty_document() {
        let result = line_diff("", "hello\nworld");
        assert!(result.has_changes);
        assert_eq!(result.change_count, 2);
        assert_eq!(added_lines(&result.hunks), vec!["hello", "world"]);
        assert!(removed_lines(&result.hunks).is_empty());
    }

    #[test]
    fn deletion_to_empty_document() {
        let result = line_diff("hello\nworld", "");
        assert!(result.has_changes);
        assert_eq!(result.change_count, 2);
        assert_eq!(removed_lines(&result.hunks), vec!["hello", "world"]);
        assert!(added_lines(&result.hunks).is_empty());
    }

    // ── Classification ─────────────────────────────────────────────

    #[test]
    fn replaced_and_appended_lines_classify_as_expected() {
        let result = line_diff("line1\nline2\nline3", "line1\nlineX\nline3\nline4");

        assert!(result.has_changes);
        assert_eq!(result.change_count, 3);
        assert_eq!(removed_lines(&result.hunks), vec!["line2"]);
        assert_eq!(added_lines(&result.hunks), vec!["lineX", "line4"]);
        // Two separated runs: the replacement and the append.
        assert_eq!(header_count(&result.hunks), 2);
    }

    #[test]
    fn replacement_run_orders_removals_before_additions() {
        let result = line_diff("a\nold\nz", "a\nnew\nz");
        assert_eq!(
            result.hunks,
            vec![
                DiffHunk::Context { line: "a".into() },
                DiffHunk::Header { old_start: 2, old_count: 1, new_start: 2, new_count: 1 },
                DiffHunk::Removed { line: "old".into() },
                DiffHunk::Added { line: "new".into() },
                DiffHunk::Context { line: "z".into() },
            ]
        );
    }

    #[test]
    fn pure_insertion_header_has_zero_old_count() {
        let result = line_diff("a\nb", "a\nmid\nb");
        assert_eq!(
            result.hunks,
            vec![
                DiffHunk::Context { line: "a".into() },
                DiffHunk::Header { old_start: 2, old_count: 0, new_start: 2, new_count: 1 },
                DiffHunk::Added { line: "mid".into() },
                DiffHunk::Context { line: "b".into() },
            ]
        );
    }

    #[test]
    fn trailing_newline_is_significant() {
        let result = line_diff("alpha", "alpha\n");
        assert!(result.has_changes);
        // "alpha\n" splits to ["alpha", ""] — the empty final line is added.
        assert_eq!(added_lines(&result.hunks), vec![""]);
    }

    // ── Reconstruction invariants ──────────────────────────────────

    #[test]
    fn reconstruction_round_trips_for_various_scenarios() {
        let scenarios = [
            ("", "hello world"),
            ("hello world", ""),
            ("line1\nline2\nline3", "line1\nlineX\nline3\nline4"),
            ("alpha\nbeta\ngamma\n", "alpha!\nbeta\ndelta\ngamma\nomega\n"),
            ("naïve café", "naive cafe ☕"),
            ("shared", "shared"),
            ("a\n\nb", "a\nb"),
        ];

        for (baseline, current) in scenarios {
            let result = line_diff(baseline, current);
            assert_eq!(
                reconstruct_baseline(&result.hunks),
                baseline,
                "baseline mismatch for {baseline:?} -> {current:?}"
            );
            assert_eq!(
                reconstruct_current(&result.hunks),
                current,
                "current mismatch for {baseline:?} -> {current:?}"
            );
        }
    }

    #[test]
    fn change_count_counts_added_plus_removed() {
        let result = line_diff("a\nb\nc", "a\nx\ny");
        assert_eq!(
            result.change_count,
            added_lines(&result.hunks).len() + removed_lines(&result.hunks).len()
        );
    }

    proptest! {
        #[test]
        fn reconstruction_round_trips_for_arbitrary_documents(
            old_lines in proptest::collection::vec("[a-c]{0,3}", 0..8),
            new_lines in proptest::collection::vec("[a-c]{0,3}", 0..8),
        ) {
            let baseline = old_lines.join("\n");
            let current = new_lines.join("\n");
            let result = line_diff(&baseline, &current);

            prop_assert_eq!(reconstruct_baseline(&result.hunks), baseline);
            prop_assert_eq!(reconstruct_current(&result.hunks), current);
        }
    }
}

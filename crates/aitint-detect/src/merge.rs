//! Grouping of extracted text units into scoring segments.
//!
//! Detectors are unreliable on a single line of text, so consecutive units
//! are merged into fixed-size windows before scoring. A window never
//! crosses a page boundary: the last window on a page simply takes the
//! remainder.

use aitint_core::{AitintError, MergedSegment, Result, TextUnit};

/// Partition `units` into [`MergedSegment`]s of at most `window` units each.
///
/// `units` must be ordered by page (non-decreasing) and by reading order
/// within a page. Every unit lands in exactly one segment and the output
/// preserves input order. `window == 1` yields one segment per unit.
///
/// # Errors
///
/// Returns [`AitintError::Contract`] if `window` is zero or the pages are
/// out of order.
///
/// # Example
///
/// ```
/// use aitint_core::{BoundingBox, TextUnit};
/// use aitint_detect::merge::merge_units;
///
/// let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0).unwrap();
/// let units: Vec<TextUnit> = (0..3).map(|i| TextUnit::new(format!("line {i}"), bbox, 0)).collect();
/// let segments = merge_units(&units, 2).unwrap();
/// assert_eq!(segments.len(), 2);
/// assert_eq!(segments[1].text(), "line 2");
/// ```
pub fn merge_units(units: &[TextUnit], window: usize) -> Result<Vec<MergedSegment<'_>>> {
    if window == 0 {
        return Err(AitintError::Contract(
            "merge window must be at least 1".to_string(),
        ));
    }

    let mut segments = Vec::with_capacity(units.len().div_ceil(window));
    for page_run in page_runs(units)? {
        for chunk in page_run.chunks(window) {
            segments.push(MergedSegment::new(chunk)?);
        }
    }

    tracing::debug!(
        units = units.len(),
        segments = segments.len(),
        window,
        "Merged text units into segments"
    );
    Ok(segments)
}

/// Split `units` into maximal runs sharing a page, rejecting page regressions.
fn page_runs(units: &[TextUnit]) -> Result<Vec<&[TextUnit]>> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..units.len() {
        let (prev, cur) = (units[i - 1].page(), units[i].page());
        if cur < prev {
            return Err(AitintError::Contract(format!(
                "text units out of page order: page {cur} at index {i} follows page {prev}"
            )));
        }
        if cur != prev {
            runs.push(&units[start..i]);
            start = i;
        }
    }
    if start < units.len() {
        runs.push(&units[start..]);
    }
    Ok(runs)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

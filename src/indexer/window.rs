//! Scan-window arithmetic.
//!
//! Pure functions deciding which blocks one scanner tick covers and how a long catch-up is split
//! into sequential sub-ranges with a checkpoint after each.

/// An inclusive block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub start: u64,
    pub end: u64,
}

impl ScanWindow {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn block_count(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Parameters bounding a window computation.
#[derive(Debug, Clone, Copy)]
pub struct WindowParams {
    pub confirmation_offset: u64,
    pub max_backlog: u64,
}

/// Compute the window `[start, head]` for a tick.
///
/// `start` trails `last` by `confirmation_offset - 1` blocks so that events near the tip are seen
/// again once final, and never reaches further back than `max_backlog` blocks from `head`.
pub fn compute_window(last: u64, head: u64, params: WindowParams) -> ScanWindow {
    let rescan = params.confirmation_offset.saturating_sub(1);
    let max_backlog = params.max_backlog.max(1);

    let mut start = last.saturating_sub(rescan).min(head);
    if head - start > max_backlog {
        start = head - max_backlog + 1;
    }

    ScanWindow::new(start, head)
}

/// Number of blocks `compute_window` dropped because of the backlog cap.
pub fn skipped_blocks(last: u64, window: &ScanWindow, params: WindowParams) -> u64 {
    let uncapped = last
        .saturating_sub(params.confirmation_offset.saturating_sub(1))
        .min(window.end);
    window.start - uncapped
}

/// Split a window into the ranges fetched one after another.
///
/// A window that fits in one chunk is fetched whole. A larger one is partitioned over
/// `[start, end - 1]`; the tip block is left to the next tick's trailing window.
pub fn plan_ranges(window: ScanWindow, chunk_size: u64) -> Vec<ScanWindow> {
    let chunk_size = chunk_size.max(1);
    if window.block_count() <= chunk_size {
        return vec![window];
    }

    let last = window.end - 1;
    let mut ranges = Vec::with_capacity((window.block_count() / chunk_size + 1) as usize);
    let mut current = window.start;
    while current <= last {
        let to = std::cmp::min(current + chunk_size - 1, last);
        ranges.push(ScanWindow::new(current, to));
        current = to + 1;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(confirmation_offset: u64, max_backlog: u64) -> WindowParams {
        WindowParams {
            confirmation_offset,
            max_backlog,
        }
    }

    #[test]
    fn test_cold_start_window() {
        // A cold start seeds `last` at the head, so only the trailing window is scanned.
        let window = compute_window(100, 100, params(5, 1000));
        assert_eq!(window, ScanWindow::new(96, 100));
    }

    #[test]
    fn test_offset_clamps_at_genesis() {
        let window = compute_window(3, 50, params(20, 1000));
        assert_eq!(window.start, 0);
    }

    #[test]
    fn test_backlog_cap() {
        let p = params(20, 5000);
        let window = compute_window(1_000, 100_000, p);
        assert_eq!(window, ScanWindow::new(95_001, 100_000));
        assert_eq!(window.block_count(), 5000);
        assert_eq!(skipped_blocks(1_000, &window, p), 95_001 - 981);
    }

    #[test]
    fn test_checkpoint_ahead_of_head() {
        // A lagging node may report a head below our checkpoint.
        let window = compute_window(500, 450, params(10, 1000));
        assert_eq!(window, ScanWindow::new(450, 450));
    }

    #[test]
    fn test_window_bounds_hold_everywhere() {
        let heads = [0u64, 1, 2, 7, 99, 100, 101, 250, 10_000];
        let lasts = [0u64, 1, 5, 96, 100, 249, 250, 9_999, 20_000];
        for &head in &heads {
            for &last in &lasts {
                for offset in [1u64, 2, 5, 20] {
                    for max_backlog in [1u64, 3, 100, 5000] {
                        let w = compute_window(last, head, params(offset, max_backlog));
                        assert!(w.start <= w.end, "start > end for {last}/{head}");
                        assert_eq!(w.end, head);
                        assert!(
                            head - w.start <= max_backlog,
                            "backlog exceeded: last={last} head={head} max={max_backlog}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_small_window_is_one_range() {
        let ranges = plan_ranges(ScanWindow::new(96, 100), 100);
        assert_eq!(ranges, vec![ScanWindow::new(96, 100)]);
    }

    #[test]
    fn test_chunked_catch_up_ranges() {
        let ranges = plan_ranges(ScanWindow::new(0, 250), 100);
        assert_eq!(
            ranges,
            vec![
                ScanWindow::new(0, 99),
                ScanWindow::new(100, 199),
                ScanWindow::new(200, 249),
            ]
        );
    }

    #[test]
    fn test_chunks_are_contiguous() {
        let window = ScanWindow::new(1_234, 9_876);
        let ranges = plan_ranges(window, 333);
        assert_eq!(ranges.first().unwrap().start, window.start);
        assert_eq!(ranges.last().unwrap().end, window.end - 1);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
            assert!(pair[0].block_count() <= 333);
        }
    }
}

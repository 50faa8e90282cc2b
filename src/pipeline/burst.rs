/// Burst grouping
///
/// Starting at the first pending item, extends a run through the following
/// backlog slots while the shots stay close in time. Runs are contiguous in
/// backlog order, never cross a non-pending item and hold at most
/// `MAX_BURST` items.

use crate::error::Result;
use crate::media::{capture_time, ImageSource};
use crate::state::backlog::Backlog;
use crate::state::data::Item;

/// Largest run graded in one call
pub const MAX_BURST: usize = 4;
/// Max gap between a candidate and the last shot already in the run
pub const NEIGHBOR_GAP_MS: i64 = 2000;
/// Max distance between a candidate and the first shot of the run
pub const TOTAL_SPAN_MS: i64 = 4000;

/// One member of a run being assembled
#[derive(Debug, Clone)]
pub struct BurstCandidate {
    /// Backlog position
    pub index: usize,
    pub item: Item,
    /// Epoch milliseconds
    pub captured_at: i64,
}

/// Whether a shot taken at `candidate` extends a run spanning
/// `first..=last`. Identical timestamps are accepted.
pub fn continues_burst(first: i64, last: i64, candidate: i64) -> bool {
    let neighbor_delta = (candidate - last).abs();
    let total_delta = (candidate - first).abs();
    neighbor_delta < NEIGHBOR_GAP_MS && total_delta < TOTAL_SPAN_MS
}

/// Next run to grade. Empty when nothing is pending.
pub async fn group_next<S>(backlog: &Backlog, source: &S) -> Result<Vec<BurstCandidate>>
where
    S: ImageSource + ?Sized,
{
    group_window(backlog.pending_window(MAX_BURST), source).await
}

/// Group a window taken with `Backlog::pending_window`. Reading the seed
/// is the only failure; an unreadable follower just ends the run.
pub async fn group_window<S>(window: Vec<(usize, Item)>, source: &S) -> Result<Vec<BurstCandidate>>
where
    S: ImageSource + ?Sized,
{
    let mut window = window.into_iter().take(MAX_BURST);
    let Some((index, item)) = window.next() else {
        return Ok(Vec::new());
    };

    let head = source.read_head(&item).await?;
    let first = capture_time(&head.bytes, head.mime_type, head.last_modified);
    let mut run = vec![BurstCandidate {
        index,
        item,
        captured_at: first,
    }];

    for (index, item) in window {
        let head = match source.read_head(&item).await {
            Ok(head) => head,
            Err(e) => {
                tracing::debug!(item = %item.id, error = %e, "Unreadable candidate ends the burst");
                break;
            }
        };

        let captured_at = capture_time(&head.bytes, head.mime_type, head.last_modified);
        let last = run.last().map(|c| c.captured_at).unwrap_or(first);
        if !continues_burst(first, last, captured_at) {
            tracing::debug!(
                item = %item.id,
                neighbor_delta = (captured_at - last).abs(),
                total_delta = (captured_at - first).abs(),
                "Burst ends"
            );
            break;
        }

        run.push(BurstCandidate {
            index,
            item,
            captured_at,
        });
    }

    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::ItemId;
    use crate::state::evaluation::Evaluation;
    use crate::testing::{backlog, FakeSource};
    use proptest::prelude::*;

    async fn group_names(backlog: &Backlog, source: &FakeSource) -> Vec<String> {
        group_next(backlog, source)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.item.name)
            .collect()
    }

    #[tokio::test]
    async fn test_stops_on_neighbor_gap() {
        let backlog = backlog(&["a", "b", "c", "d"]);
        let source = FakeSource::with_times(&[("a", 1000), ("b", 1500), ("c", 3200), ("d", 7000)]);

        assert_eq!(group_names(&backlog, &source).await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_stops_on_total_span() {
        let backlog = backlog(&["a", "b", "c", "d"]);
        // Every neighbor gap passes, but d is 4500ms after a
        let source = FakeSource::with_times(&[("a", 0), ("b", 1500), ("c", 3000), ("d", 4500)]);

        assert_eq!(group_names(&backlog, &source).await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_boundaries_are_exclusive() {
        let backlog = backlog(&["a", "b"]);
        let source = FakeSource::with_times(&[("a", 0), ("b", 2000)]);
        assert_eq!(group_names(&backlog, &source).await, vec!["a"]);

        source.add("b", 1999);
        assert_eq!(group_names(&backlog, &source).await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_identical_timestamps_group() {
        let backlog = backlog(&["a", "b", "c", "d", "e", "f"]);
        let source = FakeSource::with_times(&[
            ("a", 5000),
            ("b", 5000),
            ("c", 5000),
            ("d", 5000),
            ("e", 5000),
            ("f", 5000),
        ]);

        assert_eq!(group_names(&backlog, &source).await, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_backwards_clock_uses_absolute_delta() {
        let backlog = backlog(&["a", "b", "c"]);
        let source = FakeSource::with_times(&[("a", 10_000), ("b", 9_000), ("c", 6_500)]);

        assert_eq!(group_names(&backlog, &source).await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_starts_at_first_pending_and_skips_nothing_else() {
        let mut backlog = backlog(&["a", "b", "c", "d", "e"]);
        backlog.claim(&[ItemId::new("a")]);
        backlog.complete(&ItemId::new("a"), Evaluation::new(true), None).unwrap();
        backlog.claim(&[ItemId::new("d")]);

        let source = FakeSource::with_times(&[("a", 0), ("b", 0), ("c", 0), ("d", 0), ("e", 0)]);
        let run = group_next(&backlog, &source).await.unwrap();

        let positions: Vec<_> = run.iter().map(|c| c.index).collect();
        assert_eq!(positions, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_unreadable_follower_ends_run() {
        let backlog = backlog(&["a", "b", "c"]);
        let source = FakeSource::with_times(&[("a", 0), ("c", 0)]);

        assert_eq!(group_names(&backlog, &source).await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_unreadable_seed_is_an_error() {
        let backlog = backlog(&["a", "b"]);
        let source = FakeSource::with_times(&[("b", 0)]);

        assert!(group_next(&backlog, &source).await.is_err());
    }

    #[tokio::test]
    async fn test_nothing_pending() {
        let backlog = backlog(&[]);
        let source = FakeSource::default();
        assert!(group_next(&backlog, &source).await.unwrap().is_empty());
    }

    /// Backlog `img00, img01, ...` with capture times built from `gap`s
    /// and a status per slot: 0-2 pending, 3 done, 4 processing, 5 error
    fn timeline(shots: &[(i64, u8)]) -> (Backlog, FakeSource, Vec<i64>) {
        let names: Vec<String> = (0..shots.len()).map(|i| format!("img{:02}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut backlog = backlog(&refs);
        let source = FakeSource::default();
        let mut times = Vec::with_capacity(shots.len());

        let mut t = 0i64;
        for (name, (gap, status)) in names.iter().zip(shots) {
            t += gap;
            source.add(name, t);
            times.push(t);

            let id = ItemId::new(name.as_str());
            match status {
                3 => {
                    backlog.claim(std::slice::from_ref(&id));
                    backlog.complete(&id, Evaluation::new(true), None).unwrap();
                }
                4 => {
                    backlog.claim(std::slice::from_ref(&id));
                }
                5 => {
                    backlog.claim(std::slice::from_ref(&id));
                    backlog.fail(&id, "failed").unwrap();
                }
                _ => {}
            }
        }
        (backlog, source, times)
    }

    proptest! {
        #[test]
        fn test_runs_are_contiguous_pending_bursts(
            shots in prop::collection::vec((-500i64..2600, 0u8..6), 1..10)
        ) {
            let (backlog, source, times) = timeline(&shots);
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let run = runtime.block_on(group_next(&backlog, &source)).unwrap();
            let items: Vec<Item> = backlog.iter().cloned().collect();

            match items.iter().position(Item::is_pending) {
                None => prop_assert!(run.is_empty()),
                Some(start) => {
                    prop_assert!(!run.is_empty());
                    prop_assert!(run.len() <= MAX_BURST);
                    for (offset, candidate) in run.iter().enumerate() {
                        prop_assert_eq!(candidate.index, start + offset);
                        prop_assert_eq!(&candidate.item.id, &items[candidate.index].id);
                        prop_assert!(items[candidate.index].is_pending());
                        prop_assert_eq!(candidate.captured_at, times[candidate.index]);
                    }

                    let first = run[0].captured_at;
                    for pair in run.windows(2) {
                        prop_assert!(continues_burst(first, pair[0].captured_at, pair[1].captured_at));
                    }

                    // The slot after the run could not have joined it
                    let next = start + run.len();
                    if run.len() < MAX_BURST && next < items.len() && items[next].is_pending() {
                        let last = run[run.len() - 1].captured_at;
                        prop_assert!(!continues_burst(first, last, times[next]));
                    }
                }
            }
        }
    }
}

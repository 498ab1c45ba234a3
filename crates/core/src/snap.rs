//! Magnetic snapping of a proposed time to the beat grid or to a neighbor's
//! edge.

use riff_transport::ClipId;

use crate::time::TimeContext;

/// Something on a track that has edges: a persisted clip, or the projection
/// of the `n`th chord of the progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemRef {
    Clip(ClipId),
    VirtualChord(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    pub item: ItemRef,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnapTarget {
    /// Nothing was close enough.
    Free,
    Grid,
    Edge(ItemRef),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapped {
    pub time: f64,
    pub target: SnapTarget,
}

/// Snap `proposed` to the closest grid line or edge of a span other than
/// `moving`, if that is within `threshold_beats`.
///
/// The grid line is the first candidate and only a strictly closer edge
/// replaces it, so equal distances resolve to the grid, then to the earliest
/// span. The result is never negative.
pub fn snap_time(
    proposed: f64,
    spans: &[Span],
    moving: Option<ItemRef>,
    ctx: &TimeContext,
    threshold_beats: f64,
) -> Snapped {
    let threshold = threshold_beats * ctx.seconds_per_beat();

    let grid = ctx.nearest_beat(proposed);
    let mut best = (grid, (grid - proposed).abs(), SnapTarget::Grid);

    for span in spans.iter().filter(|s| Some(s.item) != moving) {
        for edge in [span.start, span.end] {
            let delta = (edge - proposed).abs();
            if delta < best.1 {
                best = (edge, delta, SnapTarget::Edge(span.item));
            }
        }
    }

    if best.1 < threshold {
        Snapped {
            time: best.0.max(0.0),
            target: best.2,
        }
    } else {
        Snapped {
            time: proposed.max(0.0),
            target: SnapTarget::Free,
        }
    }
}

//! Pure functions for clip operations, testable without a session.

use riff_transport::{Clip, ClipId};

const EPSILON: f64 = 1e-9;

/// Result of resolving overlaps between a placed clip and its neighbors.
#[derive(Debug, Clone, Default)]
pub struct OverlapResolution {
    /// The neighbors that survive, possibly trimmed. Does not include the
    /// placed clip.
    pub clips: Vec<Clip>,
    pub modified: Vec<ClipId>,
    pub removed: Vec<ClipId>,
    /// Right halves of split clips.
    pub created: Vec<ClipId>,
}

/// Make room for `placed` on a track holding `existing`.
///
/// The placed clip wins: neighbors it covers are removed, neighbors it lands
/// inside are split, and neighbors it only partly covers are trimmed. A
/// trimmed part shorter than `min_duration` is removed instead. Clips that
/// merely touch `placed` are untouched. An entry in `existing` with the
/// placed clip's own id is skipped.
pub fn resolve_overlaps(existing: &[Clip], placed: &Clip, min_duration: f64) -> OverlapResolution {
    let new_start = placed.start;
    let new_end = placed.end();
    let mut result = OverlapResolution::default();

    for clip in existing {
        if clip.id == placed.id {
            continue;
        }
        if !clip.overlaps(new_start, new_end) {
            result.clips.push(clip.clone());
            continue;
        }

        let existing_start = clip.start;
        let existing_end = clip.end();

        if new_start <= existing_start + EPSILON && new_end >= existing_end - EPSILON {
            // Covered
            result.removed.push(clip.id);
        } else if new_start > existing_start && new_end < existing_end {
            // Placed inside: split around it
            let left_len = new_start - existing_start;
            let right_len = existing_end - new_end;

            if left_len >= min_duration {
                let mut left = clip.clone();
                left.duration = left_len;
                result.modified.push(left.id);
                result.clips.push(left);
            } else {
                result.removed.push(clip.id);
            }

            if right_len >= min_duration {
                let mut right = clip.clone();
                right.id = ClipId::new();
                right.start = new_end;
                right.duration = right_len;
                right.offset = advance_offset(clip, new_end - existing_start);
                result.created.push(right.id);
                result.clips.push(right);
            }
        } else if new_start > existing_start {
            // Placed start inside: cut the tail
            let remaining = new_start - existing_start;
            if remaining >= min_duration {
                let mut trimmed = clip.clone();
                trimmed.duration = remaining;
                result.modified.push(trimmed.id);
                result.clips.push(trimmed);
            } else {
                result.removed.push(clip.id);
            }
        } else {
            // Placed end inside: cut the head
            let cut = new_end - existing_start;
            let remaining = existing_end - new_end;
            if remaining >= min_duration {
                let mut trimmed = clip.clone();
                trimmed.start = new_end;
                trimmed.duration = remaining;
                trimmed.offset = advance_offset(clip, cut);
                result.modified.push(trimmed.id);
                result.clips.push(trimmed);
            } else {
                result.removed.push(clip.id);
            }
        }
    }

    result
}

/// Offset after skipping `timeline_seconds` of `clip`, in source seconds.
fn advance_offset(clip: &Clip, timeline_seconds: f64) -> f64 {
    let offset = clip.offset + timeline_seconds * clip.playback_rate;
    if clip.loop_enabled && clip.source_duration > 0.0 {
        offset.rem_euclid(clip.source_duration)
    } else {
        offset
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeEdge {
    Left,
    Right,
}

/// `clip` with one edge moved to `time`.
///
/// The right edge changes only the duration. The left edge moves the start
/// and shifts the offset so the audio under the other edge stays put. The
/// result is at least `min_duration` long and, unless the clip loops, stays
/// within its source.
pub fn resize_clip(clip: &Clip, edge: ResizeEdge, time: f64, min_duration: f64) -> Clip {
    let mut resized = clip.clone();
    let rate = clip.playback_rate;

    match edge {
        ResizeEdge::Right => {
            let mut duration = time - clip.start;
            if !clip.loop_enabled {
                duration = duration.min(clip.available_duration());
            }
            resized.duration = duration.max(min_duration);
        }
        ResizeEdge::Left => {
            let end = clip.end();
            let mut start = time.max(0.0).min(end - min_duration);
            if !clip.loop_enabled {
                // Cannot reveal audio before the source starts.
                start = start.max(clip.start - clip.offset / rate);
            }
            start = start.max(0.0);
            resized.start = start;
            resized.duration = end - start;
            resized.offset = advance_offset(clip, start - clip.start).max(0.0);
        }
    }
    resized
}

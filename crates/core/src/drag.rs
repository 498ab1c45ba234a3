//! Pointer gestures on the timeline.
//!
//! The controller only tracks a preview while the pointer moves; nothing on
//! the timeline changes until [`DragController::pointer_up`] hands back a
//! [`Command`] for the session to apply.

use riff_transport::{Clip, ClipId, TrackId};

use crate::chords::ChordProgression;
use crate::clip_ops::{ResizeEdge, resize_clip};
use crate::commands::Command;
use crate::snap::{ItemRef, SnapTarget, snap_time};
use crate::time::TimeContext;
use crate::timeline::{Timeline, TimelineError};

/// Where the dragged item would land if released now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preview {
    pub item: ItemRef,
    pub track_id: TrackId,
    pub start: f64,
    pub duration: f64,
    pub target: SnapTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DragState {
    Idle,
    Dragging {
        target: ItemRef,
        track_id: TrackId,
        /// Pointer position minus item start at pointer down.
        grab_offset: f64,
        origin: f64,
        preview: Preview,
    },
    Resizing {
        clip_id: ClipId,
        edge: ResizeEdge,
        origin: Clip,
        preview: Clip,
        target: SnapTarget,
    },
}

/// Everything a pointer event needs to look at.
#[derive(Debug, Clone, Copy)]
pub struct PointerContext<'a> {
    pub timeline: &'a Timeline,
    pub progression: &'a ChordProgression,
    pub time: &'a TimeContext,
}

#[derive(Debug, Clone)]
pub struct DragController {
    state: DragState,
    snap_threshold_beats: f64,
    min_clip_duration: f64,
}

impl DragController {
    pub fn new(snap_threshold_beats: f64, min_clip_duration: f64) -> Self {
        Self {
            state: DragState::Idle,
            snap_threshold_beats,
            min_clip_duration,
        }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, DragState::Idle)
    }

    /// Current drag preview, if a drag is in progress.
    pub fn preview(&self) -> Option<Preview> {
        match &self.state {
            DragState::Dragging { preview, .. } => Some(*preview),
            DragState::Resizing {
                clip_id,
                preview,
                target,
                ..
            } => Some(Preview {
                item: ItemRef::Clip(*clip_id),
                track_id: preview.track_id,
                start: preview.start,
                duration: preview.duration,
                target: *target,
            }),
            DragState::Idle => None,
        }
    }

    /// Pointer down on a clip or a virtual chord at `pointer` seconds.
    pub fn begin_drag(&mut self, cx: PointerContext<'_>, item: ItemRef, pointer: f64) -> Result<(), TimelineError> {
        let (track_id, start, duration) = match item {
            ItemRef::Clip(id) => {
                let clip = cx.timeline.clip(id).ok_or(TimelineError::ClipNotFound(id))?;
                (clip.track_id, clip.start, clip.duration)
            }
            ItemRef::VirtualChord(index) => {
                let track = cx.timeline.backing_track().ok_or(TimelineError::NoBackingTrack)?;
                let chord = cx
                    .timeline
                    .virtual_chord_clips(cx.progression, cx.time)
                    .into_iter()
                    .nth(index)
                    .ok_or(TimelineError::NoVirtualChord(index))?;
                (track.id, chord.start, chord.duration)
            }
        };

        log::debug!("drag start {item:?} at {start:.3}s");
        self.state = DragState::Dragging {
            target: item,
            track_id,
            grab_offset: pointer - start,
            origin: start,
            preview: Preview {
                item,
                track_id,
                start,
                duration,
                target: SnapTarget::Free,
            },
        };
        Ok(())
    }

    /// Pointer down on one edge of a clip.
    pub fn begin_resize(&mut self, timeline: &Timeline, clip_id: ClipId, edge: ResizeEdge) -> Result<(), TimelineError> {
        let clip = timeline.clip(clip_id).ok_or(TimelineError::ClipNotFound(clip_id))?;
        self.state = DragState::Resizing {
            clip_id,
            edge,
            origin: clip.clone(),
            preview: clip.clone(),
            target: SnapTarget::Free,
        };
        Ok(())
    }

    /// Update the preview for a pointer at `pointer` seconds.
    pub fn pointer_move(&mut self, cx: PointerContext<'_>, pointer: f64) -> Option<Preview> {
        let threshold = self.snap_threshold_beats;
        let min_duration = self.min_clip_duration;
        match &mut self.state {
            DragState::Idle => return None,
            DragState::Dragging {
                target,
                track_id,
                grab_offset,
                preview,
                ..
            } => {
                let raw = (pointer - *grab_offset).max(0.0);
                let spans = cx.timeline.spans(*track_id, cx.progression, cx.time);
                let snapped = snap_time(raw, &spans, Some(*target), cx.time, threshold);
                preview.start = snapped.time;
                preview.target = snapped.target;
            }
            DragState::Resizing {
                clip_id,
                edge,
                origin,
                preview,
                target,
            } => {
                let spans = cx.timeline.spans(origin.track_id, cx.progression, cx.time);
                let snapped = snap_time(
                    pointer.max(0.0),
                    &spans,
                    Some(ItemRef::Clip(*clip_id)),
                    cx.time,
                    threshold,
                );
                *preview = resize_clip(origin, *edge, snapped.time, min_duration);
                *target = snapped.target;
            }
        }
        self.preview()
    }

    /// Release the pointer. Returns the command to commit, or `None` when
    /// nothing moved or the dragged clip no longer exists.
    pub fn pointer_up(&mut self, timeline: &Timeline) -> Option<Command> {
        match std::mem::replace(&mut self.state, DragState::Idle) {
            DragState::Idle => None,
            DragState::Dragging {
                target,
                origin,
                preview,
                ..
            } => {
                if preview.start == origin {
                    return None;
                }
                match target {
                    ItemRef::Clip(clip_id) => {
                        if timeline.clip(clip_id).is_none() {
                            log::debug!("dragged clip {clip_id} vanished, dropping the move");
                            return None;
                        }
                        Some(Command::MoveClip {
                            clip_id,
                            start: preview.start,
                        })
                    }
                    ItemRef::VirtualChord(index) => {
                        let still_virtual = timeline
                            .backing_track()
                            .is_some_and(|t| !t.clips().iter().any(Clip::is_chord));
                        if !still_virtual {
                            log::debug!("chords were materialized elsewhere, dropping the move");
                            return None;
                        }
                        Some(Command::MaterializeChords {
                            moved: Some((index, preview.start)),
                        })
                    }
                }
            }
            DragState::Resizing {
                clip_id,
                origin,
                preview,
                ..
            } => {
                if timeline.clip(clip_id).is_none() {
                    log::debug!("resized clip {clip_id} vanished, dropping the resize");
                    return None;
                }
                let unchanged = preview.start == origin.start
                    && preview.duration == origin.duration
                    && preview.offset == origin.offset;
                if unchanged {
                    return None;
                }
                Some(Command::ResizeClip {
                    clip_id,
                    start: preview.start,
                    duration: preview.duration,
                    offset: preview.offset,
                })
            }
        }
    }

    /// Abandon the gesture without committing anything.
    pub fn cancel(&mut self) {
        if !self.is_idle() {
            log::debug!("gesture cancelled");
        }
        self.state = DragState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riff_transport::{ChordEntry, ProjectId, Track, TrackKind};

    struct Fixture {
        timeline: Timeline,
        progression: ChordProgression,
        time: TimeContext,
        licks: TrackId,
        clip: ClipId,
    }

    impl Fixture {
        /// 120 BPM, 4/4. A two-second lick at 1s on the lick track and a
        /// two-chord progression on an empty backing track.
        fn new() -> Self {
            let project = ProjectId::new();
            let backing = Track::backing(project);
            let mut licks = Track::new(project, "Licks", TrackKind::Lick);
            licks.order = 1;
            let clip = Clip::lick(licks.id, "lick", None, 1.0, 2.0);
            let clip_id = clip.id;
            licks.upsert_clip(clip);
            let licks_id = licks.id;
            Self {
                timeline: Timeline::new(vec![backing, licks]),
                progression: ChordProgression::new(vec![
                    ChordEntry::new("C", vec![60, 64, 67]).expect("chord"),
                    ChordEntry::new("G", vec![55, 59, 62]).expect("chord"),
                ])
                .expect("progression"),
                time: TimeContext::default(),
                licks: licks_id,
                clip: clip_id,
            }
        }

        fn cx(&self) -> PointerContext<'_> {
            PointerContext {
                timeline: &self.timeline,
                progression: &self.progression,
                time: &self.time,
            }
        }
    }

    fn controller() -> DragController {
        DragController::new(0.25, 0.05)
    }

    #[test]
    fn test_drag_keeps_grab_offset_and_snaps() {
        let fx = Fixture::new();
        let mut drag = controller();
        drag.begin_drag(fx.cx(), ItemRef::Clip(fx.clip), 1.5).expect("begin");

        // Raw start 2.04 is within an eighth of a second of beat 4 (2.0s).
        let preview = drag.pointer_move(fx.cx(), 2.54).expect("preview");
        assert_eq!(preview.start, 2.0);
        assert_eq!(preview.target, SnapTarget::Grid);
        assert_eq!(preview.track_id, fx.licks);

        assert_eq!(
            drag.pointer_up(&fx.timeline),
            Some(Command::MoveClip {
                clip_id: fx.clip,
                start: 2.0
            })
        );
        assert!(drag.is_idle());
    }

    #[test]
    fn test_preview_does_not_touch_timeline() {
        let fx = Fixture::new();
        let before = fx.timeline.clone();
        let mut drag = controller();
        drag.begin_drag(fx.cx(), ItemRef::Clip(fx.clip), 1.0).expect("begin");
        drag.pointer_move(fx.cx(), 5.3);
        assert_eq!(fx.timeline, before);
    }

    #[test]
    fn test_drag_clamps_at_zero() {
        let fx = Fixture::new();
        let mut drag = controller();
        drag.begin_drag(fx.cx(), ItemRef::Clip(fx.clip), 2.0).expect("begin");
        let preview = drag.pointer_move(fx.cx(), 0.2).expect("preview");
        assert_eq!(preview.start, 0.0);
    }

    #[test]
    fn test_release_in_place_commits_nothing() {
        let fx = Fixture::new();
        let mut drag = controller();
        drag.begin_drag(fx.cx(), ItemRef::Clip(fx.clip), 1.2).expect("begin");
        drag.pointer_move(fx.cx(), 1.2);
        assert_eq!(drag.pointer_up(&fx.timeline), None);
    }

    #[test]
    fn test_cancel_returns_to_idle() {
        let fx = Fixture::new();
        let mut drag = controller();
        drag.begin_drag(fx.cx(), ItemRef::Clip(fx.clip), 1.0).expect("begin");
        drag.pointer_move(fx.cx(), 4.0);
        drag.cancel();
        assert!(drag.is_idle());
        assert_eq!(drag.pointer_up(&fx.timeline), None);
    }

    #[test]
    fn test_vanished_clip_commits_nothing() {
        let mut fx = Fixture::new();
        let mut drag = controller();
        drag.begin_drag(fx.cx(), ItemRef::Clip(fx.clip), 1.0).expect("begin");
        drag.pointer_move(fx.cx(), 4.0);

        fx.timeline.remove_clip(fx.clip);

        assert_eq!(drag.pointer_up(&fx.timeline), None);
        assert!(drag.is_idle());
    }

    #[test]
    fn test_virtual_chord_drag_materializes() {
        let fx = Fixture::new();
        let mut drag = controller();
        drag.begin_drag(fx.cx(), ItemRef::VirtualChord(1), 2.5).expect("begin");
        let preview = drag.pointer_move(fx.cx(), 5.5).expect("preview");
        assert_eq!(preview.start, 5.0);

        assert_eq!(
            drag.pointer_up(&fx.timeline),
            Some(Command::MaterializeChords {
                moved: Some((1, 5.0))
            })
        );
    }

    #[test]
    fn test_unknown_virtual_chord_rejected() {
        let fx = Fixture::new();
        let mut drag = controller();
        assert_eq!(
            drag.begin_drag(fx.cx(), ItemRef::VirtualChord(7), 0.0),
            Err(TimelineError::NoVirtualChord(7))
        );
        assert!(drag.is_idle());
    }

    #[test]
    fn test_right_edge_resize_snaps_to_grid() {
        let fx = Fixture::new();
        let mut drag = controller();
        drag.begin_resize(&fx.timeline, fx.clip, ResizeEdge::Right).expect("begin");

        // Shrinking: 2.46 snaps to 2.5, leaving 1.5s.
        let preview = drag.pointer_move(fx.cx(), 2.46).expect("preview");
        assert_eq!(preview.start, 1.0);
        assert_eq!(preview.duration, 1.5);

        assert_eq!(
            drag.pointer_up(&fx.timeline),
            Some(Command::ResizeClip {
                clip_id: fx.clip,
                start: 1.0,
                duration: 1.5,
                offset: 0.0,
            })
        );
    }

    #[test]
    fn test_right_edge_cannot_pass_source_end() {
        let fx = Fixture::new();
        let mut drag = controller();
        drag.begin_resize(&fx.timeline, fx.clip, ResizeEdge::Right).expect("begin");
        let preview = drag.pointer_move(fx.cx(), 8.0).expect("preview");
        assert_eq!(preview.duration, 2.0);
        assert_eq!(drag.pointer_up(&fx.timeline), None);
    }

    #[test]
    fn test_left_edge_resize_moves_offset() {
        let fx = Fixture::new();
        let mut drag = controller();
        drag.begin_resize(&fx.timeline, fx.clip, ResizeEdge::Left).expect("begin");
        drag.pointer_move(fx.cx(), 1.5);

        match drag.pointer_up(&fx.timeline) {
            Some(Command::ResizeClip {
                start,
                duration,
                offset,
                ..
            }) => {
                assert_eq!(start, 1.5);
                assert_eq!(duration, 1.5);
                assert_eq!(offset, 0.5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_resize_clamps_to_minimum() {
        let fx = Fixture::new();
        let mut drag = DragController::new(0.0, 0.05);
        drag.begin_resize(&fx.timeline, fx.clip, ResizeEdge::Right).expect("begin");
        let preview = drag.pointer_move(fx.cx(), 0.5).expect("preview");
        assert_eq!(preview.duration, 0.05);
    }
}

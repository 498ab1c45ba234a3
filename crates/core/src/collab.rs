//! Timeline events exchanged between editors of the same project.

use std::sync::Arc;

use riff_transport::{ChordEntry, Clip, ClipId, ClipPatch, ProjectId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::commands::ChangeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum TimelineEvent {
    TimelineItemPositionUpdate { item: ClipPatch },
    TimelineItemsBulkUpdate { items: Vec<ClipPatch> },
    LickAddToTimeline { item: Clip },
    TimelineItemDelete { item_id: ClipId },
    ChordProgressionUpdate {
        project_id: ProjectId,
        chords: Vec<ChordEntry>,
    },
}

impl TimelineEvent {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Events describing `changes`: additions, a position update for a single
    /// modified clip or a bulk update for several, and deletions.
    pub fn for_changes(changes: &ChangeSet) -> Vec<TimelineEvent> {
        let mut events = Vec::new();
        let mut updated = Vec::new();
        for change in changes.iter() {
            match (&change.before, &change.after) {
                (None, Some(clip)) => events.push(TimelineEvent::LickAddToTimeline { item: clip.clone() }),
                (Some(_), Some(clip)) => updated.push(clip.snapshot()),
                (Some(clip), None) => events.push(TimelineEvent::TimelineItemDelete { item_id: clip.id }),
                (None, None) => {}
            }
        }
        match updated.len() {
            0 => {}
            1 => events.push(TimelineEvent::TimelineItemPositionUpdate {
                item: updated.remove(0),
            }),
            _ => events.push(TimelineEvent::TimelineItemsBulkUpdate { items: updated }),
        }
        events
    }
}

/// Publishes timeline events to other editors.
pub trait Broadcast: Send + Sync + 'static {
    fn publish(&self, event: TimelineEvent);
}

impl<B: Broadcast + ?Sized> Broadcast for Arc<B> {
    fn publish(&self, event: TimelineEvent) {
        (**self).publish(event)
    }
}

/// Drops every event. For single-user sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBroadcast;

impl Broadcast for NullBroadcast {
    fn publish(&self, _event: TimelineEvent) {}
}

/// In-process fan-out over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct ChannelBroadcast {
    sender: broadcast::Sender<TimelineEvent>,
}

impl ChannelBroadcast {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for ChannelBroadcast {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Broadcast for ChannelBroadcast {
    fn publish(&self, event: TimelineEvent) {
        if self.sender.send(event).is_err() {
            log::trace!("timeline event dropped: no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riff_transport::TrackId;

    #[test]
    fn test_event_json_is_type_tagged() {
        let id = ClipId::new();
        let json = TimelineEvent::TimelineItemDelete { item_id: id }
            .to_json()
            .expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(value["type"], "TIMELINE_ITEM_DELETE");
        assert_eq!(value["itemId"], id.to_string());
    }

    #[test]
    fn test_event_json_round_trip() {
        let clip = Clip::lick(TrackId::new(), "lick-1", Some("a.wav".into()), 1.0, 2.0);
        let event = TimelineEvent::LickAddToTimeline { item: clip };
        let parsed = TimelineEvent::from_json(&event.to_json().expect("json")).expect("parse");
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_events_for_changes() {
        let track = TrackId::new();
        let a = Clip::lick(track, "a", None, 0.0, 1.0);
        let mut moved = a.clone();
        moved.start = 2.0;
        let b = Clip::lick(track, "b", None, 4.0, 1.0);

        let mut changes = ChangeSet::default();
        changes.push(Some(a.clone()), Some(moved.clone()));
        changes.push(Some(b.clone()), None);
        let events = TimelineEvent::for_changes(&changes);
        assert_eq!(
            events,
            vec![
                TimelineEvent::TimelineItemDelete { item_id: b.id },
                TimelineEvent::TimelineItemPositionUpdate {
                    item: moved.snapshot()
                },
            ]
        );

        let mut both = ChangeSet::default();
        both.push(Some(a.clone()), Some(moved.clone()));
        let mut moved_b = b.clone();
        moved_b.start = 6.0;
        both.push(Some(b), Some(moved_b));
        assert!(matches!(
            TimelineEvent::for_changes(&both).as_slice(),
            [TimelineEvent::TimelineItemsBulkUpdate { items }] if items.len() == 2
        ));
    }

    #[tokio::test]
    async fn test_channel_fans_out() {
        let channel = ChannelBroadcast::new(8);
        let mut first = channel.subscribe();
        let mut second = channel.subscribe();
        let event = TimelineEvent::TimelineItemDelete {
            item_id: ClipId::new(),
        };

        channel.publish(event.clone());

        assert_eq!(first.recv().await.expect("first"), event);
        assert_eq!(second.recv().await.expect("second"), event);
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        ChannelBroadcast::default().publish(TimelineEvent::TimelineItemsBulkUpdate { items: Vec::new() });
        NullBroadcast.publish(TimelineEvent::TimelineItemsBulkUpdate { items: Vec::new() });
    }
}

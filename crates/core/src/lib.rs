pub mod autosave;
pub mod chords;
pub mod clip_ops;
pub mod collab;
pub mod commands;
pub mod config;
pub mod drag;
pub mod export;
pub mod session;
pub mod snap;
pub mod time;
pub mod timeline;

pub use autosave::{Autosave, DirtySet, FlushReport};
pub use chords::{ChordError, ChordProgression, VirtualChordClip, materialize_progression, project_virtual_clips};
pub use clip_ops::{OverlapResolution, ResizeEdge, resize_clip, resolve_overlaps};
pub use collab::{Broadcast, ChannelBroadcast, NullBroadcast, TimelineEvent};
pub use commands::{ChangeSet, ClipChange, Command, EditContext, History};
pub use config::EngineConfig;
pub use drag::{DragController, DragState, PointerContext, Preview};
pub use export::{MixdownResult, SharedResolver, needs_backing_generation, render_and_upload};
pub use session::{EditorSession, SessionError, TrackMix};
pub use snap::{ItemRef, SnapTarget, Snapped, Span, snap_time};
pub use time::{MusicalPosition, TimeContext, TimeSignature};
pub use timeline::{SharedTimeline, Timeline, TimelineError};

pub use riff_decode::{AudioCache, decode_file};
pub use riff_project::{
    MemoryStore, Project, ProjectDocument, ProjectError, ProjectStore, StoreError, Tempo, load_project,
    save_project,
};
pub use riff_render::{MissingAudio, MixdownConfig, MixdownError, MixdownWarning, SoloPolicy, render_mixdown};
pub use riff_transport::{ChordEntry, Clip, ClipId, ClipKind, ClipPatch, ProjectId, Track, TrackId, TrackKind};

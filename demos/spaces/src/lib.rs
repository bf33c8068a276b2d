//! # Replicast Spaces
//! Shared-space components built on replicated state: a DJ pad board,
//! stage lights, paintable walls, a paint gun and proximity voice groups.
//! Rendering and audio stay behind small effect traits.

#![deny(trivial_casts, trivial_numeric_casts, unstable_features, unused_import_braces)]

mod error;
mod light_board;
mod pad_board;
mod paint_blaster;
mod paint_wall;
mod tasks;
mod voice_group;

pub use error::SpacesError;
pub use light_board::{LightBoard, LightBoardListener, LightEffect, LightState, MAX_LIGHTS};
pub use pad_board::{AudioSettings, PadBoard, PadBoardListener, MAX_PADS};
pub use paint_blaster::{
    Impact, PaintBlaster, ProjectileSpawner, Shot, EVENT_TTL, MAX_IMPACTS, MAX_SHOTS,
};
pub use paint_wall::{Paint, PaintTarget, PaintWall, Painter, MAX_PAINTS};
pub use voice_group::{
    group_for, MuteMode, VoiceClient, VoiceConfig, VoiceGroupMember, VoicePeer,
    NEVER_MATCHING_FILTER,
};

//! A paintable surface whose paint history is shared.
//!
//! The authority paints locally and records what it painted. Everyone else
//! replays new records in order. Ids keep increasing across authority
//! changes, so a participant taking over continues the sequence.

use log::debug;
use serde::{Deserialize, Serialize};

use replicast_participant::{Behaviour, BehaviourContext, Participant, ParticipantError};
use replicast_shared::{
    ChangedFields, FieldError, LogConfig, LogCursor, LogId, ObjectId, ReplicatedBoundedLog,
    ReplicatedObject, Transport,
};

use crate::error::SpacesError;

pub const MAX_PAINTS: usize = 200;

/// One splash of paint
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Paint {
    pub uv: [f32; 2],
    pub color: [u8; 4],
    pub size: f32,
}

/// Local texture painting
pub trait Painter {
    /// Permanent paint
    fn paint(&mut self, paint: &Paint);

    /// Immediate preview shown by a participant without authority, until
    /// the authority's record arrives
    fn pre_paint(&mut self, _paint: &Paint) {}
}

/// Something impacts can be forwarded to
pub trait PaintTarget {
    fn has_authority(&self) -> bool;

    fn paint_at(&mut self, paint: Paint) -> Result<Option<LogId>, FieldError>;
}

pub struct PaintWall<P> {
    object: ReplicatedObject,
    paints: ReplicatedBoundedLog<Paint>,
    painter: P,
    cursor: LogCursor,
}

impl<P: Painter> PaintWall<P> {
    pub fn new<T: Transport>(
        participant: &Participant<T>,
        id: ObjectId,
        painter: P,
    ) -> Result<Self, SpacesError> {
        let mut builder = participant.builder(id);
        let paints = builder.log::<Paint>("paints", LogConfig::history(MAX_PAINTS));
        let object = builder.build()?;
        Ok(Self {
            object,
            paints,
            painter,
            cursor: LogCursor::new(),
        })
    }

    pub fn id(&self) -> ObjectId {
        self.object.id()
    }

    pub fn painter(&self) -> &P {
        &self.painter
    }

    pub fn paint_count(&self) -> usize {
        self.paints.len()
    }

    /// Id the next recorded paint will get
    pub fn next_paint_id(&self) -> LogId {
        self.paints.last_id() + 1
    }

    /// Paints records appended since the last replay. The authority never
    /// replays: it painted before recording.
    pub fn replay(&mut self) -> usize {
        if self.paints.has_authority() {
            return 0;
        }
        let batch = self.paints.consume(&mut self.cursor);
        for entry in &batch {
            self.painter.paint(&entry.payload);
        }
        batch.len()
    }
}

impl<P: Painter> PaintTarget for PaintWall<P> {
    fn has_authority(&self) -> bool {
        self.paints.has_authority()
    }

    /// The authority paints and records; anyone else shows a preview
    fn paint_at(&mut self, paint: Paint) -> Result<Option<LogId>, FieldError> {
        if !self.paints.has_authority() {
            self.painter.pre_paint(&paint);
            return Ok(None);
        }
        self.painter.paint(&paint);
        let id = self.paints.append(paint)?;
        self.cursor = self.paints.cursor_at_end();
        Ok(Some(id))
    }
}

impl<P: Painter + 'static> Behaviour for PaintWall<P> {
    fn object(&self) -> ReplicatedObject {
        self.object.clone()
    }

    fn on_observation_tick(
        &mut self,
        _context: &BehaviourContext<'_>,
        changed: &ChangedFields,
    ) -> Result<(), ParticipantError> {
        if changed.contains(self.paints.id()) {
            let painted = self.replay();
            if painted > 0 {
                debug!("replayed {} paints on {}", painted, self.id());
            }
        }
        Ok(())
    }
}

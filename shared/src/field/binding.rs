use std::sync::{Arc, PoisonError, RwLock};

use crate::{
    authority::{channel::AuthorityAccessor, status::AuthorityState},
    clock::Clock,
    diff_mask::DiffMask,
    field::error::FieldError,
    types::FieldId,
};

// DirtyMask
/// Fields written since the last flush, shared between an object and all of
/// its field handles
#[derive(Clone)]
pub struct DirtyMask {
    mask: Arc<RwLock<DiffMask>>,
}

impl DirtyMask {
    pub fn new(field_count: usize) -> Self {
        Self {
            mask: Arc::new(RwLock::new(DiffMask::new(field_count))),
        }
    }

    pub fn mark(&self, field: FieldId) {
        let mut mask = self.mask.write().unwrap_or_else(PoisonError::into_inner);
        mask.set_bit(field, true);
    }

    pub fn is_clear(&self) -> bool {
        self.mask
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_clear()
    }

    /// Returns the current mask and clears it
    pub fn take(&self) -> DiffMask {
        let mut mask = self.mask.write().unwrap_or_else(PoisonError::into_inner);
        let taken = mask.clone();
        mask.clear();
        taken
    }

    pub(crate) fn resize(&self, field_count: usize) {
        let mut mask = self.mask.write().unwrap_or_else(PoisonError::into_inner);
        *mask = DiffMask::new(field_count);
    }
}

// FieldBinding
/// Everything a field handle needs from its owning object
#[derive(Clone)]
pub(crate) struct FieldBinding {
    pub(crate) id: FieldId,
    pub(crate) name: &'static str,
    pub(crate) authority: AuthorityAccessor,
    pub(crate) dirty: DirtyMask,
    pub(crate) clock: Arc<dyn Clock>,
}

impl FieldBinding {
    pub(crate) fn require_authority(
        &self,
        operation: &'static str,
    ) -> Result<AuthorityState, FieldError> {
        let state = self.authority.state();
        if !state.is_local_authority() {
            return Err(FieldError::NotAuthority {
                object: self.authority.object().to_string(),
                field: self.name,
                operation,
                status: state.status.name(),
            });
        }
        Ok(state)
    }

    pub(crate) fn mark_dirty(&self) {
        self.dirty.mark(self.id);
    }

    pub(crate) fn poisoned(&self) -> FieldError {
        FieldError::LockPoisoned { field: self.name }
    }
}

use crate::{diff_mask::DiffMask, object::ReplicatedObject, types::FieldId};

/// Reports which fields of an object changed since the previous call.
///
/// Every field keeps a local revision counter that bumps on local writes and
/// accepted remote state. The detector remembers the revisions it has seen;
/// each [`detect_changes`](Self::detect_changes) reports the fields whose
/// revision moved and then catches up.
#[derive(Clone, Debug)]
pub struct ChangeDetector {
    seen: Vec<u64>,
    report_all: bool,
}

impl ChangeDetector {
    /// Starts from the object's current state: only later changes are
    /// reported
    pub fn new(object: &ReplicatedObject) -> Self {
        Self {
            seen: object.revisions().map(|(_, revision)| revision).collect(),
            report_all: false,
        }
    }

    /// Reports every field on the first call, so observers can sync
    /// themselves to the state an object was spawned with
    pub fn new_reporting_initial(object: &ReplicatedObject) -> Self {
        Self {
            seen: object.revisions().map(|(_, revision)| revision).collect(),
            report_all: true,
        }
    }

    /// Fields changed since the last call, in declaration order, each at
    /// most once
    pub fn detect_changes(&mut self, object: &ReplicatedObject) -> ChangedFields {
        let report_all = std::mem::take(&mut self.report_all);
        let mut changed = DiffMask::new(object.field_count());
        if self.seen.len() != object.field_count() {
            self.seen.resize(object.field_count(), 0);
        }

        for (field, revision) in object.revisions() {
            let seen = &mut self.seen[field.index()];
            if report_all || *seen != revision {
                changed.set_bit(field, true);
            }
            *seen = revision;
        }

        ChangedFields {
            mask: changed,
            next: 0,
        }
    }
}

/// Changed field ids, in declaration order
#[derive(Clone, Debug)]
pub struct ChangedFields {
    mask: DiffMask,
    next: usize,
}

impl ChangedFields {
    pub fn contains(&self, field: FieldId) -> bool {
        self.mask.bit(field)
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_clear()
    }
}

impl Iterator for ChangedFields {
    type Item = FieldId;

    fn next(&mut self) -> Option<FieldId> {
        while self.next < self.mask.capacity() {
            let index = self.next;
            self.next += 1;
            let field = FieldId::new(u8::try_from(index).ok()?);
            if self.mask.bit(field) {
                return Some(field);
            }
        }
        None
    }
}

use std::fmt;

use crate::types::FieldId;

/// One bit per field of an object, used both to track fields written since
/// the last flush and to report fields changed since the last detection.
#[derive(Clone, PartialEq, Eq)]
pub struct DiffMask {
    mask: Vec<u8>,
}

impl DiffMask {
    /// Create a mask able to hold `field_count` bits, all clear
    pub fn new(field_count: usize) -> Self {
        Self {
            mask: vec![0; field_count.div_ceil(8)],
        }
    }

    /// Number of bits the mask can hold
    pub fn capacity(&self) -> usize {
        self.mask.len() * 8
    }

    pub fn bit(&self, field: FieldId) -> bool {
        let index = field.index();
        match self.mask.get(index / 8) {
            Some(byte) => byte & (1 << (index % 8)) != 0,
            None => false,
        }
    }

    /// Sets or clears the bit of `field`. Bits beyond the capacity are ignored.
    pub fn set_bit(&mut self, field: FieldId, value: bool) {
        let index = field.index();
        let Some(byte) = self.mask.get_mut(index / 8) else {
            return;
        };
        let bit = 1 << (index % 8);
        if value {
            *byte |= bit;
        } else {
            *byte &= !bit;
        }
    }

    pub fn clear(&mut self) {
        self.mask.iter_mut().for_each(|byte| *byte = 0);
    }

    pub fn is_clear(&self) -> bool {
        self.mask.iter().all(|byte| *byte == 0)
    }

    pub fn or(&mut self, other: &DiffMask) {
        for (byte, other_byte) in self.mask.iter_mut().zip(other.mask.iter()) {
            *byte |= *other_byte;
        }
    }

    /// Yields the set bits in ascending field order
    pub fn iter(&self) -> DiffMaskIter<'_> {
        DiffMaskIter {
            mask: self,
            next: 0,
        }
    }
}

impl fmt::Debug for DiffMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DiffMask(")?;
        for byte in &self.mask {
            write!(f, "{:08b}", byte.reverse_bits())?;
        }
        write!(f, ")")
    }
}

pub struct DiffMaskIter<'a> {
    mask: &'a DiffMask,
    next: usize,
}

impl Iterator for DiffMaskIter<'_> {
    type Item = FieldId;

    fn next(&mut self) -> Option<FieldId> {
        while self.next < self.mask.capacity() {
            let index = self.next;
            self.next += 1;
            let Ok(raw) = u8::try_from(index) else {
                return None;
            };
            let field = FieldId::new(raw);
            if self.mask.bit(field) {
                return Some(field);
            }
        }
        None
    }
}

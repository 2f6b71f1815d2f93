//! Two-slot buffer where one slot belongs to the radio and the other to software.
use core::ops::{Deref, DerefMut};

/// Exactly one slot is live at a time. The live slot is only ever read; writes go through
/// [`DoubleBuffer::stage`], which hands out the inactive slot, and become visible to readers
/// when [`Staged::publish`] flips the parity.
pub(crate) struct DoubleBuffer<T> {
    slots: [T; 2],
    odd: bool,
}

impl<T> DoubleBuffer<T> {
    pub(crate) const fn new(even: T, odd: T) -> Self {
        Self {
            slots: [even, odd],
            odd: false,
        }
    }

    /// The slot currently handed to the radio.
    pub(crate) fn live(&self) -> &T {
        &self.slots[self.odd as usize]
    }

    /// Borrow the inactive slot for writing.
    pub(crate) fn stage(&mut self) -> Staged<'_, T> {
        Staged { buffer: self }
    }

    #[cfg(test)]
    pub(crate) fn is_odd(&self) -> bool {
        self.odd
    }
}

/// Write access to the inactive slot of a [`DoubleBuffer`].
pub(crate) struct Staged<'a, T> {
    buffer: &'a mut DoubleBuffer<T>,
}

impl<'a, T> Staged<'a, T> {
    /// Make the staged slot live and return it.
    pub(crate) fn publish(self) -> &'a T {
        let buffer = self.buffer;
        buffer.odd = !buffer.odd;
        buffer.live()
    }
}

impl<T> Deref for Staged<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.buffer.slots[!self.buffer.odd as usize]
    }
}

impl<T> DerefMut for Staged<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.buffer.slots[!self.buffer.odd as usize]
    }
}

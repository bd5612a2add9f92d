//! Generation-checked slab for queued events.
//!
//! The event store only ever holds [`EventId`]s. Removing an event from the
//! arena bumps its slot generation, which turns every copy of the old key
//! still sitting in a store bucket into a tombstone.

use crate::event::EventId;

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

#[derive(Debug)]
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Arena<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Arena {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Reserve the next key without occupying it yet.
    pub(crate) fn next_id(&self) -> EventId {
        match self.free.last() {
            Some(&index) => EventId::new(index, self.slots[index as usize].generation),
            None => EventId::new(self.slots.len() as u32, 0),
        }
    }

    /// Insert a value built from its own key.
    pub(crate) fn insert_with(&mut self, build: impl FnOnce(EventId) -> T) -> EventId {
        let id = self.next_id();
        let value = build(id);
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                debug_assert!(slot.value.is_none());
                slot.value = Some(value);
            }
            None => self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            }),
        }
        self.len += 1;
        id
    }

    pub(crate) fn get(&self, id: EventId) -> Option<&T> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.value.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: EventId) -> bool {
        self.get(id).is_some()
    }

    /// Take the value out and retire the key.
    pub(crate) fn remove(&mut self, id: EventId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(value)
    }

    /// Remove every value, retiring all live keys.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(value) = slot.value.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                out.push(value);
            }
        }
        self.len = 0;
        out
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

//! Bounded, densely packed session storage.

/// Fixed-capacity session pool.
///
/// Slots are kept dense: removing a slot moves the last session into the
/// hole, so indices after a removal may refer to a different session.
#[derive(Debug)]
pub struct SessionPool<S> {
    slots: Vec<S>,
    capacity: usize,
}

impl<S> SessionPool<S> {
    /// Builds an empty pool holding at most `capacity` sessions.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Maximum number of sessions.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of occupied slots.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slot is occupied.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether another session would exceed the capacity.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    /// Appends `session`, handing it back when the pool is full.
    ///
    /// # Errors
    ///
    /// Returns the rejected session when the pool is at capacity.
    pub fn push(&mut self, session: S) -> Result<(), S> {
        if self.is_full() {
            return Err(session);
        }
        self.slots.push(session);
        Ok(())
    }

    /// Removes the session at `index`, moving the last session into its slot.
    pub fn remove(&mut self, index: usize) -> Option<S> {
        (index < self.slots.len()).then(|| self.slots.swap_remove(index))
    }

    /// Session at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut S> {
        self.slots.get_mut(index)
    }

    /// Occupied slots in index order.
    pub fn as_mut_slice(&mut self) -> &mut [S] {
        &mut self.slots
    }

    /// Drops every session.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

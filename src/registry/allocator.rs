//! Identifier Allocator
//!
//! Hands out batch identifiers as a gapless sequence starting at 1.
//! The counter is the number of successful registrations, so the set of
//! valid identifiers is always exactly `1..=counter`.

/// Monotonic batch identifier allocator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdAllocator {
    counter: u64,
}

impl IdAllocator {
    /// Creates an allocator that has issued no identifiers yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores an allocator that has already issued `1..=counter`
    pub fn resume(counter: u64) -> Self {
        Self { counter }
    }

    /// Identifier the next call to `next_id` will return
    ///
    /// Used to stage a registration before it is durably committed; the
    /// counter does not move until `next_id` is called.
    pub fn peek(&self) -> u64 {
        self.counter + 1
    }

    /// Advance the counter and return the newly issued identifier
    pub fn next_id(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    /// Number of identifiers issued so far
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Whether `batch_id` has been issued
    pub fn is_issued(&self, batch_id: u64) -> bool {
        (1..=self.counter).contains(&batch_id)
    }
}

//! Step id generation

use std::cell::RefCell;

/// Monotonically increasing step id generator
#[derive(Debug, Default)]
pub struct Counter {
    id: usize,
}

impl Counter {
    /// Create a counter starting at 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to 0
    pub fn clear(&mut self) {
        self.id = 0;
    }

    /// Return the current value, then increment
    pub fn get_id(&mut self) -> usize {
        let ret = self.id;
        self.id = self.id.wrapping_add(1);
        ret
    }
}

thread_local! {
    /// Counter shared by every report recorded on this thread.
    static STEP_COUNTER: RefCell<Counter> = RefCell::new(Counter::new());
}

/// Next step id from the thread's session counter
pub fn next_step() -> usize {
    STEP_COUNTER.with(|c| c.borrow_mut().get_id())
}

/// Reset the thread's session counter
pub fn reset_steps() {
    STEP_COUNTER.with(|c| c.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_strictly_increasing_from_zero() {
        let mut counter = Counter::new();
        let ids: Vec<usize> = (0..5).map(|_| counter.get_id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);

        counter.clear();
        assert_eq!(counter.get_id(), 0);
        assert_eq!(counter.get_id(), 1);
    }

    #[test]
    fn test_thread_counter_reset() {
        reset_steps();
        assert_eq!(next_step(), 0);
        assert_eq!(next_step(), 1);
        reset_steps();
        assert_eq!(next_step(), 0);
    }
}

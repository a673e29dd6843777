//! Reuse of per-frame allocators keyed by submission value
//!
//! Every discarded item carries the submission value of the work that used it.
//! An item only comes back out once that value has been observed complete, so
//! the GPU is never still reading from a recycled allocator.

use std::collections::VecDeque;

/// FIFO of discarded items waiting for their submission to complete
#[derive(Debug)]
pub struct RecyclingPool<T> {
    pending: VecDeque<(u64, T)>,
    created: usize,
}

impl<T> Default for RecyclingPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RecyclingPool<T> {
    /// Create an empty pool
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            created: 0,
        }
    }

    /// Hand `item` back once the work tagged `value` was submitted
    pub fn discard(&mut self, value: u64, item: T) {
        self.pending.push_back((value, item));
    }

    /// Oldest item whose value is at most `completed_value`, or a new one from `create`
    pub fn request<E, F>(&mut self, completed_value: u64, create: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        match self.pending.front() {
            Some(&(value, _)) if value <= completed_value => {
                if let Some((_, item)) = self.pending.pop_front() {
                    return Ok(item);
                }
            }
            _ => {}
        }

        let item = create()?;
        self.created += 1;
        Ok(item)
    }

    /// Items waiting for reuse
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// How many items `create` has produced
    pub fn created(&self) -> usize {
        self.created
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(pool: &mut RecyclingPool<u32>, completed: u64, fresh: u32) -> u32 {
        pool.request::<(), _>(completed, || Ok(fresh)).unwrap()
    }

    #[test]
    fn test_empty_pool_creates() {
        let mut pool = RecyclingPool::new();
        assert_eq!(request(&mut pool, 10, 7), 7);
        assert_eq!(pool.created(), 1);
    }

    #[test]
    fn test_item_is_not_reused_before_its_value_completes() {
        let mut pool = RecyclingPool::new();
        pool.discard(5, 1);

        assert_eq!(request(&mut pool, 4, 2), 2);
        assert_eq!(pool.pending_len(), 1);

        assert_eq!(request(&mut pool, 5, 3), 1);
        assert_eq!(pool.pending_len(), 0);
        assert_eq!(pool.created(), 1);
    }

    #[test]
    fn test_oldest_completed_item_comes_first() {
        let mut pool = RecyclingPool::new();
        pool.discard(1, 10);
        pool.discard(2, 20);
        pool.discard(3, 30);

        assert_eq!(request(&mut pool, 3, 0), 10);
        assert_eq!(request(&mut pool, 3, 0), 20);
        assert_eq!(request(&mut pool, 3, 0), 30);
        assert_eq!(pool.created(), 0);
    }

    #[test]
    fn test_steady_state_with_three_frames_in_flight() {
        let mut pool = RecyclingPool::new();
        let mut next_id = 0;
        let mut completed = 0;

        for value in 1..=30u64 {
            // With three frames in flight, value - 3 has finished by now
            completed = completed.max(value.saturating_sub(3));
            let item = pool
                .request::<(), _>(completed, || {
                    next_id += 1;
                    Ok(next_id)
                })
                .unwrap();
            pool.discard(value, item);
        }

        assert_eq!(pool.created(), 3);
    }

    #[test]
    fn test_creation_error_propagates() {
        let mut pool: RecyclingPool<u32> = RecyclingPool::new();
        let result = pool.request(0, || Err("out of memory"));
        assert_eq!(result, Err("out of memory"));
        assert_eq!(pool.created(), 0);
    }
}

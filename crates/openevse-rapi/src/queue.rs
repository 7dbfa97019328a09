use std::collections::VecDeque;

/// Fixed-capacity FIFO of commands waiting behind the one in flight.
///
/// The backing storage is allocated once; `push` never grows it and hands the
/// item back when the queue is full so the caller can report the failure.
///
/// # Examples
///
/// ```
/// use openevse_rapi::CommandQueue;
///
/// let mut queue = CommandQueue::new(2);
/// assert!(queue.push("$GV").is_ok());
/// assert!(queue.push("$GS").is_ok());
/// assert_eq!(queue.push("$GC"), Err("$GC"));
///
/// assert_eq!(queue.pop(), Some("$GV"));
/// assert!(queue.push("$GC").is_ok());
/// ```
#[derive(Debug)]
pub struct CommandQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> CommandQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item, or return it if the queue is full.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        self.items.push_back(item);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove every queued item, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.items.drain(..)
    }
}

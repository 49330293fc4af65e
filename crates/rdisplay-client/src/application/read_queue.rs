//! Pending-read queue: raw frames that arrived during a blocking wait but
//! were not the awaited reply.  The next pump dispatches them in arrival
//! order.

use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct PendingReads {
    frames: VecDeque<Vec<u8>>,
}

impl PendingReads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Vec<u8>) {
        self.frames.push_back(frame);
    }

    pub fn pop(&mut self) -> Option<Vec<u8>> {
        self.frames.pop_front()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Pops frames head first and hands each to `dispatch`.  Stops at the
    /// first error; frames behind it stay queued.
    ///
    /// # Errors
    ///
    /// Returns the first error `dispatch` reports.
    pub fn drain_into<E>(
        &mut self,
        mut dispatch: impl FnMut(&[u8]) -> Result<(), E>,
    ) -> Result<(), E> {
        while let Some(frame) = self.frames.pop_front() {
            dispatch(&frame)?;
        }
        Ok(())
    }
}

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::record::Record;

/// Thread-safe consumer FIFO for decoded EVM8 records (`spec.md` §4.6 "consumer queue").
#[derive(Default)]
pub struct DataBuffer {
    buffer: Mutex<VecDeque<Record>>,
}

impl DataBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_data(&self, record: Record) {
        self.buffer.lock().unwrap().push_back(record);
    }

    pub fn priority_add(&self, record: Record) {
        self.buffer.lock().unwrap().push_front(record);
    }

    pub fn get_data(&self) -> Option<Record> {
        self.buffer.lock().unwrap().pop_front()
    }

    pub fn clear_data(&self) {
        self.buffer.lock().unwrap().clear();
    }

    pub fn has_data(&self) -> bool {
        !self.buffer.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_data()
    }

    /// Pushes `record` to the front or back of the queue depending on
    /// [`Record::is_priority`] (`spec.md` §4.6).
    pub fn push(&self, record: Record) {
        if record.is_priority() {
            self.priority_add(record);
        } else {
            self.add_data(record);
        }
    }
}

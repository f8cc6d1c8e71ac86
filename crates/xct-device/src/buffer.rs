//! Consumer FIFO for decoded acquisition rows — the same abstraction shape as
//! [`xc2_evm8::buffer::DataBuffer`] (`spec.md` §4.8 "records enter the same data-buffer
//! abstraction as the EVM8 ingester"), specialized to a row of typed values per sample
//! instead of one `Record` per channel.

use std::collections::VecDeque;
use std::sync::Mutex;

use xct_protocol::XctValue;

/// One row read back from `ReadBuffer`: `channel_count` values in channel order.
pub type AcqRow = Vec<XctValue>;

#[derive(Default)]
pub struct AcqDataBuffer {
    rows: Mutex<VecDeque<AcqRow>>,
}

impl AcqDataBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_data(&self, rows: impl IntoIterator<Item = AcqRow>) {
        self.rows.lock().unwrap().extend(rows);
    }

    pub fn get_data(&self) -> Option<AcqRow> {
        self.rows.lock().unwrap().pop_front()
    }

    pub fn clear_data(&self) {
        self.rows.lock().unwrap().clear();
    }

    pub fn has_data(&self) -> bool {
        !self.rows.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_data()
    }

    /// Drains everything currently queued, in arrival order.
    pub fn drain_all(&self) -> Vec<AcqRow> {
        self.rows.lock().unwrap().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_is_preserved() {
        let buf = AcqDataBuffer::new();
        buf.add_data(vec![vec![XctValue::Int(1)], vec![XctValue::Int(2)]]);
        assert_eq!(buf.get_data(), Some(vec![XctValue::Int(1)]));
        assert_eq!(buf.get_data(), Some(vec![XctValue::Int(2)]));
        assert_eq!(buf.get_data(), None);
    }

    #[test]
    fn drain_all_empties_the_buffer_in_order() {
        let buf = AcqDataBuffer::new();
        buf.add_data(vec![vec![XctValue::Int(1)], vec![XctValue::Int(2)]]);
        let rows = buf.drain_all();
        assert_eq!(rows.len(), 2);
        assert!(!buf.has_data());
    }
}

use crate::record::{InvalidKind, Record};
use crate::timestamp::{bytes_to_int48, i24_le_signed};

/// Decodes aligned 32-byte EVM8 data blocks into [`Record`]s (`spec.md` §4.6 "Data phase").
///
/// Per-group tracking (`old_id`, the two timestamp accumulators) resets on every call to
/// [`Self::decode_blocks`], exactly as the source's `decode_evm_data` re-initializes its
/// locals on every invocation; only `old_counter` is carried across calls, threaded the same
/// way the source threads it back into `receive_evm_data`'s loop variable.
pub struct Evm8Decoder {
    old_counter: u8,
    gain: [f32; 8],
    offset: [f32; 8],
}

impl Default for Evm8Decoder {
    fn default() -> Self {
        Self { old_counter: 0, gain: [1.0; 8], offset: [0.0; 8] }
    }
}

impl Evm8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gain_offset(gain: [f32; 8], offset: [f32; 8]) -> Self {
        Self { old_counter: 0, gain, offset }
    }

    /// Resets the counter-continuity state a new packet starts with
    /// (`spec.md` §4.6 "After accumulating PACKET_SIZE samples ... return to WAIT_HEADER").
    pub fn reset(&mut self) {
        self.old_counter = 0;
    }

    pub fn decode_blocks(&mut self, data: &[u8]) -> Vec<Record> {
        let mut out = Vec::new();
        let mut old_id: u8 = 7;
        let mut counter = self.old_counter;
        let mut timer1_ids: Vec<u8> = Vec::new();
        let mut timer2_ids: Vec<u8> = Vec::new();
        let mut timer1_value: Option<i64> = None;
        let mut timer2_value: Option<i64> = None;

        for block in data.chunks_exact(32) {
            for (group_index, group) in block.chunks_exact(4).enumerate() {
                let id_byte = group[0];
                if id_byte & 0b1 == 0 {
                    out.push(Record::Invalid(InvalidKind::DataBit));
                    continue;
                }

                let channel;
                if id_byte & 0b10 != 0 {
                    if timer1_value.is_none() {
                        timer1_ids.push(id_byte & 0xFC);
                        if timer1_ids.len() == 8 {
                            timer1_value = Some(bytes_to_int48(&timer1_ids, false));
                        }
                    } else if timer2_value.is_none() {
                        counter = 1;
                        timer2_ids.push(id_byte & 0xFC);
                        if timer2_ids.len() == 8 {
                            let t2 = bytes_to_int48(&timer2_ids, true);
                            timer2_value = Some(t2);
                            let t1 = timer1_value.expect("timer1 completes before timer2 starts");
                            out.push(Record::TimeStampDiff(t1 - t2));
                            out.push(Record::TimeStamp1(t2));
                            out.push(Record::TimeStamp0(t1));
                        }
                    }
                    channel = (group_index % 8) as u8;
                    old_id = channel;
                    self.old_counter = counter;
                } else {
                    let c = (id_byte & 0x0F) >> 2;
                    let ch = (id_byte & 0xF0) >> 5;
                    if c != counter {
                        let bad = (c > 0 && c.wrapping_sub(counter) != 1) || (c == 0 && counter != 3);
                        if bad {
                            out.push(Record::Invalid(InvalidKind::DataCounter));
                            continue;
                        }
                        counter = c;
                    }
                    let bad_id = (ch > 0 && ch.wrapping_sub(old_id) != 1) || (ch == 0 && old_id != 7);
                    if bad_id {
                        out.push(Record::Invalid(InvalidKind::DataId));
                        continue;
                    }
                    old_id = ch;
                    channel = ch;
                }

                let raw = i24_le_signed(&group[1..4]);
                let value = raw as f32 * self.gain[channel as usize] + self.offset[channel as usize];
                out.push(Record::Sample { channel, counter, value });
            }
        }
        self.old_counter = counter;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_group(id: u8, raw: i32) -> [u8; 4] {
        let b = raw.to_le_bytes();
        [id, b[0], b[1], b[2]]
    }

    #[test]
    fn decodes_a_full_cycle_of_eight_channels() {
        let mut decoder = Evm8Decoder::new();
        let mut block = Vec::new();
        for channel in 0u8..8 {
            let id_byte = (channel << 5) | (0 << 2) | 0b01;
            block.extend(sample_group(id_byte, 100 * channel as i32));
        }
        let records = decoder.decode_blocks(&block);
        assert_eq!(records.len(), 8);
        for (i, rec) in records.iter().enumerate() {
            match rec {
                Record::Sample { channel, counter, value } => {
                    assert_eq!(*channel, i as u8);
                    assert_eq!(*counter, 0);
                    assert_eq!(*value, (100 * i as i32) as f32);
                }
                other => panic!("unexpected record {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_sample_with_data_bit_unset() {
        let mut decoder = Evm8Decoder::new();
        let block = vec![0u8; 32]; // every group's id byte is 0 -> bit0 unset throughout
        let records = decoder.decode_blocks(&block);
        assert_eq!(records.len(), 8);
        assert!(records.iter().all(|r| matches!(r, Record::Invalid(InvalidKind::DataBit))));
    }

    #[test]
    fn timer_samples_emit_timestamps_and_a_position_derived_value_sample() {
        let mut decoder = Evm8Decoder::new();
        let mut data = Vec::new();
        // 16 timer samples (bit1 set): first 8 build T1, next 8 build T2.
        for i in 0..16u8 {
            let id_byte = 0b11 | ((i % 2) << 4);
            data.extend(sample_group(id_byte, 0));
        }
        let records = decoder.decode_blocks(&data);
        // 16 value-samples (one per timer group, Design Notes #3 fallthrough) plus 3 timestamp records
        // inserted right when T2 completes (after the 16th group).
        let timestamp_count = records.iter().filter(|r| r.is_priority()).count();
        assert_eq!(timestamp_count, 3);
        let sample_count = records.iter().filter(|r| matches!(r, Record::Sample { .. })).count();
        assert_eq!(sample_count, 16);
    }
}

use crate::info::RegisterInfo;

/// One wire sub-request produced by [`split_regs_range`] (`spec.md` §4.3 `read_regs_range`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadChunk {
    /// `Registry_Read(start_idx, count)` — `count` whole registers starting at `start_idx`.
    Range { start_idx: u16, count: u8 },
    /// `Registry_Read(reg_idx, elem_start, elem_count)` — a slice of array elements out of a
    /// single register too wide to fit the packet budget on its own.
    Elements { reg_idx: u16, elem_start: u16, elem_count: u8 },
}

/// Plans the wire requests needed to read registers `[start_idx, stop_idx)`, keeping each
/// request within `max_chunk` bytes of register data (`spec.md` §4.3 "MTU-aware range
/// splitting"). Whole registers are batched into `Range` chunks; a register whose own
/// serialized form exceeds `max_chunk` is further split into `Elements` chunks
/// (`spec.md` §4.3 step "a single register whose serialized form exceeds the packet budget
/// is further split into element ranges").
pub fn split_regs_range(regs: &[RegisterInfo], start_idx: u16, stop_idx: u16, max_chunk: usize) -> Vec<ReadChunk> {
    let max_chunk = max_chunk.max(1);
    let mut out = Vec::new();
    let mut idx = start_idx;
    let mut range_start: Option<u16> = None;
    let mut range_bytes = 0usize;
    let mut range_count: u8 = 0;

    while idx < stop_idx {
        let reg = &regs[idx as usize];
        let reg_bytes = reg.byte_len();

        if reg_bytes > max_chunk {
            flush_range(&mut out, &mut range_start, &mut range_count);
            range_bytes = 0;
            push_element_chunks(&mut out, idx, reg, max_chunk);
            idx += 1;
            continue;
        }

        let starts_new_range = range_start.is_none() || range_bytes + reg_bytes > max_chunk || range_count == u8::MAX;
        if starts_new_range {
            flush_range(&mut out, &mut range_start, &mut range_count);
            range_start = Some(idx);
            range_bytes = 0;
        }
        range_bytes += reg_bytes;
        range_count += 1;
        idx += 1;
    }
    flush_range(&mut out, &mut range_start, &mut range_count);
    out
}

fn flush_range(out: &mut Vec<ReadChunk>, range_start: &mut Option<u16>, range_count: &mut u8) {
    if let Some(start_idx) = range_start.take() {
        if *range_count > 0 {
            out.push(ReadChunk::Range { start_idx, count: *range_count });
        }
    }
    *range_count = 0;
}

fn push_element_chunks(out: &mut Vec<ReadChunk>, reg_idx: u16, reg: &RegisterInfo, max_chunk: usize) {
    let elem_width = reg.element_width().max(1);
    let elems_per_chunk = ((max_chunk / elem_width).max(1) as u16).min(u8::MAX as u16);
    let total_elems = reg.array_size as u16;
    let mut elem_start = 0u16;
    while elem_start < total_elems {
        let elem_count = elems_per_chunk.min(total_elems - elem_start);
        out.push(ReadChunk::Elements { reg_idx, elem_start, elem_count: elem_count as u8 });
        elem_start += elem_count;
    }
}

use crate::header::HeaderInfo;

/// Why a 4-byte sample group was dropped instead of decoded (`spec.md` §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidKind {
    DataBit,
    DataCounter,
    DataId,
}

/// One item produced by the EVM8 decode/stream pipeline and handed to the consumer FIFO
/// (`spec.md` §4.6).
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Header(HeaderInfo),
    Sample { channel: u8, counter: u8, value: f32 },
    TimeStamp0(i64),
    TimeStamp1(i64),
    TimeStampDiff(i64),
    Invalid(InvalidKind),
    Timeout,
    Done,
}

impl Record {
    /// Timestamp records are pushed to the *front* of the consumer queue instead of the back
    /// (`spec.md` §4.6 "priority-queued").
    pub fn is_priority(&self) -> bool {
        matches!(self, Record::TimeStamp0(_) | Record::TimeStamp1(_) | Record::TimeStampDiff(_))
    }
}

use crate::fault::{Anomaly, ErrorRecord};
use crate::protocol::{encode_error, ErrorMessage, ERROR_MESSAGE_LEN};
use tracing::{trace, warn};

pub const ERROR_LOG_CAPACITY: usize = 16;

/// Fixed-capacity ring of error packets waiting for the radio.
///
/// Records are encoded when pushed so the radio only copies bytes out.
/// Pushing into a full log overwrites the oldest unread packet.
#[derive(Debug)]
pub struct ErrorLog {
    slots: [ErrorMessage; ERROR_LOG_CAPACITY],
    write: usize,
    read: usize,
    count: usize,
    overwritten: u32,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self {
            slots: [[0; ERROR_MESSAGE_LEN]; ERROR_LOG_CAPACITY],
            write: 0,
            read: 0,
            count: 0,
            overwritten: 0,
        }
    }

    pub fn init(&mut self) {
        self.write = 0;
        self.read = 0;
        self.count = 0;
        self.overwritten = 0;
    }

    pub fn push(&mut self, record: &ErrorRecord) {
        trace!(
            board = record.board_id(),
            kind = ?record.kind(),
            "queueing error record"
        );

        self.slots[self.write] = encode_error(record);
        self.write = (self.write + 1) % ERROR_LOG_CAPACITY;

        if self.count == ERROR_LOG_CAPACITY {
            // The oldest unread packet was just overwritten
            self.read = (self.read + 1) % ERROR_LOG_CAPACITY;
            self.overwritten = self.overwritten.wrapping_add(1);
            warn!(overwritten = self.overwritten, "error log full, dropped oldest packet");
        } else {
            self.count += 1;
        }
    }

    /// Records an anomaly detected by the radio board itself. Anomalies that
    /// are never sent to the ground are dropped; returns whether a record was
    /// queued.
    pub fn raise(&mut self, anomaly: Anomaly, payload: [u8; 4]) -> bool {
        match anomaly.error_kind() {
            Some(kind) => {
                self.push(&ErrorRecord::local(kind, payload));
                true
            }
            None => false,
        }
    }

    pub fn pop(&mut self) -> Option<ErrorMessage> {
        if self.count == 0 {
            return None;
        }

        let packet = self.slots[self.read];
        self.read = (self.read + 1) % ERROR_LOG_CAPACITY;
        self.count -= 1;
        Some(packet)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of packets lost to overwriting since the last `init`.
    pub fn overwritten(&self) -> u32 {
        self.overwritten
    }
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::ErrorKind;
    use crate::protocol::decode_error;

    fn record(board_id: u8, tag: u8) -> ErrorRecord {
        ErrorRecord::new(board_id, ErrorKind::BusOverCurrent, [tag, 0, 0, 0])
    }

    #[test]
    fn test_pop_empty_log() {
        let mut log = ErrorLog::new();
        assert!(log.pop().is_none());
        assert!(log.is_empty());
    }

    #[test]
    fn test_fifo_order_across_wrap() {
        let mut log = ErrorLog::new();
        for round in 0..3u8 {
            for i in 0..10u8 {
                log.push(&record(1, round * 10 + i));
            }
            for i in 0..10u8 {
                let packet = log.pop().unwrap();
                assert_eq!(decode_error(&packet).unwrap().payload()[0], round * 10 + i);
            }
        }
        assert!(log.is_empty());
    }

    #[test]
    fn test_full_log_overwrites_oldest() {
        let mut log = ErrorLog::new();
        for i in 0..(ERROR_LOG_CAPACITY as u8 + 3) {
            log.push(&record(2, i));
        }

        assert_eq!(log.len(), ERROR_LOG_CAPACITY);
        assert_eq!(log.overwritten(), 3);

        let first = decode_error(&log.pop().unwrap()).unwrap();
        assert_eq!(first.payload()[0], 3);
    }

    #[test]
    fn test_raise_skips_unrecorded_anomalies() {
        let mut log = ErrorLog::new();
        assert!(!log.raise(Anomaly::ChecksumMismatch, [0; 4]));
        assert!(log.is_empty());

        assert!(log.raise(Anomaly::EncodingDefect, [b'X', b'E', 0, 0]));
        let record = decode_error(&log.pop().unwrap()).unwrap();
        assert_eq!(record.kind(), ErrorKind::EncodingDefect);
        assert_eq!(record.board_id(), crate::can::RADIO_BOARD_ID);
    }

    #[test]
    fn test_init_discards_pending_packets() {
        let mut log = ErrorLog::new();
        log.push(&record(3, 1));
        log.init();
        assert!(log.pop().is_none());
    }
}

#[cfg(test)]
mod tests {
    use crate::wal::tests::helpers::{BLOCK, LogHarness, big_string};

    /// Layout used by every test here:
    ///
    /// - record A: 10 000 bytes, starts at offset 0
    /// - record B: 10 000 bytes, starts at offset 10 007
    /// - record C: 2 blocks long, fragmented over blocks 0..=2
    /// - record D: 10 000 bytes, after C
    fn build() -> LogHarness {
        let mut harness = LogHarness::new();
        harness.write(&big_string(b'a', 10_000));
        harness.write(&big_string(b'b', 10_000));
        harness.write(&big_string(b'c', 2 * BLOCK));
        harness.write(&big_string(b'd', 10_000));
        harness
    }

    fn read_from(harness: &LogHarness, initial_offset: u64) -> Vec<Vec<u8>> {
        let mut reader = harness.reader_from(initial_offset);
        let mut records = Vec::new();
        let mut record = Vec::new();
        while reader.read_record(&mut record) {
            records.push(record.clone());
        }
        records
    }

    #[test]
    fn test_offset_zero_reads_everything() {
        let harness = build();
        let records = read_from(&harness, 0);
        assert_eq!(records.len(), 4);
        assert_eq!(records[0], big_string(b'a', 10_000));
        assert_eq!(records[3], big_string(b'd', 10_000));
    }

    #[test]
    fn test_offset_inside_first_record_skips_it() {
        let harness = build();
        let records = read_from(&harness, 1);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], big_string(b'b', 10_000));
        assert_eq!(harness.reporter.lock().unwrap().reports, 0);
    }

    #[test]
    fn test_last_record_offset_after_skip() {
        let harness = build();
        let mut reader = harness.reader_from(1);
        let mut record = Vec::new();
        assert!(reader.read_record(&mut record));
        assert_eq!(record, big_string(b'b', 10_000));
        // B begins immediately after A's framing.
        assert_eq!(reader.last_record_offset(), 10_007);
    }

    #[test]
    fn test_offset_inside_fragmented_record_resyncs() {
        let harness = build();
        // Land in the middle of C's second fragment; the reader must
        // discard C's remaining fragments without reporting corruption.
        let records = read_from(&harness, (BLOCK + 100) as u64);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], big_string(b'd', 10_000));
        assert_eq!(harness.reporter.lock().unwrap().reports, 0);
    }

    #[test]
    fn test_offset_in_block_trailer_rounds_to_next_block() {
        let harness = build();
        // Offsets within the final 6 bytes of a block cannot start a
        // record; the reader begins at the following block.
        let records = read_from(&harness, (BLOCK - 3) as u64);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], big_string(b'd', 10_000));
    }

    #[test]
    fn test_offset_past_eof_reads_nothing() {
        let harness = build();
        let total = harness.written_bytes() as u64;
        assert!(read_from(&harness, total + BLOCK as u64).is_empty());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::comparator::{BytewiseComparator, Comparator};
    use crate::iterator::Iter;
    use crate::sstable::block::{Block, BlockBuilder, BlockIterator};

    fn cmp() -> Arc<dyn Comparator> {
        Arc::new(BytewiseComparator)
    }

    fn build(entries: &[(&[u8], &[u8])], restart_interval: usize) -> Arc<Block> {
        let mut builder = BlockBuilder::new(restart_interval, cmp());
        for (key, value) in entries {
            builder.add(key, value);
        }
        Arc::new(Block::new(builder.finish().to_vec()).unwrap())
    }

    fn entries_about_prefixes() -> Vec<(Vec<u8>, Vec<u8>)> {
        // Heavy shared prefixes to exercise delta encoding.
        let mut entries = Vec::new();
        for i in 0..300usize {
            entries.push((
                format!("prefix/shared/{i:05}").into_bytes(),
                format!("value-{i}").into_bytes(),
            ));
        }
        entries
    }

    fn collect_forward(iter: &mut BlockIterator) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut out = Vec::new();
        iter.seek_to_first();
        while iter.valid() {
            out.push((iter.key().to_vec(), iter.value().to_vec()));
            iter.next();
        }
        out
    }

    #[test]
    fn test_empty_block() {
        let block = build(&[], 16);
        let mut iter = block.iter(cmp());
        iter.seek_to_first();
        assert!(!iter.valid());
        iter.seek_to_last();
        assert!(!iter.valid());
        iter.seek(b"anything");
        assert!(!iter.valid());
        assert!(iter.status().is_ok());
    }

    #[test]
    fn test_forward_and_backward_agree() {
        for restart_interval in [1usize, 2, 16, 128] {
            let entries = entries_about_prefixes();
            let refs: Vec<(&[u8], &[u8])> = entries
                .iter()
                .map(|(k, v)| (k.as_slice(), v.as_slice()))
                .collect();
            let block = build(&refs, restart_interval);
            let mut iter = block.iter(cmp());

            let forward = collect_forward(&mut iter);
            assert_eq!(forward.len(), entries.len());
            for (got, want) in forward.iter().zip(entries.iter()) {
                assert_eq!(got.0, want.0, "interval {restart_interval}");
                assert_eq!(got.1, want.1);
            }

            let mut backward = Vec::new();
            iter.seek_to_last();
            while iter.valid() {
                backward.push((iter.key().to_vec(), iter.value().to_vec()));
                iter.prev();
            }
            backward.reverse();
            assert_eq!(forward, backward, "interval {restart_interval}");
        }
    }

    #[test]
    fn test_seek_lands_on_least_upper_bound() {
        let block = build(
            &[
                (b"b", b"1"),
                (b"d", b"2"),
                (b"f", b"3"),
                (b"h", b"4"),
                (b"j", b"5"),
            ],
            2,
        );
        let mut iter = block.iter(cmp());

        iter.seek(b"a");
        assert!(iter.valid());
        assert_eq!(iter.key(), b"b");

        iter.seek(b"d");
        assert_eq!(iter.key(), b"d");

        iter.seek(b"e");
        assert_eq!(iter.key(), b"f");

        iter.seek(b"j");
        assert_eq!(iter.key(), b"j");

        iter.seek(b"k");
        assert!(!iter.valid());
    }

    #[test]
    fn test_seek_on_restart_key() {
        // Restart interval 1 makes every key a restart key; the binary
        // search's tie-breaking must still land exactly on the target.
        let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..50usize)
            .map(|i| (format!("key{i:03}").into_bytes(), vec![i as u8]))
            .collect();
        let refs: Vec<(&[u8], &[u8])> = entries
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
            .collect();
        let block = build(&refs, 1);
        let mut iter = block.iter(cmp());

        for (key, value) in &entries {
            iter.seek(key);
            assert!(iter.valid());
            assert_eq!(iter.key(), key.as_slice());
            assert_eq!(iter.value(), value.as_slice());
        }
    }

    #[test]
    fn test_seek_then_scan_yields_suffix() {
        let entries = entries_about_prefixes();
        let refs: Vec<(&[u8], &[u8])> = entries
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
            .collect();
        let block = build(&refs, 16);
        let mut iter = block.iter(cmp());

        let target = &entries[137].0;
        iter.seek(target);
        let mut rest = Vec::new();
        while iter.valid() {
            rest.push(iter.key().to_vec());
            iter.next();
        }
        let expected: Vec<Vec<u8>> = entries[137..].iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(rest, expected);
    }

    #[test]
    fn test_seek_reuses_position_moving_forward() {
        let entries = entries_about_prefixes();
        let refs: Vec<(&[u8], &[u8])> = entries
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
            .collect();
        let block = build(&refs, 16);
        let mut iter = block.iter(cmp());

        iter.seek(&entries[10].0);
        assert_eq!(iter.key(), entries[10].0.as_slice());
        // Seeking ahead from a positioned iterator.
        iter.seek(&entries[250].0);
        assert_eq!(iter.key(), entries[250].0.as_slice());
        // And right back.
        iter.seek(&entries[0].0);
        assert_eq!(iter.key(), entries[0].0.as_slice());
    }

    #[test]
    fn test_single_byte_header_fast_path_round_trips() {
        // Entries small enough for the 3-single-byte header, mixed with
        // one entry large enough to force varint headers.
        let large_value = vec![0x61u8; 300];
        let block = build(
            &[
                (b"a", b"tiny"),
                (b"b", large_value.as_slice()),
                (b"c", b"small"),
            ],
            16,
        );
        let mut iter = block.iter(cmp());
        let all = collect_forward(&mut iter);
        assert_eq!(all[1].1, large_value);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_current_size_estimate_tracks_finish() {
        let mut builder = BlockBuilder::new(16, cmp());
        assert_eq!(builder.current_size_estimate(), 8); // empty restart array
        builder.add(b"aaa", b"bbb");
        let estimate = builder.current_size_estimate();
        let finished_len = builder.finish().len();
        assert_eq!(estimate, finished_len);
    }

    #[test]
    fn test_reset_allows_reuse() {
        let mut builder = BlockBuilder::new(16, cmp());
        builder.add(b"zz", b"1");
        let _ = builder.finish();
        builder.reset();
        assert!(builder.is_empty());
        // After reset, smaller keys are legal again.
        builder.add(b"aa", b"2");
        let block = Arc::new(Block::new(builder.finish().to_vec()).unwrap());
        let mut iter = block.iter(cmp());
        iter.seek_to_first();
        assert_eq!(iter.key(), b"aa");
    }

    #[test]
    fn test_corrupt_restart_count_rejected() {
        // A block claiming more restarts than could fit.
        let bytes = vec![0xFF, 0xFF, 0xFF, 0xFF];
        assert!(Block::new(bytes).is_err());
        assert!(Block::new(vec![1, 2]).is_err());
    }

    #[test]
    fn test_corrupt_entry_sets_status() {
        // One valid restart pointing at garbage entry bytes.
        let mut bytes = vec![
            0x05, 0x05, 0x05, // header claiming shared=5 with no prior key
            b'x', b'y',
        ];
        bytes.extend_from_slice(&0u32.to_le_bytes()); // restart[0] = 0
        bytes.extend_from_slice(&1u32.to_le_bytes()); // num_restarts = 1
        let block = Arc::new(Block::new(bytes).unwrap());
        let mut iter = block.iter(cmp());
        iter.seek_to_first();
        assert!(!iter.valid());
        assert!(iter.status().is_err());
    }
}

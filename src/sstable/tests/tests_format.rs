#[cfg(test)]
mod tests {
    use crate::sstable::{BLOCK_TRAILER_SIZE, BlockHandle, FOOTER_ENCODED_LENGTH, Footer};

    #[test]
    fn test_block_handle_round_trip() {
        for (offset, size) in [(0u64, 0u64), (300, 100), (1 << 40, 1 << 20), (u64::MAX, 1)] {
            let handle = BlockHandle::new(offset, size);
            let mut encoded = Vec::new();
            handle.encode_to(&mut encoded);
            assert!(encoded.len() <= 20);
            let (decoded, consumed) = BlockHandle::decode_from(&encoded).unwrap();
            assert_eq!(decoded, handle);
            assert_eq!(consumed, encoded.len());
        }
    }

    #[test]
    fn test_block_handle_rejects_truncation() {
        let handle = BlockHandle::new(1 << 40, 1 << 30);
        let mut encoded = Vec::new();
        handle.encode_to(&mut encoded);
        assert!(BlockHandle::decode_from(&encoded[..encoded.len() - 1]).is_err());
    }

    #[test]
    fn test_footer_round_trip() {
        let footer = Footer::new(BlockHandle::new(300, 100), BlockHandle::new(401, 1000));
        let encoded = footer.encoded();
        assert_eq!(encoded.len(), FOOTER_ENCODED_LENGTH);
        assert_eq!(FOOTER_ENCODED_LENGTH, 48);

        let decoded = Footer::decode_from(&encoded).unwrap();
        let re_encoded = decoded.encoded();
        assert_eq!(encoded, re_encoded);
    }

    #[test]
    fn test_footer_bad_magic() {
        let footer = Footer::new(BlockHandle::new(300, 100), BlockHandle::new(401, 1000));
        let mut encoded = footer.encoded();
        let last = encoded.len() - 1;
        encoded[last] = encoded[last].wrapping_add(1);

        let err = Footer::decode_from(&encoded).unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("bad magic number"));
    }

    #[test]
    fn test_trailer_size() {
        assert_eq!(BLOCK_TRAILER_SIZE, 5);
    }
}

#[cfg(test)]
mod tests {
    use crate::key::{
        InternalKey, LookupKey, MAX_SEQUENCE_NUMBER, ParsedInternalKey, SequenceNumber, ValueType,
        append_internal_key, extract_user_key, parse_internal_key,
    };

    fn ikey(user_key: &[u8], seq: SequenceNumber, vt: ValueType) -> Vec<u8> {
        let mut encoded = Vec::new();
        append_internal_key(
            &mut encoded,
            &ParsedInternalKey {
                user_key,
                sequence: seq,
                value_type: vt,
            },
        );
        encoded
    }

    #[test]
    fn test_parse_round_trip() {
        let keys: &[&[u8]] = &[b"", b"k", b"hello", b"longggggggggggggggggggggg"];
        let sequences: &[SequenceNumber] = &[
            1,
            2,
            3,
            (1 << 8) - 1,
            1 << 8,
            (1 << 8) + 1,
            (1 << 16) - 1,
            1 << 16,
            (1 << 16) + 1,
            (1 << 32) - 1,
            1 << 32,
            (1 << 32) + 1,
            MAX_SEQUENCE_NUMBER,
        ];

        for &key in keys {
            for &seq in sequences {
                for vt in [ValueType::Value, ValueType::Deletion] {
                    let encoded = ikey(key, seq, vt);
                    let parsed = parse_internal_key(&encoded).unwrap();
                    assert_eq!(parsed.user_key, key);
                    assert_eq!(parsed.sequence, seq);
                    assert_eq!(parsed.value_type, vt);
                    assert_eq!(extract_user_key(&encoded), key);
                }
            }
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_internal_key(b"").is_none());
        assert!(parse_internal_key(b"short").is_none());

        // Unknown value type byte.
        let mut encoded = ikey(b"foo", 7, ValueType::Value);
        let tag_start = encoded.len() - 8;
        encoded[tag_start] = 0x7F;
        assert!(parse_internal_key(&encoded).is_none());
    }

    #[test]
    fn test_internal_key_accessors() {
        let k = InternalKey::new(b"user", 42, ValueType::Value);
        assert_eq!(k.user_key(), b"user");
        assert_eq!(k.encoded(), ikey(b"user", 42, ValueType::Value).as_slice());

        let decoded = InternalKey::decode_from(k.encoded());
        assert_eq!(decoded, k);
    }

    #[test]
    fn test_lookup_key_framings() {
        let lk = LookupKey::new(b"foo", 99);
        assert_eq!(lk.user_key(), b"foo");
        assert_eq!(lk.internal_key().len(), 3 + 8);
        // memtable key = varint32(11) ‖ internal key
        assert_eq!(lk.memtable_key()[0], 11);
        assert_eq!(&lk.memtable_key()[1..], lk.internal_key());
        let parsed = parse_internal_key(lk.internal_key()).unwrap();
        assert_eq!(parsed.sequence, 99);
        assert_eq!(parsed.value_type, ValueType::Value);
    }

    #[test]
    fn test_internal_filter_policy_strips_tags() {
        use std::sync::Arc;

        use crate::filter::{BloomFilterPolicy, FilterPolicy};
        use crate::key::InternalFilterPolicy;

        let policy = InternalFilterPolicy::new(Arc::new(BloomFilterPolicy::default()));
        let stored: Vec<Vec<u8>> = (0..100u64)
            .map(|i| ikey(format!("key{i}").as_bytes(), i + 1, ValueType::Value))
            .collect();
        let key_refs: Vec<&[u8]> = stored.iter().map(Vec::as_slice).collect();
        let mut filter = Vec::new();
        policy.create_filter(&key_refs, &mut filter);

        // A probe at a totally different sequence number still matches.
        for i in 0..100u64 {
            let probe = ikey(format!("key{i}").as_bytes(), 999_999, ValueType::Value);
            assert!(policy.key_may_match(&probe, &filter));
        }
    }

    #[test]
    fn test_lookup_key_heap_spill() {
        // Far beyond the inline buffer.
        let user_key = vec![0x42u8; 4096];
        let lk = LookupKey::new(&user_key, 5);
        assert_eq!(lk.user_key(), user_key.as_slice());
        let parsed = parse_internal_key(lk.internal_key()).unwrap();
        assert_eq!(parsed.sequence, 5);
    }
}

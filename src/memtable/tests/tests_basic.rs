#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::comparator::BytewiseComparator;
    use crate::iterator::Iter;
    use crate::key::{
        InternalKey, InternalKeyComparator, LookupKey, ValueType, parse_internal_key,
    };
    use crate::memtable::MemTable;

    fn new_mem() -> MemTable {
        MemTable::new(InternalKeyComparator::new(Arc::new(BytewiseComparator)))
    }

    #[test]
    fn test_get_on_empty() {
        let mem = new_mem();
        assert!(mem.get(&LookupKey::new(b"foo", 100)).is_none());
    }

    #[test]
    fn test_add_then_get() {
        let mem = new_mem();
        mem.add(10, ValueType::Value, b"foo", b"v1");
        mem.add(11, ValueType::Value, b"bar", b"v2");

        let got = mem.get(&LookupKey::new(b"foo", 100)).unwrap().unwrap();
        assert_eq!(got, b"v1");
        let got = mem.get(&LookupKey::new(b"bar", 100)).unwrap().unwrap();
        assert_eq!(got, b"v2");
        assert!(mem.get(&LookupKey::new(b"baz", 100)).is_none());
    }

    #[test]
    fn test_snapshot_sequence_visibility() {
        let mem = new_mem();
        mem.add(10, ValueType::Value, b"k", b"old");
        mem.add(20, ValueType::Value, b"k", b"new");

        // A lookup at sequence 15 must not see the write at 20.
        let got = mem.get(&LookupKey::new(b"k", 15)).unwrap().unwrap();
        assert_eq!(got, b"old");
        let got = mem.get(&LookupKey::new(b"k", 25)).unwrap().unwrap();
        assert_eq!(got, b"new");
        // Below every version: nothing visible.
        assert!(mem.get(&LookupKey::new(b"k", 5)).is_none());
    }

    #[test]
    fn test_tombstone_reports_not_found() {
        let mem = new_mem();
        mem.add(10, ValueType::Value, b"k", b"v");
        mem.add(20, ValueType::Deletion, b"k", b"");

        let err = mem.get(&LookupKey::new(b"k", 30)).unwrap().unwrap_err();
        assert!(err.is_not_found());
        // The older value is still visible below the tombstone.
        let got = mem.get(&LookupKey::new(b"k", 15)).unwrap().unwrap();
        assert_eq!(got, b"v");
    }

    #[test]
    fn test_iterator_orders_by_user_key_then_sequence_desc() {
        let mem = new_mem();
        mem.add(100, ValueType::Value, b"foo", b"a");
        mem.add(102, ValueType::Value, b"foo", b"c");
        mem.add(101, ValueType::Value, b"bar", b"b");

        let mut iter = mem.iter();
        iter.seek_to_first();

        let mut seen = Vec::new();
        while iter.valid() {
            let parsed = parse_internal_key(iter.key()).unwrap();
            seen.push((
                parsed.user_key.to_vec(),
                parsed.sequence,
                iter.value().to_vec(),
            ));
            iter.next();
        }
        assert_eq!(
            seen,
            vec![
                (b"bar".to_vec(), 101, b"b".to_vec()),
                (b"foo".to_vec(), 102, b"c".to_vec()),
                (b"foo".to_vec(), 100, b"a".to_vec()),
            ]
        );
    }

    #[test]
    fn test_iterator_seek() {
        let mem = new_mem();
        for (seq, k) in [(1u64, "a"), (2, "c"), (3, "e")] {
            mem.add(seq, ValueType::Value, k.as_bytes(), b"v");
        }

        let mut iter = mem.iter();
        let target = InternalKey::new(b"b", u64::MAX >> 8, ValueType::Value);
        iter.seek(target.encoded());
        assert!(iter.valid());
        assert_eq!(parse_internal_key(iter.key()).unwrap().user_key, b"c");
    }

    #[test]
    fn test_memory_usage_grows() {
        let mem = new_mem();
        let before = mem.approximate_memory_usage();
        for i in 0..100u64 {
            mem.add(i + 1, ValueType::Value, format!("key{i}").as_bytes(), &[0x55; 100]);
        }
        assert!(mem.approximate_memory_usage() > before + 100 * 100);
    }

    #[test]
    fn test_empty_user_key_and_value() {
        let mem = new_mem();
        mem.add(1, ValueType::Value, b"", b"");
        let got = mem.get(&LookupKey::new(b"", 10)).unwrap().unwrap();
        assert!(got.is_empty());
    }
}

//! Generated protobuf types for SyncSpace
//!
//! Split into the public command surface (`v1`) and the storage structures
//! (`storage`) whose canonical encodings feed hashing and signing.

/// Command requests, responses, and event records.
pub mod v1 {
    include!(concat!(env!("OUT_DIR"), "/syncspace.v1.rs"));
}

/// Storage types: changes, signed changes, space-create payloads.
pub mod storage {
    include!(concat!(env!("OUT_DIR"), "/syncspace.storage.rs"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_change_roundtrip() {
        let change = storage::Change {
            version: 1,
            space_id: "ab".repeat(32),
            parent_ids: vec!["cd".repeat(32)],
            payload: b"hello".to_vec(),
            change_type: "document".to_string(),
            is_snapshot: false,
            timestamp: 1_700_000_000,
            author_device: vec![7u8; 32],
        };

        let bytes = change.encode_to_vec();
        let decoded = storage::Change::decode(&bytes[..]).unwrap();
        assert_eq!(decoded, change);
    }

    #[test]
    fn test_change_encoding_is_stable() {
        let make = || storage::Change {
            version: 1,
            space_id: "00".repeat(32),
            parent_ids: vec![],
            payload: b"x".to_vec(),
            change_type: "document".to_string(),
            is_snapshot: false,
            timestamp: 42,
            author_device: vec![1u8; 32],
        };
        assert_eq!(make().encode_to_vec(), make().encode_to_vec());
    }

    #[test]
    fn test_document_info_defaults() {
        let info = v1::DocumentInfo::default();
        assert!(info.document_id.is_empty());
        assert_eq!(info.version, 0);
    }
}

use proptest::prelude::*;
use vcs_hash::hex::{hex_decode, hex_to_string, is_hex_digits};
use vcs_hash::ObjectId;

proptest! {
    #[test]
    fn encode_decode_roundtrip(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let hex = hex_to_string(&bytes);
        prop_assert_eq!(hex.len(), bytes.len() * 2);
        let mut decoded = vec![0u8; bytes.len()];
        hex_decode(&hex, &mut decoded).unwrap();
        prop_assert_eq!(decoded, bytes);
    }

    #[test]
    fn encoded_output_is_valid_hex(bytes in proptest::collection::vec(any::<u8>(), 1..64)) {
        prop_assert!(is_hex_digits(&hex_to_string(&bytes)));
    }

    #[test]
    fn oid_hex_roundtrip(bytes in proptest::collection::vec(any::<u8>(), 20..=20)) {
        let id = ObjectId::from_bytes(&bytes).unwrap();
        let reparsed = ObjectId::from_hex(&id.to_hex()).unwrap();
        prop_assert_eq!(reparsed, id);
    }

    #[test]
    fn oid_ordering_matches_byte_ordering(
        a in proptest::collection::vec(any::<u8>(), 20..=20),
        b in proptest::collection::vec(any::<u8>(), 20..=20),
    ) {
        let oa = ObjectId::from_bytes(&a).unwrap();
        let ob = ObjectId::from_bytes(&b).unwrap();
        prop_assert_eq!(oa.cmp(&ob), a.cmp(&b));
    }
}

//! Properties of the key and wire encodings.

use dps_lib::codec;
use proptest::prelude::*;

proptest! {
  #[test]
  fn base64_roundtrips(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
    let encoded = codec::encode_base64(&bytes);
    prop_assert_eq!(codec::decode_base64(&encoded).unwrap(), bytes);
  }

  #[test]
  fn wire_prefix_roundtrips(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
    let wire = codec::wire_encode(&bytes);
    prop_assert_eq!(codec::strip_wire_prefix(&wire).unwrap(), bytes.as_slice());
  }

  #[test]
  fn store_name_roots_never_collide(a in ".{0,24}", b in ".{0,24}") {
    prop_assume!(a != b);
    prop_assert_ne!(codec::store_name_root(a.as_bytes()), codec::store_name_root(b.as_bytes()));
  }

  #[test]
  fn item_keys_stay_in_their_store(id in 1u64..10_000, key in "[A-Za-z0-9+/=]{0,16}") {
    let item = codec::data_item_key(id, &key);
    let expected = format!("3{id}_");
    prop_assert!(item.starts_with(&expected));
  }
}

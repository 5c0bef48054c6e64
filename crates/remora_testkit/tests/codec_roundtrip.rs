//! Wire encoding properties over generated values.

use proptest::prelude::*;
use remora_codec::{decode, Encoder, FieldOperation, PointerEncoder, Value};
use remora_testkit::generators::{canonical_value_strategy, field_operation_strategy};

proptest! {
    #[test]
    fn prop_canonical_values_decode_to_themselves(value in canonical_value_strategy()) {
        let doc = PointerEncoder.encode(&value).unwrap();
        prop_assert_eq!(decode(&doc).unwrap(), value);
    }

    #[test]
    fn prop_encoding_is_stable(value in canonical_value_strategy()) {
        let first = PointerEncoder.encode(&value).unwrap();
        let second = PointerEncoder.encode(&decode(&first).unwrap()).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_operations_survive_the_wire(op in field_operation_strategy()) {
        let doc = op.encode(&PointerEncoder).unwrap();
        let decoded = decode(&doc).unwrap();
        match &op {
            FieldOperation::Set(value) => prop_assert_eq!(&decoded, value),
            _ => prop_assert_eq!(decoded, Value::Operation(Box::new(op.clone()))),
        }
    }
}

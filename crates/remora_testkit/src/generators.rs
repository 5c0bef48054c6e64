//! Property-based test generators using proptest.
//!
//! The value strategies only produce values whose wire form is canonical:
//! finite floats, millisecond dates, map keys that cannot be mistaken for
//! `__type`/`__op` tags, and saved pointers.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use remora_codec::{EntityRef, FieldOperation, GeoPoint, Value};

/// Strategy for class names.
pub fn class_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-zA-Z0-9]{0,11}").expect("Invalid regex")
}

/// Strategy for field keys.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9]{0,9}").expect("Invalid regex")
}

/// Strategy for references to saved entities.
pub fn saved_ref_strategy() -> impl Strategy<Value = EntityRef> {
    (
        class_name_strategy(),
        prop::string::string_regex("[a-zA-Z0-9]{10}").expect("Invalid regex"),
    )
        .prop_map(|(class, id)| EntityRef::saved(class, id))
}

/// Strategy for dates with millisecond precision between 1970 and 2100.
pub fn date_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_102_444_800_000)
        .prop_filter_map("timestamp in range", |ms| Utc.timestamp_millis_opt(ms).single())
}

/// Strategy for valid geo points.
pub fn geo_point_strategy() -> impl Strategy<Value = GeoPoint> {
    (-90.0f64..=90.0, -180.0f64..=180.0)
        .prop_filter_map("coordinates in range", |(lat, lon)| GeoPoint::new(lat, lon).ok())
}

/// Strategy for leaf values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e12f64..1.0e12).prop_map(Value::Float),
        ".{0,16}".prop_map(Value::String),
        date_strategy().prop_map(Value::Date),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::Bytes),
        geo_point_strategy().prop_map(Value::GeoPoint),
        saved_ref_strategy().prop_map(Value::Pointer),
    ]
}

/// Strategy for nested values with a canonical wire form.
pub fn canonical_value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
            prop::collection::btree_map(key_strategy(), inner, 0..8)
                .prop_map(|entries| Value::map(entries)),
        ]
    })
}

/// Strategy for field operations on scalar values.
pub fn field_operation_strategy() -> impl Strategy<Value = FieldOperation> {
    let values = || prop::collection::vec(scalar_value_strategy(), 1..4);
    prop_oneof![
        scalar_value_strategy().prop_map(FieldOperation::Set),
        Just(FieldOperation::Delete),
        any::<i32>().prop_map(|n| FieldOperation::increment(n)),
        values().prop_map(FieldOperation::Add),
        values().prop_map(FieldOperation::AddUnique),
        values().prop_map(FieldOperation::Remove),
    ]
}

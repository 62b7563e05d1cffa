//! Fingerprints depend on request meaning, not on request spelling.

use meterguard::cache::{FingerprintGenerator, VOLATILE_FIELDS};
use meterguard::ApiType;
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

fn object(fields: &[(String, Value)]) -> Value {
    let mut map = Map::new();
    for (k, v) in fields {
        map.insert(k.clone(), v.clone());
    }
    Value::Object(map)
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[a-zA-Z0-9 ,.]{0,24}".prop_map(|s| Value::from(s.trim().to_string())),
    ]
}

fn params() -> impl Strategy<Value = BTreeMap<String, Value>> {
    prop::collection::btree_map("[a-z_]{1,10}", scalar(), 0..8)
}

proptest! {
    #[test]
    fn field_order_is_irrelevant(fields in params()) {
        let generator = FingerprintGenerator::new();
        let forward: Vec<_> = fields.clone().into_iter().collect();
        let mut backward = forward.clone();
        backward.reverse();
        prop_assert_eq!(
            generator.generate(ApiType::Geocoding, &object(&forward)),
            generator.generate(ApiType::Geocoding, &object(&backward))
        );
    }

    #[test]
    fn volatile_fields_are_ignored(fields in params(), idx in 0usize..VOLATILE_FIELDS.len(), noise in any::<u64>()) {
        let generator = FingerprintGenerator::new();
        let base: Vec<_> = fields.into_iter().collect();
        let mut noisy = base.clone();
        noisy.push((VOLATILE_FIELDS[idx].to_string(), json!(noise)));
        prop_assert_eq!(
            generator.generate(ApiType::Places, &object(&base)),
            generator.generate(ApiType::Places, &object(&noisy))
        );
    }

    #[test]
    fn distinct_values_give_distinct_fingerprints(a in "[a-z]{1,12}", b in "[a-z]{1,12}") {
        prop_assume!(a != b);
        let generator = FingerprintGenerator::new();
        prop_assert_ne!(
            generator.generate(ApiType::Geocoding, &json!({"address": a})),
            generator.generate(ApiType::Geocoding, &json!({"address": b}))
        );
    }
}

#[test]
fn api_type_is_part_of_the_fingerprint() {
    let generator = FingerprintGenerator::new();
    let params = json!({"lat": 1.5, "lng": 2.5});
    let a = generator.generate(ApiType::Elevation, &params);
    let b = generator.generate(ApiType::Timezone, &params);
    assert_ne!(a.hash, b.hash);
    assert_eq!(a.hash.len(), 64);
}

#[test]
fn nested_values_are_normalized() {
    let generator = FingerprintGenerator::new();
    let a = json!({"waypoints": [{"lat": 1, "name": " A "}], "options": {"avoid": "tolls", "nonce": 7}});
    let b = json!({"options": {"avoid": "tolls"}, "waypoints": [{"name": "A", "lat": 1}]});
    assert_eq!(generator.generate(ApiType::Routes, &a), generator.generate(ApiType::Routes, &b));

    // array order is meaningful
    let c = json!({"waypoints": [1, 2]});
    let d = json!({"waypoints": [2, 1]});
    assert_ne!(generator.generate(ApiType::Routes, &c), generator.generate(ApiType::Routes, &d));
}

#[test]
fn custom_volatile_fields_and_salt() {
    let plain = FingerprintGenerator::new();
    let custom = FingerprintGenerator::new().with_volatile_field("Session");
    let with_session = json!({"address": "X", "session": "s1"});
    let without = json!({"address": "X"});
    assert_ne!(plain.generate(ApiType::Geocoding, &with_session), plain.generate(ApiType::Geocoding, &without));
    assert_eq!(custom.generate(ApiType::Geocoding, &with_session), custom.generate(ApiType::Geocoding, &without));

    let salted = FingerprintGenerator::new().with_salt("v2");
    assert_ne!(salted.generate(ApiType::Geocoding, &without), plain.generate(ApiType::Geocoding, &without));
}

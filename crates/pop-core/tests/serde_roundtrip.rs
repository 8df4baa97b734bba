#![cfg(feature = "serde")]

use pop_core::Location;

#[test]
fn location_serializes_as_a_plain_struct() {
    let location = Location::new(-3, 12);
    let json = serde_json::to_string(&location).expect("serialize");
    assert_eq!(json, r#"{"x":-3,"y":12}"#);
    let back: Location = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, location);
}

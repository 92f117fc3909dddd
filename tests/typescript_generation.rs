//! TypeScript Generation Tests
//!
//! Validates that Holeshot enums can be exported to TypeScript when the tauri
//! feature is enabled.

#[cfg(feature = "tauri")]
#[test]
fn test_core_types_implement_specta_type() {
    use specta::Type;

    // If this compiles, all types are properly configured for TypeScript export.
    fn assert_type<T: Type>() {}

    assert_type::<holeshot::UpdateRate>();
    assert_type::<holeshot::Units>();
    assert_type::<holeshot::Band>();
    assert_type::<holeshot::BandType>();
    assert_type::<holeshot::TimingSystemType>();
    assert_type::<holeshot::RaceState>();
    assert_type::<holeshot::RoundType>();
    assert_type::<holeshot::PrimaryTimingSystemLocation>();
    assert_type::<holeshot::ValidityType>();
    assert_type::<holeshot::OrderingPolicy>();
}

#[cfg(not(feature = "tauri"))]
#[test]
fn test_tauri_feature_disabled() {
    // Types still compile without specta::Type
    let _ = holeshot::UpdateRate::Native;
    let _ = holeshot::RaceState::NotStarted;
}

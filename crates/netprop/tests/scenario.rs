use glam::Vec3;
use netprop::{
    BitWriter, DeltaError, DeltaReader, PackedBits, PropFlags, PropValue, SchemaRegistry, SendProp,
    SendTable, calc_delta, decode_entity, encode_entity, merge_deltas, write_prop_list,
};

fn registry() -> SchemaRegistry {
    let mut builder = SchemaRegistry::builder();
    builder
        .register(SendTable::new(
            "Bot",
            vec![
                SendProp::int("health", 12, PropFlags::UNSIGNED),
                SendProp::vector("pos", 0, 0.0, 0.0, PropFlags::COORD),
                SendProp::string("name"),
            ],
        ))
        .unwrap();
    builder.build().unwrap()
}

fn state(health: i64, pos: Vec3, name: &str) -> Vec<PropValue> {
    vec![health.into(), pos.into(), name.into()]
}

fn pack(registry: &SchemaRegistry, values: &[PropValue]) -> PackedBits {
    let schema = registry.flattened("Bot").unwrap();
    let mut writer = BitWriter::with_capacity_bytes(256);
    encode_entity(schema, values, &mut writer).unwrap();
    writer.finish()
}

#[test]
fn test_health_change_round_trip() {
    let registry = registry();
    let schema = registry.flattened("Bot").unwrap();
    let a = pack(&registry, &state(100, Vec3::ZERO, "bot"));
    let b = pack(&registry, &state(90, Vec3::ZERO, "bot"));

    let changed = calc_delta(schema, DeltaReader::from_bits(&a), DeltaReader::from_bits(&b)).unwrap();
    assert_eq!(changed, vec![0]);

    let mut delta = BitWriter::with_capacity_bytes(64);
    write_prop_list(schema, DeltaReader::from_bits(&b), &changed, &mut delta).unwrap();
    let delta = delta.finish();
    assert_eq!(
        DeltaReader::from_bits(&delta)
            .read_prop_index_list(schema)
            .unwrap(),
        vec![0]
    );

    let merged = merge_deltas(
        schema,
        DeltaReader::from_bits(&a),
        DeltaReader::from_bits(&delta),
    )
    .unwrap();
    assert_eq!(merged.changed, vec![0]);
    assert_eq!(merged.bits, b);

    let decoded = decode_entity(schema, DeltaReader::from_bits(&merged.bits)).unwrap();
    assert_eq!(decoded, state(90, Vec3::ZERO, "bot"));
}

#[test]
fn test_self_merge_is_unchanged() {
    let registry = registry();
    let schema = registry.flattened("Bot").unwrap();
    let a = pack(&registry, &state(4000, Vec3::new(-10.5, 3.25, 800.0), "walker"));

    let merged =
        merge_deltas(schema, DeltaReader::from_bits(&a), DeltaReader::from_bits(&a)).unwrap();
    assert!(merged.changed.is_empty());
    assert_eq!(merged.bits, a);
    assert!(
        calc_delta(schema, DeltaReader::from_bits(&a), DeltaReader::from_bits(&a))
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_delta_reapplied_reproduces_target() {
    let registry = registry();
    let schema = registry.flattened("Bot").unwrap();
    let a = pack(&registry, &state(100, Vec3::new(1.0, 2.0, 3.0), "red"));
    let b = pack(&registry, &state(100, Vec3::new(1.0, 2.5, 3.0), "blue"));

    let changed = calc_delta(schema, DeltaReader::from_bits(&a), DeltaReader::from_bits(&b)).unwrap();
    assert_eq!(changed, vec![1, 2]);

    let mut delta = BitWriter::with_capacity_bytes(64);
    write_prop_list(schema, DeltaReader::from_bits(&b), &changed, &mut delta).unwrap();
    let delta = delta.finish();

    let merged = merge_deltas(
        schema,
        DeltaReader::from_bits(&a),
        DeltaReader::from_bits(&delta),
    )
    .unwrap();
    assert_eq!(merged.bits, b);
}

#[test]
fn test_one_bit_short_overflows() {
    let registry = registry();
    let schema = registry.flattened("Bot").unwrap();
    let values = state(7, Vec3::new(100.0, -5.0, 0.5), "scout");
    let full_len = pack(&registry, &values).bit_len();

    let mut writer = BitWriter::with_capacity_bits(full_len - 1);
    let result = encode_entity(schema, &values, &mut writer);
    assert!(result.is_err());
    assert!(writer.overflowed());

    let mut writer = BitWriter::with_capacity_bits(full_len);
    encode_entity(schema, &values, &mut writer).unwrap();
    assert!(!writer.overflowed());
}

#[test]
fn test_truncated_stream_is_an_error() {
    let registry = registry();
    let schema = registry.flattened("Bot").unwrap();
    let full = pack(&registry, &state(7, Vec3::ONE, "scout"));

    let truncated = DeltaReader::new(full.bytes(), full.bit_len() - 9);
    let err = decode_entity(schema, truncated).unwrap_err();
    assert!(matches!(err, DeltaError::Codec(_) | DeltaError::Bits(_)));
}

use glam::Vec3;
use netprop::codec::{self, COORD_RESOLUTION, MAX_STRING_BYTES, NORMAL_RESOLUTION};
use netprop::{BitWriter, PackedBits, PropFlags, PropValue, SendProp};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ROUNDS: usize = 500;

/// Encodes `value`, checks that skipping consumes exactly the written bits, and decodes.
fn round_trip(prop: &SendProp, value: &PropValue) -> PropValue {
    let mut writer = BitWriter::with_capacity_bytes(2048);
    codec::encode(prop, value, &mut writer).unwrap();
    let written = writer.bits_written();
    let bits = writer.finish();

    let mut skipper = bits.reader();
    codec::skip_prop(prop, &mut skipper).unwrap();
    assert_eq!(skipper.position(), written, "skip length for {} = {value:?}", prop.name());

    let mut reader = bits.reader();
    let decoded = codec::decode(prop, &mut reader).unwrap();
    assert_eq!(reader.position(), written);
    decoded
}

fn encoded(prop: &SendProp, value: &PropValue) -> PackedBits {
    let mut writer = BitWriter::with_capacity_bytes(64);
    codec::encode(prop, value, &mut writer).unwrap();
    writer.finish()
}

fn random_string(rng: &mut StdRng, max: usize) -> String {
    let len = rng.gen_range(0..=max);
    (0..len).map(|_| rng.gen_range(b' '..=b'~') as char).collect()
}

#[test]
fn test_fixed_width_ints_are_exact() {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    for _ in 0..ROUNDS {
        let bits = rng.gen_range(1..=32u32);
        let unsigned = rng.gen_bool(0.5);
        let (flags, low, high) = if unsigned {
            (PropFlags::UNSIGNED, 0i64, (1i64 << bits) - 1)
        } else if bits == 1 {
            (PropFlags::empty(), -1, 0)
        } else {
            (PropFlags::empty(), -(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
        };
        let prop = SendProp::int("value", bits, flags);
        let value = PropValue::Int(rng.gen_range(low..=high));
        assert_eq!(round_trip(&prop, &value), value, "{bits} bits, unsigned {unsigned}");
    }
}

#[test]
fn test_varints_are_exact() {
    let mut rng = StdRng::seed_from_u64(11);
    let signed = SendProp::int("signed", 0, PropFlags::VARINT);
    let unsigned = SendProp::int("unsigned", 0, PropFlags::VARINT | PropFlags::UNSIGNED);
    for _ in 0..ROUNDS {
        let shift = rng.gen_range(0..63);
        let value: i64 = rng.r#gen::<i64>() >> shift;
        assert_eq!(round_trip(&signed, &value.into()), PropValue::Int(value));
        let positive = value.unsigned_abs() as i64 & i64::MAX;
        assert_eq!(round_trip(&unsigned, &positive.into()), PropValue::Int(positive));
    }
}

#[test]
fn test_coords_within_resolution() {
    let mut rng = StdRng::seed_from_u64(23);
    let coord = SendProp::float("coord", 0, 0.0, 0.0, PropFlags::COORD);
    let coord_mp = SendProp::float("coord_mp", 0, 0.0, 0.0, PropFlags::COORD_MP);
    let low_precision = SendProp::float("coord_lp", 0, 0.0, 0.0, PropFlags::COORD_MP_LOW_PRECISION);

    for _ in 0..ROUNDS {
        let value = rng.gen_range(-16000.0f32..16000.0);
        for (prop, tolerance) in [
            (&coord, COORD_RESOLUTION),
            (&coord_mp, COORD_RESOLUTION),
            (&low_precision, 0.125),
        ] {
            let decoded = round_trip(prop, &value.into()).as_float().unwrap();
            assert!(
                (decoded - value).abs() < tolerance,
                "{}: {value} -> {decoded}",
                prop.name()
            );
        }
    }
}

#[test]
fn test_normals_within_one_step() {
    let mut rng = StdRng::seed_from_u64(31);
    let prop = SendProp::float("normal", 0, 0.0, 0.0, PropFlags::NORMAL);
    for _ in 0..ROUNDS {
        let value = rng.gen_range(-1.0f32..=1.0);
        let decoded = round_trip(&prop, &value.into()).as_float().unwrap();
        assert!((decoded - value).abs() <= NORMAL_RESOLUTION + 1e-6, "{value} -> {decoded}");
    }
}

#[test]
fn test_ranged_floats_within_half_step() {
    let mut rng = StdRng::seed_from_u64(47);
    for _ in 0..ROUNDS {
        let bits = rng.gen_range(2..=20u32);
        let low = rng.gen_range(-1000.0f32..0.0);
        let high = low + rng.gen_range(1.0f32..2000.0);
        let prop = SendProp::float("ranged", bits, low, high, PropFlags::empty());
        let value = rng.gen_range(low..=high);

        let decoded = round_trip(&prop, &value.into()).as_float().unwrap();
        let tolerance = prop.range_step() * 0.5 + (high - low) * 1e-6 + 1e-4;
        assert!(
            (decoded - value).abs() <= tolerance,
            "{bits} bits [{low}, {high}]: {value} -> {decoded}"
        );
        assert!(decoded >= low - 1e-3 && decoded <= high + 1e-3);
    }
}

#[test]
fn test_no_scale_is_bit_exact() {
    let mut rng = StdRng::seed_from_u64(53);
    let prop = SendProp::float("raw", 32, 0.0, 0.0, PropFlags::empty());
    for _ in 0..ROUNDS {
        let value = f32::from_bits(rng.r#gen::<u32>());
        if value.is_nan() {
            continue;
        }
        assert_eq!(round_trip(&prop, &value.into()), PropValue::Float(value));
    }
}

#[test]
fn test_vectors() {
    let mut rng = StdRng::seed_from_u64(59);
    let coord = SendProp::vector("origin", 0, 0.0, 0.0, PropFlags::COORD);
    let normal = SendProp::vector("facing", 0, 0.0, 0.0, PropFlags::NORMAL);
    let xy = SendProp::vector_xy("velocity", 0, 0.0, 0.0, PropFlags::COORD);

    for _ in 0..ROUNDS {
        let position = Vec3::new(
            rng.gen_range(-4096.0..4096.0),
            rng.gen_range(-4096.0..4096.0),
            rng.gen_range(-4096.0..4096.0),
        );
        let decoded = round_trip(&coord, &position.into()).as_vector().unwrap();
        assert!((decoded - position).abs().max_element() < COORD_RESOLUTION);

        let decoded = round_trip(&xy, &position.into()).as_vector().unwrap();
        assert_eq!(decoded.z, 0.0);
        assert!((decoded.x - position.x).abs() < COORD_RESOLUTION);

        // Keep z away from zero, where rebuilding it from x and y loses precision.
        let direction = Vec3::new(
            rng.gen_range(-0.6..0.6),
            rng.gen_range(-0.6..0.6),
            if rng.gen_bool(0.5) { 1.0 } else { -1.0 },
        )
        .normalize();
        let decoded = round_trip(&normal, &direction.into()).as_vector().unwrap();
        assert!(
            (decoded - direction).abs().max_element() < 0.01,
            "{direction} -> {decoded}"
        );
    }
}

#[test]
fn test_strings_and_arrays() {
    let mut rng = StdRng::seed_from_u64(61);
    let name = SendProp::string("name");
    let ammo = SendProp::array("ammo", SendProp::int("ammo_element", 9, PropFlags::UNSIGNED), 40);

    for _ in 0..ROUNDS {
        let text = PropValue::Str(random_string(&mut rng, MAX_STRING_BYTES));
        assert_eq!(round_trip(&name, &text), text);

        let len = rng.gen_range(0..=40);
        let items: Vec<PropValue> = (0..len)
            .map(|_| PropValue::Int(rng.gen_range(0..512)))
            .collect();
        let items = PropValue::Array(items);
        assert_eq!(round_trip(&ammo, &items), items);
    }
}

#[test]
fn test_compare_agrees_with_values() {
    let mut rng = StdRng::seed_from_u64(67);
    let prop = SendProp::int("score", 6, PropFlags::UNSIGNED);
    for _ in 0..ROUNDS {
        let a = PropValue::Int(rng.gen_range(0..64));
        let b = PropValue::Int(rng.gen_range(0..64));
        let (bits_a, bits_b) = (encoded(&prop, &a), encoded(&prop, &b));
        let differs = codec::compare_deltas(&prop, &mut bits_a.reader(), &mut bits_b.reader()).unwrap();
        assert_eq!(differs, a != b);
    }
}

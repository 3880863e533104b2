use super::{DeltaError, DeltaReader, DeltaWriter, lookup};
use crate::bits::BitWriter;
use crate::codec::{self, PropValue};
use crate::schema::{FlatProp, FlattenedSchema};

/// Receives decoded values, one call per prop present in the stream.
pub trait PropReceiver {
    fn receive(&mut self, prop: &FlatProp, value: PropValue);
}

/// Writes every leaf of `schema` in index order. `values` is indexed like the schema.
pub fn encode_entity(
    schema: &FlattenedSchema,
    values: &[PropValue],
    writer: &mut BitWriter,
) -> Result<(), DeltaError> {
    if values.len() != schema.len() {
        return Err(DeltaError::ValueCount {
            expected: schema.len(),
            found: values.len(),
        });
    }

    let mut delta = DeltaWriter::new(writer);
    for (prop, value) in schema.props().iter().zip(values) {
        delta.write_prop(prop, value)?;
    }
    delta.finish()?;
    Ok(())
}

/// Decodes the stream, handing each value to `callback`. Returns the number of props read.
pub fn decode_with<F>(
    schema: &FlattenedSchema,
    mut reader: DeltaReader<'_>,
    mut callback: F,
) -> Result<usize, DeltaError>
where
    F: FnMut(&FlatProp, PropValue),
{
    let mut count = 0;
    while let Some(index) = reader.next_prop_index()? {
        let prop = lookup(schema, index)?;
        let value = reader.read_prop_value(prop)?;
        callback(prop, value);
        count += 1;
    }
    Ok(count)
}

/// Decodes into a full value list; leaves absent from the stream keep their zero value.
pub fn decode_entity(
    schema: &FlattenedSchema,
    reader: DeltaReader<'_>,
) -> Result<Vec<PropValue>, DeltaError> {
    let mut values = schema
        .props()
        .iter()
        .map(|prop| codec::decode_zero(prop.prop()))
        .collect::<Result<Vec<_>, _>>()?;
    decode_with(schema, reader, |prop, value| values[prop.index()] = value)?;
    Ok(values)
}

pub fn apply_to<R: PropReceiver + ?Sized>(
    schema: &FlattenedSchema,
    reader: DeltaReader<'_>,
    receiver: &mut R,
) -> Result<usize, DeltaError> {
    decode_with(schema, reader, |prop, value| receiver.receive(prop, value))
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::schema::{PropFlags, SendProp, SendTable};

    fn table() -> SendTable {
        SendTable::new(
            "Pickup",
            vec![
                SendProp::int("kind", 3, PropFlags::UNSIGNED),
                SendProp::vector("origin", 0, 0.0, 0.0, PropFlags::COORD),
                SendProp::string("label"),
            ],
        )
    }

    fn values() -> Vec<PropValue> {
        vec![
            PropValue::Int(5),
            PropValue::Vector(Vec3::new(1.5, -2.0, 64.0)),
            PropValue::from("medkit"),
        ]
    }

    #[test]
    fn full_entity_round_trip() {
        let table = table();
        let schema = table.flatten().unwrap();
        let mut writer = BitWriter::with_capacity_bytes(64);
        encode_entity(schema, &values(), &mut writer).unwrap();
        let bits = writer.finish();

        let decoded = decode_entity(schema, DeltaReader::from_bits(&bits)).unwrap();
        assert_eq!(decoded, values());
    }

    #[test]
    fn wrong_value_count() {
        let table = table();
        let schema = table.flatten().unwrap();
        let mut writer = BitWriter::with_capacity_bytes(64);
        assert_eq!(
            encode_entity(schema, &values()[..2], &mut writer),
            Err(DeltaError::ValueCount {
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn absent_props_decode_as_zero() {
        let table = table();
        let schema = table.flatten().unwrap();
        let mut writer = BitWriter::with_capacity_bytes(64);
        let mut delta = DeltaWriter::new(&mut writer);
        delta.write_prop(schema.get(2).unwrap(), &"ammo".into()).unwrap();
        delta.finish().unwrap();
        let bits = writer.finish();

        let decoded = decode_entity(schema, DeltaReader::from_bits(&bits)).unwrap();
        assert_eq!(
            decoded,
            vec![
                PropValue::Int(0),
                PropValue::Vector(Vec3::ZERO),
                PropValue::from("ammo")
            ]
        );
    }

    struct Recorder(Vec<(String, PropValue)>);

    impl PropReceiver for Recorder {
        fn receive(&mut self, prop: &FlatProp, value: PropValue) {
            self.0.push((prop.name().to_owned(), value));
        }
    }

    #[test]
    fn receiver_sees_each_prop() {
        let table = table();
        let schema = table.flatten().unwrap();
        let mut writer = BitWriter::with_capacity_bytes(64);
        encode_entity(schema, &values(), &mut writer).unwrap();
        let bits = writer.finish();

        let mut recorder = Recorder(Vec::new());
        let count = apply_to(schema, DeltaReader::from_bits(&bits), &mut recorder).unwrap();
        assert_eq!(count, 3);
        assert_eq!(recorder.0[0], ("kind".to_owned(), PropValue::Int(5)));
        assert_eq!(recorder.0[2].0, "label");
    }
}

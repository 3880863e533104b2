use std::sync::Arc;
use std::sync::mpsc::Receiver;

use anyhow::{Context, Result};
use glam::Vec3;
use netprop::{
    BitWriter, DeltaReader, DeltaWriter, FlatProp, PackedBits, PropReceiver, PropValue,
    SchemaRegistry, SnapshotManager, SnapshotRef, apply_to, decode_entity, merge_deltas,
};

use crate::world::ActorKind;

#[derive(Debug, Clone, Default)]
pub struct ClientReport {
    pub client: usize,
    pub snapshots: u64,
    pub delta_bytes: u64,
    /// What the same snapshots would have cost without deltas.
    pub full_bytes: u64,
    pub props: u64,
    pub mismatches: u64,
}

/// Client-side copy of one entity: its reconstructed bits and a few fields
/// reflected out of the received values.
#[derive(Debug, Default)]
struct Replica {
    bits: Option<PackedBits>,
    origin: Vec3,
    health: i64,
    name: String,
    updates: u64,
}

impl PropReceiver for Replica {
    fn receive(&mut self, prop: &FlatProp, value: PropValue) {
        self.updates += 1;
        match (prop.name(), value) {
            ("origin", PropValue::Vector(origin)) => self.origin = origin,
            ("health", PropValue::Int(health)) => self.health = health,
            ("name", PropValue::Str(name)) => self.name = name,
            _ => {}
        }
    }
}

/// A consumer that follows the snapshot stream the way a remote client would:
/// it only ever sees deltas against the last snapshot it acknowledged.
pub struct Client {
    id: usize,
    manager: SnapshotManager,
    registry: Arc<SchemaRegistry>,
    verify_interval: u32,
    baseline: Option<SnapshotRef>,
    replicas: Vec<Replica>,
    empty: PackedBits,
    report: ClientReport,
}

impl Client {
    pub fn new(
        id: usize,
        manager: SnapshotManager,
        registry: Arc<SchemaRegistry>,
        verify_interval: u32,
    ) -> Result<Self> {
        let mut writer = BitWriter::with_capacity_bits(1);
        DeltaWriter::new(&mut writer).finish()?;
        let replicas = (0..manager.config().max_entities)
            .map(|_| Replica::default())
            .collect();

        Ok(Self {
            id,
            manager,
            registry,
            verify_interval,
            baseline: None,
            replicas,
            empty: writer.finish(),
            report: ClientReport {
                client: id,
                ..Default::default()
            },
        })
    }

    pub fn run(mut self, snapshots: Receiver<SnapshotRef>) -> Result<ClientReport> {
        for snapshot in snapshots {
            let tick = snapshot.tick();
            self.receive(snapshot)
                .with_context(|| format!("client {} failed at tick {tick}", self.id))?;
        }

        if let Some(replica) = self.replicas.iter().find(|replica| replica.updates > 0) {
            log::debug!(
                "client {}: '{}' at {} with {} health after {} updates",
                self.id,
                replica.name,
                replica.origin,
                replica.health,
                replica.updates
            );
        }
        Ok(self.report)
    }

    fn receive(&mut self, snapshot: SnapshotRef) -> Result<()> {
        let verify = self.verify_interval > 0 && snapshot.tick() % self.verify_interval == 0;

        for (entity, packed) in snapshot.entities() {
            let schema = self
                .registry
                .flattened(ActorKind::for_entity(entity).table_name())?;
            let baseline = self
                .baseline
                .as_deref()
                .filter(|baseline| baseline.entity(entity).is_some());

            let delta = self
                .manager
                .entity_delta(schema, baseline, &snapshot, entity)?;
            self.report.delta_bytes += delta.bits.byte_len() as u64;
            self.report.full_bytes += packed.bit_len().div_ceil(8) as u64;
            self.report.props += delta.changed.len() as u64;

            let replica = self
                .replicas
                .get_mut(entity)
                .with_context(|| format!("entity {entity} has no replica slot"))?;
            if baseline.is_none() {
                *replica = Replica::default();
            }

            let merged = merge_deltas(
                schema,
                DeltaReader::from_bits(replica.bits.as_ref().unwrap_or(&self.empty)),
                DeltaReader::from_bits(&delta.bits),
            )?;
            apply_to(schema, DeltaReader::from_bits(&delta.bits), replica)?;

            if verify {
                let expected = self.manager.decode_entity(schema, &snapshot, entity)?;
                let actual = decode_entity(schema, DeltaReader::from_bits(&merged.bits))?;
                if expected != actual {
                    self.report.mismatches += 1;
                    log::warn!(
                        "client {}: entity {entity} diverged at tick {}",
                        self.id,
                        snapshot.tick()
                    );
                }
            }
            replica.bits = Some(merged.bits);
        }

        self.report.snapshots += 1;
        self.baseline = Some(snapshot);
        Ok(())
    }
}

use std::sync::Arc;

use anyhow::{Result, bail};
use glam::Vec3;
use netprop::{
    FlatProp, FlattenedSchema, PropFlags, PropValue, SchemaError, SchemaRegistry, SendProp,
    SendTable,
};

pub const BASE_ENTITY: &str = "BaseEntity";
pub const PLAYER: &str = "Player";
pub const PICKUP: &str = "Pickup";

const AMMO_SLOTS: u32 = 4;
const WORLD_EXTENT: f32 = 8000.0;
const PLAYER_SPEED: f32 = 220.0;

pub fn registry() -> Result<SchemaRegistry, SchemaError> {
    let base = Arc::new(SendTable::new(
        BASE_ENTITY,
        vec![
            SendProp::vector("origin", 0, 0.0, 0.0, PropFlags::COORD),
            SendProp::vector("facing", 0, 0.0, 0.0, PropFlags::NORMAL),
            SendProp::int("team", 2, PropFlags::UNSIGNED),
            SendProp::int("model_index", 0, PropFlags::VARINT | PropFlags::UNSIGNED),
        ],
    ));

    // Players pick their model client-side.
    let player = SendTable::new(
        PLAYER,
        vec![
            SendProp::table("base", base.clone()),
            SendProp::exclude(BASE_ENTITY, "model_index"),
            SendProp::int("health", 8, PropFlags::UNSIGNED),
            SendProp::float("armor", 7, 0.0, 100.0, PropFlags::empty()),
            SendProp::vector_xy("velocity", 0, 0.0, 0.0, PropFlags::COORD_MP),
            SendProp::string("name"),
            SendProp::array(
                "ammo",
                SendProp::int("ammo_count", 9, PropFlags::UNSIGNED),
                AMMO_SLOTS,
            ),
        ],
    );

    let pickup = SendTable::new(
        PICKUP,
        vec![
            SendProp::table("base", base.clone()),
            SendProp::int("amount", 0, PropFlags::VARINT),
            SendProp::float("respawn_time", 0, 0.0, 0.0, PropFlags::NO_SCALE),
        ],
    );

    let mut builder = SchemaRegistry::builder();
    builder.register(base)?.register(player)?.register(pickup)?;
    builder.build()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorKind {
    Player,
    Pickup,
}

impl ActorKind {
    /// Every fourth slot holds a pickup. Clients rely on the same mapping.
    pub fn for_entity(entity: usize) -> Self {
        if entity % 4 == 3 {
            Self::Pickup
        } else {
            Self::Player
        }
    }

    pub fn table_name(self) -> &'static str {
        match self {
            Self::Player => PLAYER,
            Self::Pickup => PICKUP,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Actor {
    kind: ActorKind,
    origin: Vec3,
    facing: Vec3,
    velocity: Vec3,
    team: i64,
    model_index: i64,
    health: i64,
    armor: f32,
    name: String,
    ammo: Vec<i64>,
    amount: i64,
    respawn_time: f32,
    last_changed: u32,
}

impl Actor {
    fn new(entity: usize) -> Self {
        let kind = ActorKind::for_entity(entity);
        let column = (entity % 16) as f32;
        let row = (entity / 16) as f32;
        let name = match kind {
            ActorKind::Player => format!("player{entity}"),
            ActorKind::Pickup => String::new(),
        };
        Self {
            kind,
            origin: Vec3::new(column * 256.0, row * 256.0, 64.0),
            facing: Vec3::Z,
            velocity: Vec3::ZERO,
            team: (entity % 2) as i64 + 1,
            model_index: 40 + entity as i64,
            health: 100,
            armor: 50.0,
            name,
            ammo: vec![30, 12, 3],
            amount: 25,
            respawn_time: 0.0,
            last_changed: 0,
        }
    }

    pub fn kind(&self) -> ActorKind {
        self.kind
    }

    pub fn last_changed(&self) -> u32 {
        self.last_changed
    }

    fn value(&self, prop: &FlatProp) -> Result<PropValue> {
        let value = match prop.name() {
            "origin" => self.origin.into(),
            "facing" => self.facing.into(),
            "team" => self.team.into(),
            "model_index" => self.model_index.into(),
            "health" => self.health.into(),
            "armor" => self.armor.into(),
            "velocity" => self.velocity.into(),
            "name" => self.name.as_str().into(),
            "ammo" => PropValue::Array(self.ammo.iter().copied().map(PropValue::Int).collect()),
            "amount" => self.amount.into(),
            "respawn_time" => self.respawn_time.into(),
            other => bail!("actor has no field for prop '{other}'"),
        };
        Ok(value)
    }

    /// Current field values in the schema's leaf order.
    pub fn values(&self, schema: &FlattenedSchema) -> Result<Vec<PropValue>> {
        schema.props().iter().map(|prop| self.value(prop)).collect()
    }

    fn simulate_player(&mut self, entity: usize, tick: u32, dt: f32) -> bool {
        let mut changed = false;
        let phase = tick as f32 * 0.02 + entity as f32;

        // A third of the players stand still.
        if entity % 3 != 0 {
            self.velocity = Vec3::new(phase.cos(), phase.sin(), 0.0) * PLAYER_SPEED;
            self.origin += self.velocity * dt;
            if self.origin.x.abs() > WORLD_EXTENT || self.origin.y.abs() > WORLD_EXTENT {
                self.origin = Vec3::new(0.0, 0.0, self.origin.z);
            }
            self.facing = Vec3::new(self.velocity.x, self.velocity.y, PLAYER_SPEED).normalize();
            changed = true;
        }

        let beat = tick as usize + entity;
        if beat % 45 == 0
            && let Some(slot) = self.ammo.iter_mut().find(|count| **count > 0)
        {
            *slot -= 1;
            changed = true;
        }
        if beat % 90 == 0 {
            self.health -= 35;
            self.armor = (self.armor - 10.0).max(0.0);
            if self.health <= 0 {
                log::debug!("{} respawned at tick {tick}", self.name);
                self.health = 100;
                self.armor = 50.0;
                self.ammo = vec![30, 12, 3];
                self.team = 3 - self.team;
            }
            changed = true;
        }
        changed
    }

    fn simulate_pickup(&mut self, entity: usize, tick: u32, tick_rate: u32) -> bool {
        if (tick as usize + entity) % 300 != 0 {
            return false;
        }
        self.amount = -self.amount;
        self.respawn_time = tick as f32 / tick_rate as f32 + 10.0;
        true
    }
}

/// Server-side entities driven by a fixed script so runs are reproducible.
#[derive(Debug)]
pub struct World {
    actors: Vec<Actor>,
    tick_rate: u32,
}

impl World {
    pub fn new(entities: usize, tick_rate: u32) -> Self {
        Self {
            actors: (0..entities).map(Actor::new).collect(),
            tick_rate: tick_rate.max(1),
        }
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    pub fn simulate(&mut self, tick: u32) {
        let dt = 1.0 / self.tick_rate as f32;
        for (entity, actor) in self.actors.iter_mut().enumerate() {
            let changed = match actor.kind {
                ActorKind::Player => actor.simulate_player(entity, tick, dt),
                ActorKind::Pickup => actor.simulate_pickup(entity, tick, self.tick_rate),
            };
            if changed {
                actor.last_changed = tick;
            }
        }
    }
}

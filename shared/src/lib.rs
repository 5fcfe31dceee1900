use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type PlayerIndex = i32;
pub type SpawnerId = i32;
pub type EnemyId = i32;
pub type TowerId = i32;
pub type BaseNetId = i32;

/// Sentinel used on the wire when a tower fires without a resolvable target.
pub const NO_TARGET: i32 = -1;

/// Upper bound on a single datagram; both the relay and the peers size their buffers with it.
pub const MAX_DATAGRAM: usize = 2048;

/// Registration and keepalive datagram sent to the relay. The relay consumes
/// it and never forwards it to other peers.
pub const RELAY_HELLO: &str = "RELAY_HELLO";

#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn sub(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn add(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn scale(self, factor: f32) -> Vec3 {
        Vec3::new(self.x * factor, self.y * factor, self.z * factor)
    }

    pub fn dot(self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    pub fn distance_squared(self, other: Vec3) -> f32 {
        self.sub(other).length_squared()
    }

    pub fn distance(self, other: Vec3) -> f32 {
        self.distance_squared(other).sqrt()
    }

    pub fn normalized(self) -> Vec3 {
        let length = self.length_squared().sqrt();
        if length > 0.0 {
            self.scale(1.0 / length)
        } else {
            Vec3::ZERO
        }
    }

    /// Moves towards `target` by at most `max_step`, never overshooting.
    pub fn move_towards(self, target: Vec3, max_step: f32) -> Vec3 {
        let delta = target.sub(self);
        let distance = delta.length_squared().sqrt();
        if distance <= max_step || distance == 0.0 {
            target
        } else {
            self.add(delta.scale(max_step / distance))
        }
    }

    /// Snaps every axis to the nearest multiple of `cell`.
    pub fn align_to_grid(self, cell: f32) -> Vec3 {
        if cell <= 0.0 {
            return self;
        }
        Vec3::new(
            (self.x / cell).round() * cell,
            (self.y / cell).round() * cell,
            (self.z / cell).round() * cell,
        )
    }

    /// Same point with the height component dropped.
    pub fn flat(self) -> Vec3 {
        Vec3::new(self.x, 0.0, self.z)
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EnemyKind {
    #[default]
    HealthRegen,
    Invincible,
    MovementSpeed,
    Armor,
    Boss,
}

impl EnemyKind {
    pub const ALL: [EnemyKind; 5] = [
        EnemyKind::HealthRegen,
        EnemyKind::Invincible,
        EnemyKind::MovementSpeed,
        EnemyKind::Armor,
        EnemyKind::Boss,
    ];
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TowerKind {
    #[default]
    Flame,
    Laser,
    Machine,
    Multiple,
    Rocket,
}

impl TowerKind {
    pub const ALL: [TowerKind; 5] = [
        TowerKind::Flame,
        TowerKind::Laser,
        TowerKind::Machine,
        TowerKind::Multiple,
        TowerKind::Rocket,
    ];

    pub fn parse(name: &str) -> Option<TowerKind> {
        match name.to_ascii_lowercase().as_str() {
            "flame" => Some(TowerKind::Flame),
            "laser" => Some(TowerKind::Laser),
            "machine" => Some(TowerKind::Machine),
            "multiple" => Some(TowerKind::Multiple),
            "rocket" => Some(TowerKind::Rocket),
            _ => None,
        }
    }
}

// Payloads. Every field defaults when absent so partially filled messages
// (e.g. a boss-skill stop that only names the enemy) still decode.

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GameStart {
    pub start_unix: f64,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct WaveStart {
    pub spawner_id: SpawnerId,
    pub owner_index: PlayerIndex,
    pub wave_index: i32,
    pub hp: f64,
    pub kill_gold: i64,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct EnemySpawn {
    pub enemy_id: EnemyId,
    pub spawner_id: SpawnerId,
    pub enemy_type: EnemyKind,
    pub position: Vec3,
    pub hp: f64,
    pub armor: f32,
    pub kill_gold: i64,
    pub owner_index: PlayerIndex,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct EnemyDamage {
    pub enemy_id: EnemyId,
    pub spawner_id: SpawnerId,
    pub remaining_hp: f64,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct EnemyDeath {
    pub enemy_id: EnemyId,
    pub spawner_id: SpawnerId,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct BossSkill {
    pub spawner_id: SpawnerId,
    pub enemy_id: EnemyId,
    pub start: bool,
    pub pos: Vec3,
    pub fwd: Vec3,
    pub grow_duration: f32,
    pub max_depth: f32,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TowerFire {
    pub tower_id: TowerId,
    pub tower_type: TowerKind,
    pub position: Vec3,
    pub damage: f32,
    pub is_first_shot: bool,
    pub target_enemy_id: EnemyId,
    pub target_spawner_id: SpawnerId,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TowerBasePlace {
    pub owner_index: PlayerIndex,
    pub base_net_id: BaseNetId,
    pub position: Vec3,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TowerCreate {
    pub owner_index: PlayerIndex,
    pub base_net_id: BaseNetId,
    pub tower_type: TowerKind,
    pub level: i32,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TowerLabUpgrade {
    pub owner_index: PlayerIndex,
    pub tower_type: TowerKind,
    pub level: i32,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TowerMove {
    pub owner_index: PlayerIndex,
    pub base_net_id: BaseNetId,
    pub base_position: Vec3,
    pub has_tower: bool,
    pub tower_position: Vec3,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GameTimescale {
    pub scale: f32,
}

/// Message-type tags carried in front of every datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Header {
    GameStart,
    WaveStart,
    EnemySpawn,
    EnemyDamage,
    EnemyDeath,
    BossSkill,
    TowerFire,
    TowerBasePlace,
    TowerCreate,
    TowerLabUpgrade,
    TowerMove,
    GameTimescale,
}

impl Header {
    pub const ALL: [Header; 12] = [
        Header::GameStart,
        Header::WaveStart,
        Header::EnemySpawn,
        Header::EnemyDamage,
        Header::EnemyDeath,
        Header::BossSkill,
        Header::TowerFire,
        Header::TowerBasePlace,
        Header::TowerCreate,
        Header::TowerLabUpgrade,
        Header::TowerMove,
        Header::GameTimescale,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Header::GameStart => "GAME_START",
            Header::WaveStart => "WAVE_START",
            Header::EnemySpawn => "ENEMY_SPAWN",
            Header::EnemyDamage => "ENEMY_DAMAGE",
            Header::EnemyDeath => "ENEMY_DEATH",
            Header::BossSkill => "BOSS_SKILL",
            Header::TowerFire => "TOWER_FIRE",
            Header::TowerBasePlace => "TOWER_BASE_PLACE",
            Header::TowerCreate => "TOWER_CREATE",
            Header::TowerLabUpgrade => "TOWER_LAB_UPGRADE",
            Header::TowerMove => "TOWER_MOVE",
            Header::GameTimescale => "GAME_TIMESCALE",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Header> {
        Header::ALL.iter().copied().find(|h| h.as_str() == tag)
    }
}

/// One decoded datagram: a header and its fixed payload shape.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    GameStart(GameStart),
    WaveStart(WaveStart),
    EnemySpawn(EnemySpawn),
    EnemyDamage(EnemyDamage),
    EnemyDeath(EnemyDeath),
    BossSkill(BossSkill),
    TowerFire(TowerFire),
    TowerBasePlace(TowerBasePlace),
    TowerCreate(TowerCreate),
    TowerLabUpgrade(TowerLabUpgrade),
    TowerMove(TowerMove),
    GameTimescale(GameTimescale),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("datagram is not valid UTF-8")]
    InvalidUtf8,
    #[error("datagram carries no header")]
    MissingHeader,
    #[error("unknown message header '{0}'")]
    UnknownHeader(String),
    #[error("malformed {header} payload: {source}")]
    Malformed {
        header: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode {header} payload: {source}")]
    Encode {
        header: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl WireMessage {
    pub fn header(&self) -> Header {
        match self {
            WireMessage::GameStart(_) => Header::GameStart,
            WireMessage::WaveStart(_) => Header::WaveStart,
            WireMessage::EnemySpawn(_) => Header::EnemySpawn,
            WireMessage::EnemyDamage(_) => Header::EnemyDamage,
            WireMessage::EnemyDeath(_) => Header::EnemyDeath,
            WireMessage::BossSkill(_) => Header::BossSkill,
            WireMessage::TowerFire(_) => Header::TowerFire,
            WireMessage::TowerBasePlace(_) => Header::TowerBasePlace,
            WireMessage::TowerCreate(_) => Header::TowerCreate,
            WireMessage::TowerLabUpgrade(_) => Header::TowerLabUpgrade,
            WireMessage::TowerMove(_) => Header::TowerMove,
            WireMessage::GameTimescale(_) => Header::GameTimescale,
        }
    }

    fn payload_json(&self) -> serde_json::Result<String> {
        match self {
            WireMessage::GameStart(m) => serde_json::to_string(m),
            WireMessage::WaveStart(m) => serde_json::to_string(m),
            WireMessage::EnemySpawn(m) => serde_json::to_string(m),
            WireMessage::EnemyDamage(m) => serde_json::to_string(m),
            WireMessage::EnemyDeath(m) => serde_json::to_string(m),
            WireMessage::BossSkill(m) => serde_json::to_string(m),
            WireMessage::TowerFire(m) => serde_json::to_string(m),
            WireMessage::TowerBasePlace(m) => serde_json::to_string(m),
            WireMessage::TowerCreate(m) => serde_json::to_string(m),
            WireMessage::TowerLabUpgrade(m) => serde_json::to_string(m),
            WireMessage::TowerMove(m) => serde_json::to_string(m),
            WireMessage::GameTimescale(m) => serde_json::to_string(m),
        }
    }

    /// Renders the `HEADER|{json}` text form sent over the wire.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let header = self.header().as_str();
        let json = self
            .payload_json()
            .map_err(|source| ProtocolError::Encode { header, source })?;
        Ok(format!("{}|{}", header, json))
    }

    pub fn encode_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        self.encode().map(String::into_bytes)
    }

    /// Parses either `HEADER|{json}` or a bare JSON envelope whose `action`
    /// field names the header.
    pub fn decode(text: &str) -> Result<WireMessage, ProtocolError> {
        let (tag, json) = split_header(text)?;
        let header =
            Header::from_tag(&tag).ok_or_else(|| ProtocolError::UnknownHeader(tag.clone()))?;
        Self::decode_payload(header, json)
    }

    pub fn decode_bytes(bytes: &[u8]) -> Result<WireMessage, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
        Self::decode(text)
    }

    pub fn decode_payload(header: Header, json: &str) -> Result<WireMessage, ProtocolError> {
        let message = match header {
            Header::GameStart => WireMessage::GameStart(parse_payload(header, json)?),
            Header::WaveStart => WireMessage::WaveStart(parse_payload(header, json)?),
            Header::EnemySpawn => WireMessage::EnemySpawn(parse_payload(header, json)?),
            Header::EnemyDamage => WireMessage::EnemyDamage(parse_payload(header, json)?),
            Header::EnemyDeath => WireMessage::EnemyDeath(parse_payload(header, json)?),
            Header::BossSkill => WireMessage::BossSkill(parse_payload(header, json)?),
            Header::TowerFire => WireMessage::TowerFire(parse_payload(header, json)?),
            Header::TowerBasePlace => WireMessage::TowerBasePlace(parse_payload(header, json)?),
            Header::TowerCreate => WireMessage::TowerCreate(parse_payload(header, json)?),
            Header::TowerLabUpgrade => WireMessage::TowerLabUpgrade(parse_payload(header, json)?),
            Header::TowerMove => WireMessage::TowerMove(parse_payload(header, json)?),
            Header::GameTimescale => WireMessage::GameTimescale(parse_payload(header, json)?),
        };
        Ok(message)
    }
}

fn parse_payload<T: DeserializeOwned>(header: Header, json: &str) -> Result<T, ProtocolError> {
    serde_json::from_str(json).map_err(|source| ProtocolError::Malformed {
        header: header.as_str(),
        source,
    })
}

#[derive(Deserialize)]
struct ActionEnvelope {
    action: Option<String>,
}

/// Splits a datagram into its header tag and JSON body without interpreting
/// the body. The relay uses this to log what it forwards.
pub fn split_header(text: &str) -> Result<(String, &str), ProtocolError> {
    if let Some((tag, json)) = text.split_once('|') {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(ProtocolError::MissingHeader);
        }
        let json = if json.trim().is_empty() { "{}" } else { json };
        return Ok((tag.to_string(), json));
    }

    let envelope: ActionEnvelope =
        serde_json::from_str(text).map_err(|_| ProtocolError::MissingHeader)?;
    match envelope.action {
        Some(action) if !action.is_empty() => Ok((action, text)),
        _ => Err(ProtocolError::MissingHeader),
    }
}

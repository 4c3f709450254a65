use bevy::math::Vec3;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::path::Path;

const BUILTIN_CIRCUIT: &str = include_str!("../assets/circuits/default.toml");

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CircuitFile {
    #[serde(default)]
    pub metadata: CircuitMetadata,
    #[serde(default)]
    pub model: Option<CircuitModel>,
    #[serde(default)]
    pub ground: Ground,
    #[serde(default)]
    pub start: StartPose,
    #[serde(default)]
    pub finish: FinishLine,
    #[serde(default)]
    pub walls: Vec<Wall>,
    #[serde(default)]
    pub checkpoints: Vec<CheckpointSpec>,
    #[serde(default)]
    pub lights: Vec<CircuitLight>,
    #[serde(default)]
    pub barrels: Vec<Barrel>,
    #[serde(default)]
    pub ramps: Vec<Ramp>,
    #[serde(default)]
    pub roads: Vec<Road>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CircuitMetadata {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub author: String,
}

impl Default for CircuitMetadata {
    fn default() -> Self {
        Self {
            name: default_name(),
            author: String::new(),
        }
    }
}

/// Visual-only scenery.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CircuitModel {
    #[serde(default = "default_model_path")]
    pub path: String,
    #[serde(default = "default_model_position")]
    pub position: [f32; 3],
    #[serde(default = "default_model_scale")]
    pub scale: f32,
}

impl Default for CircuitModel {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            position: default_model_position(),
            scale: default_model_scale(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Ground {
    #[serde(default = "default_ground_height")]
    pub height: f32,
    /// Visible slab extent as `[x, z]`. The collider is unbounded.
    #[serde(default = "default_ground_size")]
    pub size: [f32; 2],
}

impl Default for Ground {
    fn default() -> Self {
        Self {
            height: default_ground_height(),
            size: default_ground_size(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct StartPose {
    #[serde(default)]
    pub position: [f32; 3],
    /// Rotation about +Y in radians. Zero faces -Z.
    #[serde(default)]
    pub yaw: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FinishLine {
    #[serde(default)]
    pub position: [f32; 3],
    #[serde(default = "default_finish_radius")]
    pub radius: f32,
}

impl Default for FinishLine {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            radius: default_finish_radius(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct BoxSize {
    pub width: f32,
    pub height: f32,
    pub depth: f32,
}

impl BoxSize {
    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.width, self.height, self.depth)
    }

    fn all_positive(&self) -> bool {
        is_positive(self.width) && is_positive(self.height) && is_positive(self.depth)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Wall {
    pub position: [f32; 3],
    pub size: BoxSize,
    #[serde(default)]
    pub yaw: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CheckpointSpec {
    pub position: [f32; 3],
    #[serde(default = "default_checkpoint_radius")]
    pub radius: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CircuitLight {
    pub position: [f32; 3],
    pub target: [f32; 3],
    /// `0xRRGGBB`.
    #[serde(default = "default_light_color")]
    pub color: u32,
    /// Lumens.
    #[serde(default = "default_light_intensity")]
    pub intensity: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Barrel {
    pub position: [f32; 3],
    #[serde(default = "default_barrel_radius")]
    pub radius: f32,
    #[serde(default = "default_barrel_height")]
    pub height: f32,
    #[serde(default = "default_barrel_mass")]
    pub mass: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Ramp {
    pub position: [f32; 3],
    pub size: BoxSize,
    /// Tilt about +X in radians.
    #[serde(default = "default_ramp_pitch")]
    pub pitch: f32,
}

/// Straight road slab with a kerb along each side: red at `+marker_offset`,
/// white at `-marker_offset` (local X).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Road {
    pub position: [f32; 3],
    #[serde(default = "default_road_width")]
    pub width: f32,
    #[serde(default = "default_road_length")]
    pub length: f32,
    #[serde(default = "default_road_height")]
    pub height: f32,
    #[serde(default = "default_marker_offset")]
    pub marker_offset: f32,
    #[serde(default)]
    pub yaw: f32,
}

/// Finite and strictly positive. NaN fails.
pub fn is_positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

fn default_name() -> String {
    "Untitled".to_string()
}

fn default_model_path() -> String {
    "models/circuit/scene.gltf".to_string()
}

fn default_model_position() -> [f32; 3] {
    [-25.0, -6.4, -30.0]
}

fn default_model_scale() -> f32 {
    0.6
}

fn default_ground_height() -> f32 {
    -1.5
}

fn default_ground_size() -> [f32; 2] {
    [400.0, 200.0]
}

fn default_finish_radius() -> f32 {
    5.0
}

fn default_checkpoint_radius() -> f32 {
    4.0
}

fn default_light_color() -> u32 {
    0xffffff
}

fn default_light_intensity() -> f32 {
    400_000.0
}

fn default_barrel_radius() -> f32 {
    0.3
}

fn default_barrel_height() -> f32 {
    0.8
}

fn default_barrel_mass() -> f32 {
    15.0
}

fn default_ramp_pitch() -> f32 {
    PI / 32.0
}

fn default_road_width() -> f32 {
    20.0
}

fn default_road_length() -> f32 {
    20.0
}

fn default_road_height() -> f32 {
    1.0
}

fn default_marker_offset() -> f32 {
    10.0
}

impl CircuitFile {
    /// Create a new empty circuit with default metadata.
    pub fn new_empty(name: &str) -> Self {
        Self {
            metadata: CircuitMetadata {
                name: name.to_string(),
                author: String::new(),
            },
            model: None,
            ground: Ground::default(),
            start: StartPose::default(),
            finish: FinishLine::default(),
            walls: Vec::new(),
            checkpoints: Vec::new(),
            lights: Vec::new(),
            barrels: Vec::new(),
            ramps: Vec::new(),
            roads: Vec::new(),
        }
    }

    /// Load a circuit from a TOML file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::parse(&text).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
    }

    /// The circuit compiled into the binary.
    pub fn load_builtin() -> Result<Self, String> {
        Self::parse(BUILTIN_CIRCUIT)
            .map_err(|e| format!("Failed to parse built-in circuit: {}", e))
    }

    fn parse(text: &str) -> Result<Self, String> {
        let circuit: Self = toml::from_str(text).map_err(|e| e.to_string())?;
        circuit.validate()?;
        Ok(circuit)
    }

    /// Save this circuit to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize circuit: {}", e))?;
        std::fs::write(path, text)
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))
    }

    pub fn validate(&self) -> Result<(), String> {
        for (i, checkpoint) in self.checkpoints.iter().enumerate() {
            if !is_positive(checkpoint.radius) {
                return Err(format!(
                    "checkpoint {i} has non-positive radius {}",
                    checkpoint.radius
                ));
            }
        }
        for (i, wall) in self.walls.iter().enumerate() {
            if !wall.size.all_positive() {
                return Err(format!("wall {i} has non-positive size {:?}", wall.size));
            }
        }
        for (i, ramp) in self.ramps.iter().enumerate() {
            if !ramp.size.all_positive() {
                return Err(format!("ramp {i} has non-positive size {:?}", ramp.size));
            }
        }
        for (i, barrel) in self.barrels.iter().enumerate() {
            if !(is_positive(barrel.mass) && is_positive(barrel.radius) && is_positive(barrel.height))
            {
                return Err(format!("barrel {i} needs a positive mass, radius and height"));
            }
        }
        for (i, road) in self.roads.iter().enumerate() {
            if !(is_positive(road.width) && is_positive(road.length) && is_positive(road.height)) {
                return Err(format!("road {i} needs a positive width, length and height"));
            }
        }
        if !is_positive(self.finish.radius) {
            return Err(format!(
                "finish radius must be positive, got {}",
                self.finish.radius
            ));
        }
        Ok(())
    }

    pub fn finish_position(&self) -> Vec3 {
        Vec3::from_array(self.finish.position)
    }
}

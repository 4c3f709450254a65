use std::path::{Path, PathBuf};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::circuit_format::{CircuitFile, is_positive};

const BUILTIN_CAR: &str = include_str!("../assets/car.toml");

/// Where the car and circuit descriptions come from. `None` means the
/// copy compiled into the binary.
#[derive(Resource, Clone, Debug, Default)]
pub struct ConfigPaths {
    pub car: Option<PathBuf>,
    pub circuit: Option<PathBuf>,
}

/// The circuit the world was built from.
#[derive(Resource, Clone, Debug)]
pub struct ActiveCircuit {
    pub file: CircuitFile,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WheelConfig {
    /// Suspension anchor in chassis space.
    pub anchor: [f32; 3],
    #[serde(default = "default_wheel_radius")]
    pub radius: f32,
    #[serde(default = "default_rest_length")]
    pub rest_length: f32,
    #[serde(default = "default_stiffness")]
    pub stiffness: f32,
    #[serde(default = "default_suspension_damping")]
    pub damping: f32,
    #[serde(default)]
    pub steer: bool,
    #[serde(default)]
    pub drive: bool,
}

impl WheelConfig {
    pub fn anchor_vec3(&self) -> Vec3 {
        Vec3::from_array(self.anchor)
    }

    /// Ray length needed to reach the ground with the spring fully extended.
    pub fn max_ray_length(&self) -> f32 {
        self.rest_length + self.radius
    }

    fn new(anchor: [f32; 3], front: bool) -> Self {
        Self {
            anchor,
            radius: default_wheel_radius(),
            rest_length: default_rest_length(),
            stiffness: default_stiffness(),
            damping: default_suspension_damping(),
            steer: front,
            drive: !front,
        }
    }
}

/// Chase camera placement relative to the car pivot.
#[derive(Resource, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CameraFollowParams {
    #[serde(default = "default_camera_offset")]
    pub offset: [f32; 3],
    #[serde(default = "default_smooth_factor")]
    pub smooth_factor: f32,
    #[serde(default = "default_look_at_offset_y")]
    pub look_at_offset_y: f32,
}

impl Default for CameraFollowParams {
    fn default() -> Self {
        Self {
            offset: default_camera_offset(),
            smooth_factor: default_smooth_factor(),
            look_at_offset_y: default_look_at_offset_y(),
        }
    }
}

impl CameraFollowParams {
    pub fn offset_vec3(&self) -> Vec3 {
        Vec3::from_array(self.offset)
    }

    /// `smooth_factor` is a per-frame lerp weight; outside `(0, 1]` the
    /// camera stalls or overshoots without bound.
    pub fn validate(&self) -> Result<(), String> {
        if !(is_positive(self.smooth_factor) && self.smooth_factor <= 1.0) {
            return Err(format!(
                "camera smooth_factor must be in (0, 1], got {}",
                self.smooth_factor
            ));
        }
        if !self.offset.iter().all(|v| v.is_finite()) || !self.look_at_offset_y.is_finite() {
            return Err("camera offsets must be finite".to_string());
        }
        Ok(())
    }
}

#[derive(Resource, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CarTuning {
    /// Collider size as `[width, height, length]`.
    #[serde(default = "default_chassis_size")]
    pub chassis_size: [f32; 3],
    #[serde(default = "default_mass")]
    pub mass: f32,
    #[serde(default = "default_center_of_mass")]
    pub center_of_mass: [f32; 3],
    #[serde(default = "default_linear_damping")]
    pub linear_damping: f32,
    #[serde(default = "default_angular_damping")]
    pub angular_damping: f32,

    #[serde(default = "default_wheels")]
    pub wheels: Vec<WheelConfig>,

    /// Per drive wheel, in newtons.
    #[serde(default = "default_engine_force")]
    pub engine_force: f32,
    #[serde(default = "default_reverse_force")]
    pub reverse_force: f32,
    /// Per wheel, in newtons.
    #[serde(default = "default_brake_force")]
    pub brake_force: f32,
    /// Rear wheels only.
    #[serde(default = "default_handbrake_force")]
    pub handbrake_force: f32,
    /// Per wheel, opposing rolling with no pedal pressed.
    #[serde(default = "default_rolling_resistance")]
    pub rolling_resistance: f32,

    #[serde(default = "default_max_steer")]
    pub max_steer: f32,
    #[serde(default = "default_max_steer_at_top_speed")]
    pub max_steer_at_top_speed: f32,
    #[serde(default = "default_top_speed")]
    pub top_speed: f32,
    #[serde(default = "default_steer_speed")]
    pub steer_speed: f32,
    #[serde(default = "default_steer_return_speed")]
    pub steer_return_speed: f32,

    /// Lateral force per unit of load and per m/s of sideways slip.
    #[serde(default = "default_lateral_grip")]
    pub lateral_grip: f32,
    #[serde(default = "default_max_tyre_force_per_load")]
    pub max_tyre_force_per_load: f32,

    #[serde(default = "default_model_path")]
    pub model_path: String,
    #[serde(default = "default_model_offset")]
    pub model_offset: [f32; 3],
    #[serde(default = "default_model_scale")]
    pub model_scale: f32,
    /// glTF nodes to hide once the model is spawned.
    #[serde(default = "default_hidden_nodes")]
    pub hidden_nodes: Vec<String>,

    #[serde(default)]
    pub camera: CameraFollowParams,
}

impl Default for CarTuning {
    fn default() -> Self {
        Self {
            chassis_size: default_chassis_size(),
            mass: default_mass(),
            center_of_mass: default_center_of_mass(),
            linear_damping: default_linear_damping(),
            angular_damping: default_angular_damping(),
            wheels: default_wheels(),
            engine_force: default_engine_force(),
            reverse_force: default_reverse_force(),
            brake_force: default_brake_force(),
            handbrake_force: default_handbrake_force(),
            rolling_resistance: default_rolling_resistance(),
            max_steer: default_max_steer(),
            max_steer_at_top_speed: default_max_steer_at_top_speed(),
            top_speed: default_top_speed(),
            steer_speed: default_steer_speed(),
            steer_return_speed: default_steer_return_speed(),
            lateral_grip: default_lateral_grip(),
            max_tyre_force_per_load: default_max_tyre_force_per_load(),
            model_path: default_model_path(),
            model_offset: default_model_offset(),
            model_scale: default_model_scale(),
            hidden_nodes: default_hidden_nodes(),
            camera: CameraFollowParams::default(),
        }
    }
}

fn default_chassis_size() -> [f32; 3] {
    [1.0, 0.4, 2.0]
}

fn default_mass() -> f32 {
    150.0
}

fn default_center_of_mass() -> [f32; 3] {
    [0.0, -0.2, 0.0]
}

fn default_linear_damping() -> f32 {
    0.05
}

fn default_angular_damping() -> f32 {
    0.5
}

fn default_wheel_radius() -> f32 {
    0.3
}

fn default_rest_length() -> f32 {
    0.3
}

fn default_stiffness() -> f32 {
    6000.0
}

fn default_suspension_damping() -> f32 {
    600.0
}

fn default_wheels() -> Vec<WheelConfig> {
    vec![
        WheelConfig::new([-0.55, -0.1, -0.7], true),
        WheelConfig::new([0.55, -0.1, -0.7], true),
        WheelConfig::new([-0.55, -0.1, 0.7], false),
        WheelConfig::new([0.55, -0.1, 0.7], false),
    ]
}

fn default_engine_force() -> f32 {
    500.0
}

fn default_reverse_force() -> f32 {
    250.0
}

fn default_brake_force() -> f32 {
    800.0
}

fn default_handbrake_force() -> f32 {
    600.0
}

fn default_rolling_resistance() -> f32 {
    20.0
}

fn default_max_steer() -> f32 {
    0.3
}

fn default_max_steer_at_top_speed() -> f32 {
    0.2
}

fn default_top_speed() -> f32 {
    35.0
}

fn default_steer_speed() -> f32 {
    1.0
}

fn default_steer_return_speed() -> f32 {
    2.0
}

fn default_lateral_grip() -> f32 {
    1.0
}

fn default_max_tyre_force_per_load() -> f32 {
    1.2
}

fn default_model_path() -> String {
    "models/car/car.gltf".to_string()
}

fn default_model_offset() -> [f32; 3] {
    [0.0, 0.0, -0.5]
}

fn default_model_scale() -> f32 {
    0.005
}

fn default_hidden_nodes() -> Vec<String> {
    [
        "Wiel_Voor_L_Mat_InitialDCar_0",
        "Wiel_Voor_R_Mat_InitialDCar_0",
        "Wiel_Achter_L_Mat_InitialDCar_0",
        "Wiel_Achter_R_Mat_InitialDCar_0",
    ]
    .iter()
    .map(|name| name.to_string())
    .collect()
}

fn default_camera_offset() -> [f32; 3] {
    [0.0, 1.6, 3.2]
}

fn default_smooth_factor() -> f32 {
    0.1
}

fn default_look_at_offset_y() -> f32 {
    1.1
}

impl CarTuning {
    /// Load car tuning from a TOML file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::parse(&text).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
    }

    /// The tuning compiled into the binary.
    pub fn load_builtin() -> Result<Self, String> {
        Self::parse(BUILTIN_CAR).map_err(|e| format!("Failed to parse built-in car: {}", e))
    }

    fn parse(text: &str) -> Result<Self, String> {
        let tuning: Self = toml::from_str(text).map_err(|e| e.to_string())?;
        tuning.validate()?;
        Ok(tuning)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !is_positive(self.mass) {
            return Err(format!("mass must be positive, got {}", self.mass));
        }
        if !self.chassis_size.iter().all(|&s| is_positive(s)) {
            return Err(format!("chassis_size must be positive, got {:?}", self.chassis_size));
        }
        if self.wheels.is_empty() {
            return Err("a car needs at least one wheel".to_string());
        }
        for (i, wheel) in self.wheels.iter().enumerate() {
            if !is_positive(wheel.radius) || !wheel.rest_length.is_finite() || wheel.rest_length < 0.0 {
                return Err(format!("wheel {i} has an invalid radius or rest length"));
            }
        }
        if !is_positive(self.top_speed) {
            return Err(format!("top_speed must be positive, got {}", self.top_speed));
        }
        self.camera.validate()
    }

    /// Save this tuning to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize car tuning: {}", e))?;
        std::fs::write(path, text)
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))
    }

    /// Mass carried by each wheel when the car is at rest.
    pub fn mass_per_wheel(&self) -> f32 {
        self.mass / self.wheels.len().max(1) as f32
    }
}

fn load_or_builtin<T>(
    what: &str,
    path: Option<&Path>,
    load: impl Fn(&Path) -> Result<T, String>,
    builtin: impl Fn() -> Result<T, String>,
) -> Option<T> {
    if let Some(path) = path {
        match load(path) {
            Ok(value) => {
                info!("Loaded {what} from {}", path.display());
                return Some(value);
            }
            Err(error) => error!("{error}; falling back to the built-in {what}"),
        }
    }
    match builtin() {
        Ok(value) => Some(value),
        Err(error) => {
            error!("{error}");
            None
        }
    }
}

/// Runs in `PreStartup` so everything spawned in `Startup` can read the
/// tuning and circuit resources.
pub fn load_configuration(mut commands: Commands, paths: Res<ConfigPaths>) {
    let tuning = load_or_builtin(
        "car tuning",
        paths.car.as_deref(),
        CarTuning::load,
        CarTuning::load_builtin,
    )
    .unwrap_or_default();

    let circuit = load_or_builtin(
        "circuit",
        paths.circuit.as_deref(),
        CircuitFile::load,
        CircuitFile::load_builtin,
    )
    .unwrap_or_else(|| CircuitFile::new_empty("Empty"));

    info!(
        "Circuit '{}': {} walls, {} checkpoints, {} lights",
        circuit.metadata.name,
        circuit.walls.len(),
        circuit.checkpoints.len(),
        circuit.lights.len()
    );

    commands.insert_resource(tuning.camera.clone());
    commands.insert_resource(tuning);
    commands.insert_resource(ActiveCircuit { file: circuit });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_car_parses_and_has_four_wheels() {
        let tuning = CarTuning::load_builtin().unwrap();
        assert_eq!(tuning.wheels.len(), 4);
        assert_eq!(tuning.wheels.iter().filter(|w| w.steer).count(), 2);
        assert_eq!(tuning.wheels.iter().filter(|w| w.drive).count(), 2);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let tuning = CarTuning::parse("mass = 200.0\n[camera]\nsmooth_factor = 0.5\n").unwrap();
        assert_eq!(tuning.mass, 200.0);
        assert_eq!(tuning.engine_force, default_engine_force());
        assert_eq!(tuning.camera.smooth_factor, 0.5);
        assert_eq!(tuning.camera.offset, default_camera_offset());
        assert_eq!(tuning.wheels, default_wheels());
    }

    #[test]
    fn rejects_non_positive_mass() {
        let err = CarTuning::parse("mass = 0.0\n").unwrap_err();
        assert!(err.contains("mass"));
    }

    #[test]
    fn rejects_nan_mass() {
        let err = CarTuning::parse("mass = nan\n").unwrap_err();
        assert!(err.contains("mass"));
    }

    #[test]
    fn rejects_camera_smoothing_outside_unit_range() {
        for value in ["3.0", "0.0", "-0.5", "nan"] {
            let text = format!("[camera]\nsmooth_factor = {value}\n");
            let err = CarTuning::parse(&text).unwrap_err();
            assert!(err.contains("smooth_factor"), "{value}: {err}");
        }
        assert!(CarTuning::parse("[camera]\nsmooth_factor = 1.0\n").is_ok());
    }

    #[test]
    fn save_then_load_keeps_tuning() {
        let mut tuning = CarTuning::default();
        tuning.mass = 220.0;
        tuning.camera.smooth_factor = 0.25;
        tuning.wheels[1].stiffness = 7500.0;

        let path = std::env::temp_dir().join(format!("circuit-racer-car-{}.toml", std::process::id()));
        tuning.save(&path).unwrap();
        let loaded = CarTuning::load(&path);
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded.unwrap(), tuning);
    }

    #[test]
    fn rejects_car_without_wheels() {
        assert!(CarTuning::parse("wheels = []\n").is_err());
    }

    #[test]
    fn load_reports_missing_file_path() {
        let err = CarTuning::load(Path::new("does/not/exist.toml")).unwrap_err();
        assert!(err.contains("does/not/exist.toml"));
    }

    #[test]
    fn wheel_ray_reaches_past_rest_length() {
        let wheel = &default_wheels()[0];
        assert_eq!(wheel.max_ray_length(), wheel.rest_length + wheel.radius);
    }

    #[test]
    fn mass_is_split_between_wheels() {
        let tuning = CarTuning::default();
        assert_eq!(tuning.mass_per_wheel(), 37.5);
    }
}

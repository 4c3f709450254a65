use std::f32::consts::{FRAC_PI_2, TAU};

use avian3d::prelude::*;
use bevy::prelude::*;

use crate::assets::{AssetKind, AssetLoadFailed, PendingAssets};
use crate::circuit::{SURFACE_FRICTION, SURFACE_RESTITUTION};
use crate::circuit_format::StartPose;
use crate::config::{ActiveCircuit, CarTuning, WheelConfig};
use crate::race::GameState;

/// Visual tyre width; the physics only sees rays.
const WHEEL_WIDTH: f32 = 0.2;

pub struct VehiclePlugin;

impl Plugin for VehiclePlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<ResetCar>()
            .add_systems(Startup, spawn_car)
            .add_systems(
                FixedUpdate,
                (cast_suspension_rays, apply_vehicle_forces)
                    .chain()
                    .run_if(not(in_state(GameState::StartScreen))),
            )
            .add_systems(
                Update,
                (
                    handle_reset_car,
                    update_wheel_visuals,
                    hide_baked_wheel_nodes,
                    spawn_fallback_body,
                ),
            );
    }
}

/// Puts the car back on the start pose with no velocity.
#[derive(Message, Debug, Clone, Copy)]
pub struct ResetCar;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WheelState {
    pub contact: bool,
    /// Distance from the anchor to the wheel centre.
    pub suspension_length: f32,
    pub previous_length: f32,
    /// Suspension force from the last step, in newtons.
    pub load: f32,
    /// Roll angle about the axle, in radians.
    pub spin: f32,
}

impl WheelState {
    pub fn at_rest(wheel: &WheelConfig) -> Self {
        Self {
            contact: false,
            suspension_length: wheel.rest_length,
            previous_length: wheel.rest_length,
            load: 0.0,
            spin: 0.0,
        }
    }

    /// Ray hit the ground with the spring at `length`. Landing after a miss
    /// starts a fresh compression history so the damper sees no jump.
    pub fn record_hit(&mut self, length: f32) {
        self.previous_length = if self.contact {
            self.suspension_length
        } else {
            length
        };
        self.contact = true;
        self.suspension_length = length;
    }

    pub fn record_miss(&mut self, rest_length: f32) {
        self.contact = false;
        self.suspension_length = rest_length;
        self.previous_length = rest_length;
        self.load = 0.0;
    }
}

/// The chassis body plus the inputs and per-wheel state of the raycast
/// vehicle riding on it.
#[derive(Component, Debug, Clone)]
pub struct Vehicle {
    /// -1 (full reverse) to 1 (full forward).
    pub throttle: f32,
    pub brake: f32,
    pub handbrake: f32,
    /// Front wheel angle in radians, positive to the left.
    pub steer: f32,
    /// Chassis velocity along its forward axis, in m/s.
    pub forward_speed: f32,
    pub wheels: Vec<WheelState>,
}

impl Vehicle {
    pub fn new(tuning: &CarTuning) -> Self {
        Self {
            throttle: 0.0,
            brake: 0.0,
            handbrake: 0.0,
            steer: 0.0,
            forward_speed: 0.0,
            wheels: tuning.wheels.iter().map(WheelState::at_rest).collect(),
        }
    }

    pub fn release_controls(&mut self) {
        self.throttle = 0.0;
        self.brake = 0.0;
        self.handbrake = 0.0;
    }
}

/// Anchor for the visual car model.
#[derive(Component)]
pub struct Pivot;

#[derive(Component)]
pub struct WheelVisual {
    pub index: usize,
}

#[derive(Component)]
struct FallbackBody;

pub fn start_transform(start: &StartPose) -> Transform {
    Transform::from_translation(Vec3::from_array(start.position))
        .with_rotation(Quat::from_rotation_y(start.yaw))
}

/// Spring plus damper, never pulling the chassis down.
pub fn suspension_force(
    stiffness: f32,
    damping: f32,
    compression: f32,
    compression_velocity: f32,
) -> f32 {
    (stiffness * compression + damping * compression_velocity).max(0.0)
}

/// Sideways tyre force opposing slip, limited by the load on the wheel.
pub fn lateral_grip_force(lateral_speed: f32, load: f32, grip: f32, max_per_load: f32) -> f32 {
    let limit = max_per_load * load;
    (-lateral_speed * grip * load).clamp(-limit, limit)
}

/// Force opposing rolling that at most stops the wheel's share of the
/// mass within one step.
pub fn brake_force(forward_speed: f32, max_force: f32, mass_share: f32, dt: f32) -> f32 {
    if max_force <= 0.0 || forward_speed == 0.0 {
        return 0.0;
    }
    let stopping = forward_speed.abs() * mass_share / dt;
    -forward_speed.signum() * max_force.min(stopping)
}

pub fn drive_force(throttle: f32, engine_force: f32, reverse_force: f32) -> f32 {
    if throttle >= 0.0 {
        throttle * engine_force
    } else {
        throttle * reverse_force
    }
}

pub fn velocity_at_point(linear: Vec3, angular: Vec3, center_of_mass: Vec3, point: Vec3) -> Vec3 {
    linear + angular.cross(point - center_of_mass)
}

/// Roll about +X for a wheel moving along -Z.
pub fn wheel_spin_delta(forward_speed: f32, radius: f32, dt: f32) -> f32 {
    -forward_speed / radius * dt
}

pub fn wheel_visual_transform(wheel: &WheelConfig, state: &WheelState, steer: f32) -> Transform {
    let steer = if wheel.steer { steer } else { 0.0 };
    let center = wheel.anchor_vec3() - Vec3::Y * state.suspension_length;
    // Cylinders stand on +Y; lay them on the axle first.
    let rotation = Quat::from_rotation_y(steer)
        * Quat::from_rotation_x(state.spin)
        * Quat::from_rotation_z(FRAC_PI_2);
    Transform::from_translation(center).with_rotation(rotation)
}

fn spawn_car(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    asset_server: Res<AssetServer>,
    tuning: Res<CarTuning>,
    circuit: Res<ActiveCircuit>,
    mut pending: ResMut<PendingAssets>,
) {
    let size = Vec3::from_array(tuning.chassis_size);
    let start = start_transform(&circuit.file.start);

    let model: Handle<Scene> =
        asset_server.load(GltfAssetLabel::Scene(0).from_asset(tuning.model_path.clone()));
    pending.track(AssetKind::CarModel, tuning.model_path.clone(), model.clone().untyped());

    let tyre_material = materials.add(Color::srgb(0.08, 0.08, 0.08));
    let vehicle = Vehicle::new(&tuning);

    let mut car = commands.spawn((
        RigidBody::Dynamic,
        Collider::cuboid(size.x, size.y, size.z),
        Mass(tuning.mass),
        CenterOfMass(Vec3::from_array(tuning.center_of_mass)),
        LinearDamping(tuning.linear_damping),
        AngularDamping(tuning.angular_damping),
        Friction::new(SURFACE_FRICTION),
        Restitution::new(SURFACE_RESTITUTION),
        start,
        Visibility::default(),
    ));

    car.with_children(|parent| {
        parent
            .spawn((Pivot, Transform::default(), Visibility::default()))
            .with_children(|pivot| {
                pivot.spawn((
                    SceneRoot(model),
                    Transform::from_translation(Vec3::from_array(tuning.model_offset))
                        .with_scale(Vec3::splat(tuning.model_scale)),
                ));
            });

        for (index, (wheel, state)) in tuning.wheels.iter().zip(&vehicle.wheels).enumerate() {
            parent.spawn((
                WheelVisual { index },
                Mesh3d(meshes.add(Cylinder::new(wheel.radius, WHEEL_WIDTH))),
                MeshMaterial3d(tyre_material.clone()),
                wheel_visual_transform(wheel, state, 0.0),
            ));
        }
    });
    car.insert(vehicle);

    info!(
        "Spawned car at {:?} with {} wheels",
        start.translation,
        tuning.wheels.len()
    );
}

pub fn cast_suspension_rays(
    spatial_query: SpatialQuery,
    tuning: Res<CarTuning>,
    mut cars: Query<(Entity, &Position, &Rotation, &mut Vehicle)>,
) {
    for (entity, position, rotation, mut vehicle) in &mut cars {
        let Ok(down) = Dir3::new(rotation.0 * Vec3::NEG_Y) else {
            continue;
        };
        let filter = SpatialQueryFilter::from_excluded_entities([entity]);

        for (wheel, state) in tuning.wheels.iter().zip(vehicle.wheels.iter_mut()) {
            let origin = position.0 + rotation.0 * wheel.anchor_vec3();
            match spatial_query.cast_ray(origin, down, wheel.max_ray_length(), true, &filter) {
                Some(hit) => {
                    state.record_hit((hit.distance - wheel.radius).clamp(0.0, wheel.rest_length))
                }
                None => state.record_miss(wheel.rest_length),
            }
        }
    }
}

pub fn apply_vehicle_forces(
    time: Res<Time>,
    tuning: Res<CarTuning>,
    mut cars: Query<(&Position, &Rotation, &mut Vehicle, Forces)>,
) {
    let dt = time.delta_secs();
    if dt <= 0.0 {
        return;
    }
    let mass_share = tuning.mass_per_wheel();

    for (position, rotation, mut vehicle, mut forces) in &mut cars {
        let up = rotation.0 * Vec3::Y;
        let center_of_mass = position.0 + rotation.0 * Vec3::from_array(tuning.center_of_mass);
        let linear = forces.linear_velocity();
        let angular = forces.angular_velocity();

        vehicle.forward_speed = linear.dot(rotation.0 * Vec3::NEG_Z);
        let (throttle, brake, handbrake, steer) = (
            vehicle.throttle,
            vehicle.brake,
            vehicle.handbrake,
            vehicle.steer,
        );

        for (wheel, state) in tuning.wheels.iter().zip(vehicle.wheels.iter_mut()) {
            let anchor = position.0 + rotation.0 * wheel.anchor_vec3();
            let heading = Quat::from_rotation_y(if wheel.steer { steer } else { 0.0 });
            let wheel_forward = rotation.0 * (heading * Vec3::NEG_Z);
            let wheel_right = rotation.0 * (heading * Vec3::X);

            let point_velocity = velocity_at_point(linear, angular, center_of_mass, anchor);
            let forward_speed = point_velocity.dot(wheel_forward);
            state.spin = (state.spin + wheel_spin_delta(forward_speed, wheel.radius, dt)) % TAU;

            if !state.contact {
                continue;
            }

            let compression = wheel.rest_length - state.suspension_length;
            let compression_velocity = (state.previous_length - state.suspension_length) / dt;
            let load = suspension_force(
                wheel.stiffness,
                wheel.damping,
                compression,
                compression_velocity,
            );
            state.load = load;
            forces.apply_force_at_point(up * load, anchor);

            let mut longitudinal = 0.0;
            if wheel.drive {
                longitudinal += drive_force(throttle, tuning.engine_force, tuning.reverse_force);
            }
            let mut braking = brake * tuning.brake_force;
            if !wheel.steer {
                braking += handbrake * tuning.handbrake_force;
            }
            if throttle == 0.0 && braking == 0.0 {
                braking = tuning.rolling_resistance;
            }
            longitudinal += brake_force(forward_speed, braking, mass_share, dt);

            let lateral = lateral_grip_force(
                point_velocity.dot(wheel_right),
                load,
                tuning.lateral_grip,
                tuning.max_tyre_force_per_load,
            );

            forces.apply_force_at_point(wheel_forward * longitudinal + wheel_right * lateral, anchor);
        }
    }
}

fn update_wheel_visuals(
    tuning: Res<CarTuning>,
    cars: Query<(&Vehicle, &Children)>,
    mut wheels: Query<(&WheelVisual, &mut Transform)>,
) {
    for (vehicle, children) in &cars {
        for child in children.iter() {
            let Ok((visual, mut transform)) = wheels.get_mut(child) else {
                continue;
            };
            let (Some(wheel), Some(state)) =
                (tuning.wheels.get(visual.index), vehicle.wheels.get(visual.index))
            else {
                continue;
            };
            *transform = wheel_visual_transform(wheel, state, vehicle.steer);
        }
    }
}

/// The car model ships its own wheel meshes; the vehicle draws steerable,
/// sprung ones instead.
fn hide_baked_wheel_nodes(
    tuning: Res<CarTuning>,
    mut nodes: Query<(&Name, &mut Visibility), Added<Name>>,
) {
    for (name, mut visibility) in &mut nodes {
        if tuning.hidden_nodes.iter().any(|hidden| hidden == name.as_str()) {
            *visibility = Visibility::Hidden;
        }
    }
}

fn spawn_fallback_body(
    mut commands: Commands,
    mut failures: MessageReader<AssetLoadFailed>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    tuning: Res<CarTuning>,
    pivots: Query<Entity, With<Pivot>>,
) {
    if !failures.read().any(|failed| failed.kind == AssetKind::CarModel) {
        return;
    }
    let size = Vec3::from_array(tuning.chassis_size);
    let body = meshes.add(Cuboid::from_size(size));
    let paint = materials.add(Color::srgb(0.8, 0.1, 0.1));
    for pivot in &pivots {
        commands.entity(pivot).with_child((
            FallbackBody,
            Mesh3d(body.clone()),
            MeshMaterial3d(paint.clone()),
            Transform::default(),
        ));
    }
}

fn handle_reset_car(
    mut resets: MessageReader<ResetCar>,
    circuit: Res<ActiveCircuit>,
    tuning: Res<CarTuning>,
    mut cars: Query<(
        &mut Transform,
        &mut Position,
        &mut Rotation,
        &mut LinearVelocity,
        &mut AngularVelocity,
        &mut Vehicle,
    )>,
) {
    if resets.read().count() == 0 {
        return;
    }
    let start = start_transform(&circuit.file.start);
    for (mut transform, mut position, mut rotation, mut linear, mut angular, mut vehicle) in
        &mut cars
    {
        *transform = start;
        position.0 = start.translation;
        rotation.0 = start.rotation;
        linear.0 = Vec3::ZERO;
        angular.0 = Vec3::ZERO;
        *vehicle = Vehicle::new(&tuning);
    }
    info!("Car reset to start");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_format::CircuitFile;

    #[test]
    fn suspension_pushes_when_compressed() {
        assert_eq!(suspension_force(6000.0, 600.0, 0.1, 0.0), 600.0);
        assert_eq!(suspension_force(6000.0, 600.0, 0.1, 0.5), 900.0);
    }

    #[test]
    fn suspension_never_pulls() {
        assert_eq!(suspension_force(6000.0, 600.0, 0.01, -5.0), 0.0);
        assert_eq!(suspension_force(6000.0, 600.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn lateral_grip_opposes_slip_and_is_capped_by_load() {
        let force = lateral_grip_force(0.5, 400.0, 1.0, 1.2);
        assert_eq!(force, -200.0);

        let capped = lateral_grip_force(-10.0, 400.0, 1.0, 1.2);
        assert!((capped - 480.0).abs() < 1e-3);

        assert_eq!(lateral_grip_force(3.0, 0.0, 1.0, 1.2), 0.0);
    }

    #[test]
    fn brake_opposes_motion_without_overshooting() {
        assert_eq!(brake_force(10.0, 800.0, 37.5, 1.0 / 60.0), -800.0);
        assert_eq!(brake_force(-10.0, 800.0, 37.5, 1.0 / 60.0), 800.0);

        let slow = brake_force(0.1, 800.0, 37.5, 1.0 / 60.0);
        assert!((slow + 225.0).abs() < 1e-3);

        assert_eq!(brake_force(0.0, 800.0, 37.5, 1.0 / 60.0), 0.0);
        assert_eq!(brake_force(5.0, 0.0, 37.5, 1.0 / 60.0), 0.0);
    }

    #[test]
    fn reverse_uses_reverse_force() {
        assert_eq!(drive_force(1.0, 500.0, 250.0), 500.0);
        assert_eq!(drive_force(-1.0, 500.0, 250.0), -250.0);
        assert_eq!(drive_force(0.0, 500.0, 250.0), 0.0);
    }

    #[test]
    fn point_velocity_includes_rotation() {
        let v = velocity_at_point(Vec3::ZERO, Vec3::Y, Vec3::ZERO, Vec3::NEG_Z);
        assert!(v.abs_diff_eq(Vec3::NEG_X, 1e-6));

        let v = velocity_at_point(Vec3::X, Vec3::ZERO, Vec3::ZERO, Vec3::new(3.0, 1.0, 2.0));
        assert_eq!(v, Vec3::X);
    }

    #[test]
    fn wheel_rolls_forward() {
        let delta = wheel_spin_delta(3.0, 0.3, 0.1);
        assert!((delta + 1.0).abs() < 1e-6);

        // Top of the wheel moves toward the front (-Z) when driving forward.
        let top = Quat::from_rotation_x(delta) * Vec3::Y;
        assert!(top.z < 0.0);
    }

    #[test]
    fn wheel_visual_follows_suspension_and_steering() {
        let wheel = CarTuning::default().wheels[0].clone();
        let mut state = WheelState::at_rest(&wheel);
        state.suspension_length = 0.2;

        let transform = wheel_visual_transform(&wheel, &state, 0.3);
        let expected = wheel.anchor_vec3() - Vec3::Y * 0.2;
        assert!(transform.translation.abs_diff_eq(expected, 1e-6));

        // The axle points along X before steering and turns with it.
        let axle = transform.rotation * Vec3::Y;
        assert!(axle.abs_diff_eq(Quat::from_rotation_y(0.3) * Vec3::NEG_X, 1e-5));
    }

    #[test]
    fn rear_wheels_ignore_steering() {
        let wheel = CarTuning::default().wheels[3].clone();
        assert!(!wheel.steer);
        let state = WheelState::at_rest(&wheel);
        let straight = wheel_visual_transform(&wheel, &state, 0.0);
        let steered = wheel_visual_transform(&wheel, &state, 0.3);
        assert_eq!(straight, steered);
    }

    #[test]
    fn start_pose_faces_along_yaw() {
        let start = StartPose {
            position: [1.0, 2.0, 3.0],
            yaw: -FRAC_PI_2,
        };
        let transform = start_transform(&start);
        assert_eq!(transform.translation, Vec3::new(1.0, 2.0, 3.0));
        assert!(transform.forward().as_vec3().abs_diff_eq(Vec3::X, 1e-5));
    }

    #[test]
    fn landing_has_no_damper_spike() {
        let wheel = CarTuning::default().wheels[0].clone();
        let mut state = WheelState::at_rest(&wheel);

        state.record_hit(0.1);
        assert!(state.contact);
        assert_eq!(state.previous_length, state.suspension_length);

        state.record_hit(0.08);
        assert_eq!(state.previous_length, 0.1);
        assert_eq!(state.suspension_length, 0.08);

        state.record_miss(wheel.rest_length);
        assert!(!state.contact);
        assert_eq!(state.load, 0.0);
        state.record_hit(0.05);
        assert_eq!(state.previous_length, 0.05);
    }

    #[test]
    fn reset_puts_car_back_on_start_at_rest() {
        let mut circuit = CircuitFile::new_empty("test");
        circuit.start = StartPose {
            position: [-20.0, -0.8, -9.0],
            yaw: -FRAC_PI_2,
        };
        let tuning = CarTuning::default();

        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .add_message::<ResetCar>()
            .insert_resource(ActiveCircuit { file: circuit })
            .insert_resource(tuning.clone())
            .add_systems(Update, handle_reset_car);

        let mut vehicle = Vehicle::new(&tuning);
        vehicle.throttle = 1.0;
        vehicle.wheels[0].spin = 2.0;
        let car = app
            .world_mut()
            .spawn((
                vehicle,
                Transform::from_xyz(50.0, 3.0, 12.0),
                Position(Vec3::new(50.0, 3.0, 12.0)),
                Rotation(Quat::from_rotation_z(1.0)),
                LinearVelocity(Vec3::new(12.0, 0.0, -4.0)),
                AngularVelocity(Vec3::new(0.0, 3.0, 0.0)),
            ))
            .id();

        app.update();
        let untouched = app.world().get::<Position>(car).unwrap();
        assert_eq!(untouched.0, Vec3::new(50.0, 3.0, 12.0));

        app.world_mut().write_message(ResetCar);
        app.update();

        let world = app.world();
        let expected = Vec3::new(-20.0, -0.8, -9.0);
        assert_eq!(world.get::<Transform>(car).unwrap().translation, expected);
        assert_eq!(world.get::<Position>(car).unwrap().0, expected);
        let rotation = world.get::<Rotation>(car).unwrap().0;
        assert!((rotation * Vec3::NEG_Z).abs_diff_eq(Vec3::X, 1e-5));
        assert_eq!(world.get::<LinearVelocity>(car).unwrap().0, Vec3::ZERO);
        assert_eq!(world.get::<AngularVelocity>(car).unwrap().0, Vec3::ZERO);

        let vehicle = world.get::<Vehicle>(car).unwrap();
        assert_eq!(vehicle.throttle, 0.0);
        assert_eq!(vehicle.wheels[0].spin, 0.0);
    }

    #[test]
    fn new_vehicle_starts_at_rest_length() {
        let tuning = CarTuning::default();
        let vehicle = Vehicle::new(&tuning);
        assert_eq!(vehicle.wheels.len(), tuning.wheels.len());
        assert!(
            vehicle
                .wheels
                .iter()
                .zip(&tuning.wheels)
                .all(|(state, wheel)| state.suspension_length == wheel.rest_length)
        );
    }
}

use avian3d::prelude::*;
use bevy::prelude::*;

use crate::assets::{AssetKind, PendingAssets};
use crate::circuit_format::{Barrel, CircuitLight, Ramp, Road, Wall};
use crate::config::ActiveCircuit;

/// Friction and restitution shared by every body, matching a default
/// contact material of 0.3 / 0.1.
pub const SURFACE_FRICTION: f32 = 0.3;
pub const SURFACE_RESTITUTION: f32 = 0.1;

pub struct CircuitPlugin;

impl Plugin for CircuitPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, setup_circuit);
    }
}

/// Kerb cross-section, in metres.
const KERB_WIDTH: f32 = 1.0;
const KERB_HEIGHT: f32 = 1.0;

/// Flat ring drawn on the ground around a checkpoint; `index` matches
/// `Checkpoints::points`.
#[derive(Component)]
pub struct CheckpointMarker {
    pub index: usize,
}

pub fn wall_transform(wall: &Wall) -> Transform {
    Transform::from_translation(Vec3::from_array(wall.position))
        .with_rotation(Quat::from_rotation_y(wall.yaw))
}

pub fn ramp_transform(ramp: &Ramp) -> Transform {
    Transform::from_translation(Vec3::from_array(ramp.position))
        .with_rotation(Quat::from_rotation_x(ramp.pitch))
}

pub fn road_transform(road: &Road) -> Transform {
    Transform::from_translation(Vec3::from_array(road.position))
        .with_rotation(Quat::from_rotation_y(road.yaw))
}

/// Red kerb then white kerb, standing on the slab at `±marker_offset`
/// across the road and running its full length.
pub fn road_kerb_transforms(road: &Road) -> [Transform; 2] {
    let slab = road_transform(road);
    let lift = (road.height + KERB_HEIGHT) / 2.0;
    [road.marker_offset, -road.marker_offset].map(|offset| {
        Transform::from_translation(slab.transform_point(Vec3::new(offset, lift, 0.0)))
            .with_rotation(slab.rotation)
    })
}

/// Spot lights shine down their local -Z, so aim that at the target.
pub fn light_transform(light: &CircuitLight) -> Transform {
    let position = Vec3::from_array(light.position);
    let target = Vec3::from_array(light.target);
    let up = if (target - position).normalize_or_zero().cross(Vec3::Y).length_squared() < 1e-6 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    Transform::from_translation(position).looking_at(target, up)
}

pub fn color_from_hex(hex: u32) -> Color {
    Color::srgb_u8(
        ((hex >> 16) & 0xff) as u8,
        ((hex >> 8) & 0xff) as u8,
        (hex & 0xff) as u8,
    )
}

fn setup_circuit(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    asset_server: Res<AssetServer>,
    circuit: Res<ActiveCircuit>,
    mut pending: ResMut<PendingAssets>,
) {
    let circuit = &circuit.file;

    // Unbounded collider, semi-transparent slab to show where it is.
    let ground = &circuit.ground;
    commands.spawn((
        RigidBody::Static,
        Collider::half_space(Vec3::Y),
        Friction::new(SURFACE_FRICTION),
        Restitution::new(SURFACE_RESTITUTION),
        Transform::from_xyz(0.0, ground.height, 0.0),
    ));
    commands.spawn((
        Mesh3d(meshes.add(Cuboid::new(ground.size[0], 1.0, ground.size[1]))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgba(0.33, 0.33, 0.33, 0.5),
            alpha_mode: AlphaMode::Blend,
            ..default()
        })),
        Transform::from_xyz(0.0, ground.height - 0.5, 0.0),
    ));

    let wall_material = materials.add(Color::srgb(0.8, 0.8, 0.8));
    for wall in &circuit.walls {
        let size = wall.size.to_vec3();
        commands.spawn((
            RigidBody::Static,
            Collider::cuboid(size.x, size.y, size.z),
            Friction::new(SURFACE_FRICTION),
            Restitution::new(SURFACE_RESTITUTION),
            Mesh3d(meshes.add(Cuboid::from_size(size))),
            MeshMaterial3d(wall_material.clone()),
            wall_transform(wall),
        ));
    }

    let barrel_material = materials.add(Color::srgb_u8(0x88, 0x44, 0x22));
    for barrel in &circuit.barrels {
        spawn_barrel(&mut commands, &mut meshes, barrel_material.clone(), barrel);
    }

    let ramp_material = materials.add(Color::srgb_u8(0x33, 0x66, 0xcc));
    for ramp in &circuit.ramps {
        let size = ramp.size.to_vec3();
        commands.spawn((
            RigidBody::Static,
            Collider::cuboid(size.x, size.y, size.z),
            Friction::new(SURFACE_FRICTION),
            Restitution::new(SURFACE_RESTITUTION),
            Mesh3d(meshes.add(Cuboid::from_size(size))),
            MeshMaterial3d(ramp_material.clone()),
            ramp_transform(ramp),
        ));
    }

    let road_material = materials.add(Color::srgb_u8(0x66, 0x66, 0x66));
    let kerb_materials = [
        materials.add(Color::srgb_u8(0xff, 0x00, 0x00)),
        materials.add(Color::WHITE),
    ];
    for road in &circuit.roads {
        spawn_road(&mut commands, &mut meshes, &road_material, &kerb_materials, road);
    }

    commands.spawn((
        DirectionalLight {
            illuminance: 8_000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(5.0, 5.0, 5.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
    for light in &circuit.lights {
        commands.spawn((
            SpotLight {
                color: color_from_hex(light.color),
                intensity: light.intensity,
                range: 30.0,
                outer_angle: 0.8,
                inner_angle: 0.5,
                ..default()
            },
            light_transform(light),
        ));
    }

    let ring = meshes.add(Torus {
        minor_radius: 0.08,
        major_radius: 1.0,
    });
    let checkpoint_material = materials.add(StandardMaterial {
        base_color: Color::srgba(1.0, 0.85, 0.1, 0.6),
        alpha_mode: AlphaMode::Blend,
        unlit: true,
        ..default()
    });
    for (index, checkpoint) in circuit.checkpoints.iter().enumerate() {
        commands.spawn((
            CheckpointMarker { index },
            Mesh3d(ring.clone()),
            MeshMaterial3d(checkpoint_material.clone()),
            Transform::from_translation(Vec3::from_array(checkpoint.position))
                .with_scale(Vec3::splat(checkpoint.radius)),
        ));
    }
    commands.spawn((
        Mesh3d(ring),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgba(1.0, 1.0, 1.0, 0.7),
            alpha_mode: AlphaMode::Blend,
            unlit: true,
            ..default()
        })),
        Transform::from_translation(circuit.finish_position())
            .with_scale(Vec3::splat(circuit.finish.radius)),
    ));

    if let Some(model) = &circuit.model {
        let scene: Handle<Scene> =
            asset_server.load(GltfAssetLabel::Scene(0).from_asset(model.path.clone()));
        pending.track(AssetKind::CircuitModel, model.path.clone(), scene.clone().untyped());
        commands.spawn((
            SceneRoot(scene),
            Transform::from_translation(Vec3::from_array(model.position))
                .with_scale(Vec3::splat(model.scale)),
        ));
    }

    info!(
        "Spawned circuit '{}' ({} walls, {} barrels, {} ramps, {} roads)",
        circuit.metadata.name,
        circuit.walls.len(),
        circuit.barrels.len(),
        circuit.ramps.len(),
        circuit.roads.len()
    );
}

fn spawn_road(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    road_material: &Handle<StandardMaterial>,
    kerb_materials: &[Handle<StandardMaterial>; 2],
    road: &Road,
) {
    commands.spawn((
        RigidBody::Static,
        Collider::cuboid(road.width, road.height, road.length),
        Friction::new(SURFACE_FRICTION),
        Restitution::new(SURFACE_RESTITUTION),
        Mesh3d(meshes.add(Cuboid::new(road.width, road.height, road.length))),
        MeshMaterial3d(road_material.clone()),
        road_transform(road),
    ));

    let kerb = meshes.add(Cuboid::new(KERB_WIDTH, KERB_HEIGHT, road.length));
    for (transform, material) in road_kerb_transforms(road).into_iter().zip(kerb_materials) {
        commands.spawn((
            RigidBody::Static,
            Collider::cuboid(KERB_WIDTH, KERB_HEIGHT, road.length),
            Friction::new(SURFACE_FRICTION),
            Restitution::new(SURFACE_RESTITUTION),
            Mesh3d(kerb.clone()),
            MeshMaterial3d(material.clone()),
            transform,
        ));
    }
}

fn spawn_barrel(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    material: Handle<StandardMaterial>,
    barrel: &Barrel,
) {
    // Both the collider and the mesh stand along +Y; avian keeps the
    // transform in sync with the body every step.
    commands.spawn((
        RigidBody::Dynamic,
        Collider::cylinder(barrel.radius, barrel.height),
        Mass(barrel.mass),
        Friction::new(SURFACE_FRICTION),
        Restitution::new(SURFACE_RESTITUTION),
        Mesh3d(meshes.add(Cylinder::new(barrel.radius, barrel.height))),
        MeshMaterial3d(material),
        Transform::from_translation(Vec3::from_array(barrel.position)),
    ));
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;
    use crate::circuit_format::BoxSize;

    #[test]
    fn wall_yaw_turns_width_axis() {
        let wall = Wall {
            position: [1.0, -1.0, 2.0],
            size: BoxSize {
                width: 40.0,
                height: 1.0,
                depth: 1.0,
            },
            yaw: FRAC_PI_2,
        };
        let transform = wall_transform(&wall);
        assert_eq!(transform.translation, Vec3::new(1.0, -1.0, 2.0));
        let width_axis = transform.rotation * Vec3::X;
        assert!(width_axis.abs_diff_eq(Vec3::NEG_Z, 1e-5));
    }

    #[test]
    fn ramp_pitch_raises_far_end() {
        let ramp = Ramp {
            position: [0.0, 0.0, 0.0],
            size: BoxSize {
                width: 2.0,
                height: 0.5,
                depth: 4.0,
            },
            pitch: 0.1,
        };
        let transform = ramp_transform(&ramp);
        let front = transform.transform_point(Vec3::new(0.0, 0.0, -2.0));
        let back = transform.transform_point(Vec3::new(0.0, 0.0, 2.0));
        assert!(front.y > back.y);
    }

    #[test]
    fn kerbs_sit_on_both_edges_of_the_road() {
        let road = Road {
            position: [0.0, -1.0, -20.0],
            width: 20.0,
            length: 20.0,
            height: 1.0,
            marker_offset: 10.0,
            yaw: 0.0,
        };
        let [red, white] = road_kerb_transforms(&road);
        assert!(red.translation.abs_diff_eq(Vec3::new(10.0, 0.0, -20.0), 1e-5));
        assert!(white.translation.abs_diff_eq(Vec3::new(-10.0, 0.0, -20.0), 1e-5));
    }

    #[test]
    fn kerbs_turn_with_the_road() {
        let road = Road {
            position: [5.0, 0.0, 5.0],
            width: 8.0,
            length: 30.0,
            height: 0.5,
            marker_offset: 4.0,
            yaw: FRAC_PI_2,
        };
        let [red, white] = road_kerb_transforms(&road);
        // Local +X points to world -Z after a quarter turn.
        assert!(red.translation.abs_diff_eq(Vec3::new(5.0, 0.75, 1.0), 1e-5));
        assert!(white.translation.abs_diff_eq(Vec3::new(5.0, 0.75, 9.0), 1e-5));
        let length_axis = red.rotation * Vec3::Z;
        assert!(length_axis.abs_diff_eq(Vec3::X, 1e-5));
    }

    #[test]
    fn light_points_at_target() {
        let light = CircuitLight {
            position: [-10.46, 5.0, -15.28],
            target: [-10.46, 1.0, -10.0],
            color: 0xffffff,
            intensity: 1.0,
        };
        let transform = light_transform(&light);
        let expected = (Vec3::new(-10.46, 1.0, -10.0) - Vec3::new(-10.46, 5.0, -15.28)).normalize();
        assert!(transform.forward().as_vec3().abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn light_straight_down_still_has_valid_rotation() {
        let light = CircuitLight {
            position: [0.0, 5.0, 0.0],
            target: [0.0, 0.0, 0.0],
            color: 0xffffff,
            intensity: 1.0,
        };
        let transform = light_transform(&light);
        assert!(transform.rotation.is_finite());
        assert!(transform.forward().as_vec3().abs_diff_eq(Vec3::NEG_Y, 1e-5));
    }

    #[test]
    fn hex_colors_split_into_channels() {
        let color = color_from_hex(0x884422).to_srgba();
        assert!((color.red - 0x88 as f32 / 255.0).abs() < 1e-6);
        assert!((color.green - 0x44 as f32 / 255.0).abs() < 1e-6);
        assert!((color.blue - 0x22 as f32 / 255.0).abs() < 1e-6);
    }
}

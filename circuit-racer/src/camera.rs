use bevy::prelude::*;
use bevy::transform::TransformSystems;

use crate::config::CameraFollowParams;
use crate::vehicle::Vehicle;

pub struct CameraFollowPlugin;

impl Plugin for CameraFollowPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, spawn_camera).add_systems(
            PostUpdate,
            update_follow_camera.before(TransformSystems::Propagate),
        );
    }
}

#[derive(Component)]
pub struct FollowCamera;

/// Where the camera wants to be and what it looks at, for a car at
/// `car`. The offset is expressed in the car's frame.
pub fn follow_target(car: &Transform, params: &CameraFollowParams) -> (Vec3, Vec3) {
    let desired = car.translation + car.rotation * params.offset_vec3();
    let look_at = car.translation + Vec3::Y * params.look_at_offset_y;
    (desired, look_at)
}

fn spawn_camera(mut commands: Commands) {
    commands.spawn((
        FollowCamera,
        Camera3d::default(),
        Projection::Perspective(PerspectiveProjection {
            fov: 75.0_f32.to_radians(),
            near: 0.1,
            far: 1000.0,
            ..default()
        }),
        Transform::from_xyz(0.0, 4.0, 10.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
}

fn update_follow_camera(
    params: Res<CameraFollowParams>,
    cars: Query<&Transform, With<Vehicle>>,
    mut cameras: Query<&mut Transform, (With<FollowCamera>, Without<Vehicle>)>,
) {
    let Ok(car) = cars.single() else {
        return;
    };
    let Ok(mut camera) = cameras.single_mut() else {
        return;
    };

    let (desired, look_at) = follow_target(car, &params);
    camera.translation = camera.translation.lerp(desired, params.smooth_factor);
    camera.look_at(look_at, Vec3::Y);
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;

    #[test]
    fn camera_sits_behind_and_above_unrotated_car() {
        let params = CameraFollowParams::default();
        let car = Transform::from_xyz(10.0, 0.0, -5.0);
        let (desired, look_at) = follow_target(&car, &params);
        assert!(desired.abs_diff_eq(Vec3::new(10.0, 1.6, -1.8), 1e-5));
        assert!(look_at.abs_diff_eq(Vec3::new(10.0, 1.1, -5.0), 1e-5));
    }

    #[test]
    fn offset_turns_with_the_car() {
        let params = CameraFollowParams::default();
        // Facing +X: "behind" is now -X.
        let car = Transform::from_rotation(Quat::from_rotation_y(-FRAC_PI_2));
        assert!(car.forward().as_vec3().abs_diff_eq(Vec3::X, 1e-5));

        let (desired, _) = follow_target(&car, &params);
        assert!(desired.abs_diff_eq(Vec3::new(-3.2, 1.6, 0.0), 1e-5));
    }

    #[test]
    fn look_at_ignores_car_rotation() {
        let params = CameraFollowParams::default();
        let car = Transform::from_xyz(1.0, 2.0, 3.0).with_rotation(Quat::from_rotation_y(1.0));
        let (_, look_at) = follow_target(&car, &params);
        assert!(look_at.abs_diff_eq(Vec3::new(1.0, 3.1, 3.0), 1e-5));
    }
}

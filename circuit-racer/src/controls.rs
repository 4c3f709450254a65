use bevy::prelude::*;

use crate::config::CarTuning;
use crate::race::GameState;
use crate::vehicle::{ResetCar, Vehicle};

/// Below this forward speed, holding "back" reverses instead of braking.
const REVERSE_THRESHOLD: f32 = 0.5;

pub struct ControlsPlugin;

impl Plugin for ControlsPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, handle_car_input);
    }
}

/// Keys held this frame, already merged across WASD and the arrows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveKeys {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub handbrake: bool,
}

impl DriveKeys {
    pub fn from_keyboard(keyboard: &ButtonInput<KeyCode>) -> Self {
        Self {
            forward: keyboard.any_pressed([KeyCode::KeyW, KeyCode::ArrowUp]),
            backward: keyboard.any_pressed([KeyCode::KeyS, KeyCode::ArrowDown]),
            left: keyboard.any_pressed([KeyCode::KeyA, KeyCode::ArrowLeft]),
            right: keyboard.any_pressed([KeyCode::KeyD, KeyCode::ArrowRight]),
            handbrake: keyboard.pressed(KeyCode::Space),
        }
    }
}

/// Steering angle that ramps toward full lock while a key is held and
/// returns to centre when released. Full lock shrinks with speed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SteeringState {
    pub angle: f32,
}

impl SteeringState {
    pub fn max_angle(speed: f32, tuning: &CarTuning) -> f32 {
        let ratio = (speed.abs() / tuning.top_speed).clamp(0.0, 1.0);
        tuning.max_steer + (tuning.max_steer_at_top_speed - tuning.max_steer) * ratio
    }

    pub fn update(&mut self, left: bool, right: bool, speed: f32, dt: f32, tuning: &CarTuning) {
        let max = Self::max_angle(speed, tuning);
        if left && !right {
            self.angle = (self.angle + tuning.steer_speed * dt).min(max);
        } else if right && !left {
            self.angle = (self.angle - tuning.steer_speed * dt).max(-max);
        } else if self.angle > 0.0 {
            self.angle = (self.angle - tuning.steer_return_speed * dt).max(0.0);
        } else if self.angle < 0.0 {
            self.angle = (self.angle + tuning.steer_return_speed * dt).min(0.0);
        }
    }
}

/// Returns `(throttle, brake)`. "Back" brakes while rolling forward and
/// reverses once the car has (nearly) stopped.
pub fn longitudinal_command(forward: bool, backward: bool, forward_speed: f32) -> (f32, f32) {
    if forward {
        (1.0, 0.0)
    } else if backward {
        if forward_speed > REVERSE_THRESHOLD {
            (0.0, 1.0)
        } else {
            (-1.0, 0.0)
        }
    } else {
        (0.0, 0.0)
    }
}

fn handle_car_input(
    keyboard: Res<ButtonInput<KeyCode>>,
    time: Res<Time>,
    tuning: Res<CarTuning>,
    state: Res<State<GameState>>,
    mut cars: Query<&mut Vehicle>,
    mut resets: MessageWriter<ResetCar>,
) {
    let driving = *state.get() == GameState::Racing;
    let keys = if driving {
        DriveKeys::from_keyboard(&keyboard)
    } else {
        DriveKeys::default()
    };
    let dt = time.delta_secs();

    for mut vehicle in &mut cars {
        let (throttle, brake) =
            longitudinal_command(keys.forward, keys.backward, vehicle.forward_speed);
        vehicle.throttle = throttle;
        vehicle.brake = brake;
        vehicle.handbrake = if keys.handbrake { 1.0 } else { 0.0 };

        let mut steering = SteeringState {
            angle: vehicle.steer,
        };
        steering.update(keys.left, keys.right, vehicle.forward_speed, dt, &tuning);
        vehicle.steer = steering.angle;

        if !driving {
            vehicle.release_controls();
        }
    }

    if driving && keyboard.just_pressed(KeyCode::KeyR) {
        resets.write(ResetCar);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steering_ramps_to_low_speed_lock() {
        let tuning = CarTuning::default();
        let mut steering = SteeringState::default();
        steering.update(true, false, 0.0, 0.1, &tuning);
        assert!((steering.angle - 0.1).abs() < 1e-6);

        for _ in 0..20 {
            steering.update(true, false, 0.0, 0.1, &tuning);
        }
        assert!((steering.angle - tuning.max_steer).abs() < 1e-6);
    }

    #[test]
    fn lock_shrinks_with_speed() {
        let tuning = CarTuning::default();
        assert_eq!(SteeringState::max_angle(0.0, &tuning), tuning.max_steer);
        assert!(
            (SteeringState::max_angle(tuning.top_speed, &tuning) - tuning.max_steer_at_top_speed)
                .abs()
                < 1e-6
        );
        assert!(
            (SteeringState::max_angle(tuning.top_speed * 3.0, &tuning)
                - tuning.max_steer_at_top_speed)
                .abs()
                < 1e-6
        );
        let half = SteeringState::max_angle(-tuning.top_speed / 2.0, &tuning);
        assert!((half - 0.25).abs() < 1e-6);

        let mut steering = SteeringState { angle: 0.3 };
        steering.update(true, false, tuning.top_speed, 0.1, &tuning);
        assert!((steering.angle - tuning.max_steer_at_top_speed).abs() < 1e-6);
    }

    #[test]
    fn steering_returns_to_centre_without_overshoot() {
        let tuning = CarTuning::default();
        let mut steering = SteeringState { angle: -0.15 };
        steering.update(false, false, 0.0, 0.05, &tuning);
        assert!((steering.angle + 0.05).abs() < 1e-6);
        steering.update(false, false, 0.0, 0.05, &tuning);
        assert_eq!(steering.angle, 0.0);
        steering.update(false, false, 0.0, 0.05, &tuning);
        assert_eq!(steering.angle, 0.0);
    }

    #[test]
    fn right_steers_negative() {
        let tuning = CarTuning::default();
        let mut steering = SteeringState::default();
        steering.update(false, true, 0.0, 0.1, &tuning);
        assert!(steering.angle < 0.0);
    }

    #[test]
    fn back_brakes_then_reverses() {
        assert_eq!(longitudinal_command(true, false, 0.0), (1.0, 0.0));
        assert_eq!(longitudinal_command(true, true, 10.0), (1.0, 0.0));
        assert_eq!(longitudinal_command(false, true, 10.0), (0.0, 1.0));
        assert_eq!(longitudinal_command(false, true, 0.2), (-1.0, 0.0));
        assert_eq!(longitudinal_command(false, true, -3.0), (-1.0, 0.0));
        assert_eq!(longitudinal_command(false, false, 5.0), (0.0, 0.0));
    }

    #[test]
    fn keyboard_maps_both_layouts() {
        let mut keyboard = ButtonInput::<KeyCode>::default();
        keyboard.press(KeyCode::ArrowUp);
        keyboard.press(KeyCode::KeyA);
        keyboard.press(KeyCode::Space);
        let keys = DriveKeys::from_keyboard(&keyboard);
        assert_eq!(
            keys,
            DriveKeys {
                forward: true,
                backward: false,
                left: true,
                right: false,
                handbrake: true,
            }
        );
    }
}

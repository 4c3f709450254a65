use avian3d::prelude::*;
use bevy::prelude::*;

use crate::circuit::CheckpointMarker;
use crate::config::ActiveCircuit;
use crate::vehicle::{ResetCar, Vehicle};

pub const COUNTDOWN_SECONDS: f32 = 3.0;

pub struct RacePlugin;

impl Plugin for RacePlugin {
    fn build(&self, app: &mut App) {
        app.init_state::<GameState>()
            .init_resource::<RaceClock>()
            .init_resource::<Checkpoints>()
            .init_resource::<Finish>()
            .add_message::<CheckpointPassed>()
            .add_message::<RaceFinished>()
            .add_systems(Startup, load_race_layout)
            .add_systems(OnEnter(GameState::StartScreen), pause_physics)
            .add_systems(OnEnter(GameState::Countdown), (reset_race, unpause_physics))
            .add_systems(
                Update,
                (
                    tick_countdown.run_if(in_state(GameState::Countdown)),
                    (tick_race_clock, detect_checkpoints, detect_finish)
                        .chain()
                        .run_if(in_state(GameState::Racing)),
                    (log_checkpoints, show_checkpoint_markers),
                ),
            );
    }
}

#[derive(States, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GameState {
    #[default]
    StartScreen,
    Countdown,
    Racing,
    Finished,
}

#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub struct CheckpointPassed {
    pub index: usize,
}

#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub struct RaceFinished {
    pub time: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Checkpoint {
    pub position: Vec3,
    pub radius: f32,
    pub passed: bool,
}

impl Checkpoint {
    pub fn contains(&self, point: Vec3) -> bool {
        self.position.distance(point) <= self.radius
    }
}

/// Checkpoints may be passed in any order; each one counts once.
#[derive(Resource, Debug, Clone, Default)]
pub struct Checkpoints {
    pub points: Vec<Checkpoint>,
}

impl Checkpoints {
    pub fn new(points: impl IntoIterator<Item = (Vec3, f32)>) -> Self {
        Self {
            points: points
                .into_iter()
                .map(|(position, radius)| Checkpoint {
                    position,
                    radius,
                    passed: false,
                })
                .collect(),
        }
    }

    /// Marks every checkpoint around `position` and returns the ones that
    /// were not passed before.
    pub fn update(&mut self, position: Vec3) -> Vec<usize> {
        let mut newly_passed = Vec::new();
        for (index, checkpoint) in self.points.iter_mut().enumerate() {
            if !checkpoint.passed && checkpoint.contains(position) {
                checkpoint.passed = true;
                newly_passed.push(index);
            }
        }
        newly_passed
    }

    pub fn passed_count(&self) -> usize {
        self.points.iter().filter(|c| c.passed).count()
    }

    pub fn all_passed(&self) -> bool {
        self.points.iter().all(|c| c.passed)
    }

    pub fn reset(&mut self) {
        for checkpoint in &mut self.points {
            checkpoint.passed = false;
        }
    }
}

#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct Finish {
    pub position: Vec3,
    pub radius: f32,
}

impl Default for Finish {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            radius: 5.0,
        }
    }
}

impl Finish {
    /// The line only counts once every checkpoint is behind the car.
    pub fn is_crossed(&self, position: Vec3, checkpoints: &Checkpoints) -> bool {
        checkpoints.all_passed() && self.position.distance(position) <= self.radius
    }
}

#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct RaceClock {
    pub countdown_remaining: f32,
    pub elapsed: f32,
    pub final_time: Option<f32>,
}

impl Default for RaceClock {
    fn default() -> Self {
        Self {
            countdown_remaining: COUNTDOWN_SECONDS,
            elapsed: 0.0,
            final_time: None,
        }
    }
}

impl RaceClock {
    /// Returns true on the tick the countdown reaches zero.
    pub fn tick_countdown(&mut self, dt: f32) -> bool {
        if self.countdown_remaining <= 0.0 {
            return false;
        }
        self.countdown_remaining = (self.countdown_remaining - dt).max(0.0);
        self.countdown_remaining == 0.0
    }

    pub fn tick(&mut self, dt: f32) {
        if self.final_time.is_none() {
            self.elapsed += dt;
        }
    }

    pub fn finish(&mut self) -> f32 {
        *self.final_time.get_or_insert(self.elapsed)
    }

    /// The time to show: frozen after the finish, live before it.
    pub fn display_time(&self) -> f32 {
        self.final_time.unwrap_or(self.elapsed)
    }
}

fn load_race_layout(mut commands: Commands, circuit: Res<ActiveCircuit>) {
    let circuit = &circuit.file;
    commands.insert_resource(Checkpoints::new(
        circuit
            .checkpoints
            .iter()
            .map(|c| (Vec3::from_array(c.position), c.radius)),
    ));
    commands.insert_resource(Finish {
        position: circuit.finish_position(),
        radius: circuit.finish.radius,
    });
}

fn pause_physics(mut physics_time: ResMut<Time<Physics>>) {
    physics_time.pause();
}

fn unpause_physics(mut physics_time: ResMut<Time<Physics>>) {
    physics_time.unpause();
}

/// Entering the countdown always starts a fresh attempt, whether from the
/// start screen or a restart.
fn reset_race(
    mut clock: ResMut<RaceClock>,
    mut checkpoints: ResMut<Checkpoints>,
    mut resets: MessageWriter<ResetCar>,
) {
    *clock = RaceClock::default();
    checkpoints.reset();
    resets.write(ResetCar);
    info!("Countdown started");
}

fn tick_countdown(
    time: Res<Time>,
    mut clock: ResMut<RaceClock>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if clock.tick_countdown(time.delta_secs()) {
        info!("Go!");
        next_state.set(GameState::Racing);
    }
}

fn tick_race_clock(time: Res<Time>, mut clock: ResMut<RaceClock>) {
    clock.tick(time.delta_secs());
}

pub fn detect_checkpoints(
    cars: Query<&Transform, With<Vehicle>>,
    mut checkpoints: ResMut<Checkpoints>,
    mut passed: MessageWriter<CheckpointPassed>,
) {
    for transform in &cars {
        for index in checkpoints.update(transform.translation) {
            passed.write(CheckpointPassed { index });
        }
    }
}

fn detect_finish(
    cars: Query<&Transform, With<Vehicle>>,
    checkpoints: Res<Checkpoints>,
    finish: Res<Finish>,
    mut clock: ResMut<RaceClock>,
    mut finished: MessageWriter<RaceFinished>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    for transform in &cars {
        if finish.is_crossed(transform.translation, &checkpoints) {
            let time = clock.finish();
            info!("Finished in {time:.2}s");
            finished.write(RaceFinished { time });
            next_state.set(GameState::Finished);
            return;
        }
    }
}

fn log_checkpoints(mut passed: MessageReader<CheckpointPassed>, checkpoints: Res<Checkpoints>) {
    for event in passed.read() {
        info!(
            "Checkpoint {} passed ({}/{})",
            event.index + 1,
            checkpoints.passed_count(),
            checkpoints.points.len()
        );
    }
}

fn show_checkpoint_markers(
    checkpoints: Res<Checkpoints>,
    mut markers: Query<(&CheckpointMarker, &mut Visibility)>,
) {
    if !checkpoints.is_changed() {
        return;
    }
    for (marker, mut visibility) in &mut markers {
        let passed = checkpoints
            .points
            .get(marker.index)
            .is_some_and(|c| c.passed);
        *visibility = if passed {
            Visibility::Hidden
        } else {
            Visibility::Inherited
        };
    }
}

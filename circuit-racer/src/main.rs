use std::path::PathBuf;

use avian3d::prelude::*;
use bevy::{diagnostic::FrameTimeDiagnosticsPlugin, prelude::*};

use circuit_racer::assets::AssetTrackingPlugin;
use circuit_racer::camera::CameraFollowPlugin;
use circuit_racer::circuit::CircuitPlugin;
use circuit_racer::config::{ConfigPaths, load_configuration};
use circuit_racer::controls::ControlsPlugin;
use circuit_racer::debug::{DebugOverlayPlugin, DebugPhysics};
use circuit_racer::race::RacePlugin;
use circuit_racer::vehicle::VehiclePlugin;

mod ui;

/// Drive a car around a walled circuit, through every checkpoint, to the
/// finish line.
#[derive(Debug, Default)]
#[cfg_attr(not(target_arch = "wasm32"), derive(clap::Parser))]
#[cfg_attr(not(target_arch = "wasm32"), command(author, version, about))]
struct Cli {
    /// Circuit description (TOML). Defaults to the built-in circuit.
    #[cfg_attr(not(target_arch = "wasm32"), arg(long))]
    circuit: Option<PathBuf>,
    /// Car tuning (TOML). Defaults to the built-in car.
    #[cfg_attr(not(target_arch = "wasm32"), arg(long))]
    car: Option<PathBuf>,
    /// Draw collider wireframes from the start.
    #[cfg_attr(not(target_arch = "wasm32"), arg(long))]
    debug_physics: bool,
}

impl Cli {
    #[cfg(not(target_arch = "wasm32"))]
    fn from_env() -> Self {
        <Self as clap::Parser>::parse()
    }

    // No command line in the browser.
    #[cfg(target_arch = "wasm32")]
    fn from_env() -> Self {
        Self::default()
    }
}

fn main() {
    let cli = Cli::from_env();

    App::new()
        .add_plugins((
            DefaultPlugins.set(WindowPlugin {
                primary_window: Some(Window {
                    title: "Circuit Racer".to_string(),
                    fit_canvas_to_parent: true,
                    ..default()
                }),
                ..default()
            }),
            FrameTimeDiagnosticsPlugin::default(),
            PhysicsPlugins::default(),
            PhysicsDebugPlugin::default(),
        ))
        .add_plugins((
            AssetTrackingPlugin,
            RacePlugin,
            CircuitPlugin,
            VehiclePlugin,
            ControlsPlugin,
            CameraFollowPlugin,
            DebugOverlayPlugin,
            ui::RaceUiPlugin,
        ))
        .insert_resource(ClearColor(Color::srgb_u8(0x20, 0x20, 0x20)))
        .insert_resource(Gravity(Vec3::new(0.0, -9.81, 0.0)))
        .insert_resource(Time::<Fixed>::from_hz(60.0))
        .insert_resource(ConfigPaths {
            car: cli.car,
            circuit: cli.circuit,
        })
        .insert_resource(DebugPhysics(cli.debug_physics))
        .add_systems(PreStartup, load_configuration)
        .run();
}

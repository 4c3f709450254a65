use avian3d::prelude::*;
use bevy::prelude::*;

pub struct DebugOverlayPlugin;

impl Plugin for DebugOverlayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<DebugPhysics>()
            .add_systems(Startup, apply_debug_physics)
            .add_systems(
                Update,
                (
                    toggle_debug_physics,
                    apply_debug_physics.run_if(resource_changed::<DebugPhysics>),
                )
                    .chain(),
            );
    }
}

/// Whether collider wireframes are drawn.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugPhysics(pub bool);

impl DebugPhysics {
    pub fn toggle(&mut self) {
        self.0 = !self.0;
    }
}

fn toggle_debug_physics(keyboard: Res<ButtonInput<KeyCode>>, mut debug: ResMut<DebugPhysics>) {
    if keyboard.just_pressed(KeyCode::F1) {
        debug.toggle();
        let state = if debug.0 { "on" } else { "off" };
        info!("Physics debug overlay {}", state);
    }
}

fn apply_debug_physics(debug: Res<DebugPhysics>, mut gizmo_config: ResMut<GizmoConfigStore>) {
    gizmo_config.config_mut::<PhysicsGizmos>().0.enabled = debug.0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_flips_and_returns() {
        let mut debug = DebugPhysics::default();
        assert!(!debug.0);
        debug.toggle();
        assert!(debug.0);
        debug.toggle();
        assert_eq!(debug, DebugPhysics(false));
    }
}

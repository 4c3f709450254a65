use bevy::asset::{LoadState, UntypedHandle};
use bevy::prelude::*;

pub struct AssetTrackingPlugin;

impl Plugin for AssetTrackingPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PendingAssets>()
            .add_message::<AssetLoadFailed>()
            .add_systems(Update, poll_asset_loads);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    CarModel,
    CircuitModel,
}

impl AssetKind {
    pub fn label(self) -> &'static str {
        match self {
            AssetKind::CarModel => "car model",
            AssetKind::CircuitModel => "circuit model",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetStatus {
    Loading,
    Loaded,
    Failed,
}

impl AssetStatus {
    pub fn from_load_state(state: Option<&LoadState>) -> Self {
        match state {
            Some(LoadState::Loaded) => AssetStatus::Loaded,
            Some(LoadState::Failed(_)) => AssetStatus::Failed,
            _ => AssetStatus::Loading,
        }
    }

    pub fn is_settled(self) -> bool {
        self != AssetStatus::Loading
    }
}

/// Sent once per asset whose load failed.
#[derive(Message, Debug, Clone, Copy)]
pub struct AssetLoadFailed {
    pub kind: AssetKind,
}

pub struct PendingAsset {
    pub kind: AssetKind,
    pub path: String,
    pub handle: UntypedHandle,
    pub status: AssetStatus,
}

/// Handles whose load outcome the game reacts to.
#[derive(Resource, Default)]
pub struct PendingAssets {
    pub entries: Vec<PendingAsset>,
}

impl PendingAssets {
    pub fn track(&mut self, kind: AssetKind, path: impl Into<String>, handle: UntypedHandle) {
        self.entries.push(PendingAsset {
            kind,
            path: path.into(),
            handle,
            status: AssetStatus::Loading,
        });
    }

    pub fn all_settled(&self) -> bool {
        self.entries.iter().all(|entry| entry.status.is_settled())
    }

    pub fn settled_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status.is_settled())
            .count()
    }
}

pub fn poll_asset_loads(
    asset_server: Res<AssetServer>,
    mut pending: ResMut<PendingAssets>,
    mut failed: MessageWriter<AssetLoadFailed>,
) {
    if pending.all_settled() {
        return;
    }

    for entry in pending.entries.iter_mut() {
        if entry.status.is_settled() {
            continue;
        }
        let state = asset_server.get_load_state(entry.handle.id());
        match AssetStatus::from_load_state(state.as_ref()) {
            AssetStatus::Loading => {}
            AssetStatus::Loaded => {
                info!("Loaded {} from {}", entry.kind.label(), entry.path);
                entry.status = AssetStatus::Loaded;
            }
            AssetStatus::Failed => {
                if let Some(LoadState::Failed(error)) = &state {
                    warn!("Failed to load {} ({}): {error}", entry.kind.label(), entry.path);
                }
                entry.status = AssetStatus::Failed;
                failed.write(AssetLoadFailed { kind: entry.kind });
            }
        }
    }
}

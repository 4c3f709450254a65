use bevy::{
    diagnostic::{DiagnosticsStore, FrameTimeDiagnosticsPlugin},
    prelude::*,
};

use circuit_racer::assets::PendingAssets;
use circuit_racer::race::{Checkpoints, GameState, RaceClock, RaceFinished};
use circuit_racer::vehicle::Vehicle;

/// How long "GO!" stays up after the countdown.
const GO_SECONDS: f32 = 1.0;

pub struct RaceUiPlugin;

impl Plugin for RaceUiPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, setup_ui)
            .add_systems(
                Update,
                (
                    handle_start_button.run_if(in_state(GameState::StartScreen)),
                    handle_restart_button.run_if(in_state(GameState::Finished)),
                    update_overlay_visibility.run_if(state_changed::<GameState>),
                    update_loading_status.run_if(in_state(GameState::StartScreen)),
                ),
            )
            .add_systems(
                Update,
                (
                    update_countdown_text,
                    update_timer_text,
                    update_checkpoint_text,
                    update_speed_text,
                    update_final_time,
                    update_fps_counter,
                ),
            );
    }
}

#[derive(Component)]
struct StartScreenRoot;
#[derive(Component)]
struct LoadingStatusText;
#[derive(Component)]
struct StartButton;
#[derive(Component)]
struct StartButtonText;
#[derive(Component)]
struct HudRoot;
#[derive(Component)]
struct CountdownText;
#[derive(Component)]
struct TimerText;
#[derive(Component)]
struct CheckpointText;
#[derive(Component)]
struct SpeedText;
#[derive(Component)]
struct FinishRoot;
#[derive(Component)]
struct FinalTimeText;
#[derive(Component)]
struct RestartButton;
#[derive(Component)]
struct FpsCounterText;

const PANEL_BG: Color = Color::srgba(0.08, 0.08, 0.12, 0.92);
const HUD_BG: Color = Color::srgba(0.0, 0.0, 0.0, 0.55);
const BTN_BG: Color = Color::srgb(0.25, 0.25, 0.35);
const START_BG: Color = Color::srgb(0.15, 0.55, 0.2);
const TEXT_COLOR: Color = Color::srgb(0.9, 0.9, 0.9);
const LABEL_COLOR: Color = Color::srgb(0.7, 0.7, 0.7);
const GO_COLOR: Color = Color::srgb(0.3, 0.9, 0.3);

fn px(val: f32) -> Val {
    Val::Px(val)
}

fn text_font(size: f32) -> TextFont {
    TextFont {
        font_size: size,
        ..default()
    }
}

fn button_style() -> Node {
    Node {
        padding: UiRect::axes(px(24.0), px(8.0)),
        margin: UiRect::all(px(2.0)),
        justify_content: JustifyContent::Center,
        align_items: AlignItems::Center,
        ..default()
    }
}

fn display(visible: bool) -> Display {
    if visible { Display::Flex } else { Display::None }
}

/// Full-window overlay that centers its children.
fn centered_overlay(visible: bool) -> Node {
    Node {
        position_type: PositionType::Absolute,
        left: px(0.0),
        right: px(0.0),
        top: px(0.0),
        bottom: px(0.0),
        flex_direction: FlexDirection::Column,
        justify_content: JustifyContent::Center,
        align_items: AlignItems::Center,
        row_gap: px(12.0),
        display: display(visible),
        ..default()
    }
}

/// `m:ss.cc`, rounded to hundredths.
pub fn format_race_time(seconds: f32) -> String {
    let centis = (seconds.max(0.0) * 100.0).round() as u32;
    let minutes = centis / 6000;
    let secs = (centis / 100) % 60;
    let hundredths = centis % 100;
    format!("{minutes}:{secs:02}.{hundredths:02}")
}

/// Big center text: whole seconds left during the countdown, then "GO!"
/// for a moment once the race is on.
pub fn countdown_label(state: GameState, clock: &RaceClock) -> Option<String> {
    match state {
        GameState::Countdown if clock.countdown_remaining > 0.0 => {
            Some(format!("{}", clock.countdown_remaining.ceil() as u32))
        }
        GameState::Countdown => Some("GO!".to_string()),
        GameState::Racing if clock.elapsed < GO_SECONDS => Some("GO!".to_string()),
        _ => None,
    }
}

pub fn speed_kmh(forward_speed: f32) -> f32 {
    forward_speed.abs() * 3.6
}

fn setup_ui(mut commands: Commands) {
    // Start screen
    commands
        .spawn((
            StartScreenRoot,
            centered_overlay(true),
            BackgroundColor(PANEL_BG),
        ))
        .with_children(|screen| {
            screen.spawn((
                Text::new("Circuit Racer"),
                text_font(48.0),
                TextColor(TEXT_COLOR),
            ));
            screen.spawn((
                Text::new("Loading..."),
                LoadingStatusText,
                text_font(16.0),
                TextColor(LABEL_COLOR),
            ));
            screen
                .spawn((
                    Button,
                    StartButton,
                    button_style(),
                    BackgroundColor(BTN_BG),
                ))
                .with_children(|btn| {
                    btn.spawn((
                        Text::new("Loading"),
                        StartButtonText,
                        text_font(22.0),
                        TextColor(TEXT_COLOR),
                    ));
                });
            screen.spawn((
                Text::new("WASD / arrows to drive, Space handbrake, R reset, F1 physics debug"),
                text_font(14.0),
                TextColor(LABEL_COLOR),
            ));
        });

    // HUD
    commands
        .spawn((
            HudRoot,
            Node {
                position_type: PositionType::Absolute,
                left: px(0.0),
                right: px(0.0),
                top: px(0.0),
                bottom: px(0.0),
                display: Display::None,
                ..default()
            },
        ))
        .with_children(|hud| {
            hud.spawn((
                Node {
                    position_type: PositionType::Absolute,
                    top: px(8.0),
                    right: px(8.0),
                    flex_direction: FlexDirection::Column,
                    align_items: AlignItems::FlexEnd,
                    padding: UiRect::axes(px(10.0), px(6.0)),
                    row_gap: px(4.0),
                    ..default()
                },
                BackgroundColor(HUD_BG),
            ))
            .with_children(|panel| {
                panel.spawn((
                    Text::new(format_race_time(0.0)),
                    TimerText,
                    text_font(28.0),
                    TextColor(TEXT_COLOR),
                ));
                panel.spawn((
                    Text::new("Checkpoints 0/0"),
                    CheckpointText,
                    text_font(18.0),
                    TextColor(LABEL_COLOR),
                ));
            });

            hud.spawn((
                Text::new("0 km/h"),
                SpeedText,
                text_font(26.0),
                TextColor(TEXT_COLOR),
                Node {
                    position_type: PositionType::Absolute,
                    bottom: px(16.0),
                    right: px(16.0),
                    ..default()
                },
            ));

            hud.spawn(centered_overlay(true)).with_children(|center| {
                center.spawn((
                    Text::new(""),
                    CountdownText,
                    text_font(96.0),
                    TextColor(TEXT_COLOR),
                ));
            });
        });

    // Finish overlay
    commands
        .spawn((
            FinishRoot,
            centered_overlay(false),
            BackgroundColor(Color::srgba(0.0, 0.0, 0.0, 0.6)),
        ))
        .with_children(|overlay| {
            overlay.spawn((Text::new("Finished!"), text_font(48.0), TextColor(TEXT_COLOR)));
            overlay.spawn((
                Text::new(""),
                FinalTimeText,
                text_font(32.0),
                TextColor(TEXT_COLOR),
            ));
            overlay
                .spawn((
                    Button,
                    RestartButton,
                    button_style(),
                    BackgroundColor(START_BG),
                ))
                .with_children(|btn| {
                    btn.spawn((Text::new("Restart"), text_font(22.0), TextColor(TEXT_COLOR)));
                });
            overlay.spawn((
                Text::new("or press Enter"),
                text_font(14.0),
                TextColor(LABEL_COLOR),
            ));
        });

    // FPS counter
    commands.spawn((
        Node {
            position_type: PositionType::Absolute,
            top: px(8.0),
            left: px(8.0),
            padding: UiRect::axes(px(8.0), px(4.0)),
            ..default()
        },
        BackgroundColor(HUD_BG),
        Text::new("FPS: --"),
        text_font(18.0),
        TextColor(TEXT_COLOR),
        FpsCounterText,
    ));
}

// ── Flow buttons ───────────────────────────────────────────────────────

fn handle_start_button(
    query: Query<&Interaction, (Changed<Interaction>, With<StartButton>)>,
    keyboard: Res<ButtonInput<KeyCode>>,
    pending: Res<PendingAssets>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    let clicked = query.iter().any(|i| *i == Interaction::Pressed);
    if !(clicked || keyboard.just_pressed(KeyCode::Enter)) {
        return;
    }
    if !pending.all_settled() {
        info!("Start ignored, assets still loading");
        return;
    }
    next_state.set(GameState::Countdown);
}

fn handle_restart_button(
    query: Query<&Interaction, (Changed<Interaction>, With<RestartButton>)>,
    keyboard: Res<ButtonInput<KeyCode>>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    let clicked = query.iter().any(|i| *i == Interaction::Pressed);
    if clicked || keyboard.just_pressed(KeyCode::Enter) {
        info!("Restarting race");
        next_state.set(GameState::Countdown);
    }
}

fn update_overlay_visibility(
    state: Res<State<GameState>>,
    mut start: Query<&mut Node, (With<StartScreenRoot>, Without<HudRoot>, Without<FinishRoot>)>,
    mut hud: Query<&mut Node, (With<HudRoot>, Without<StartScreenRoot>, Without<FinishRoot>)>,
    mut finish: Query<&mut Node, (With<FinishRoot>, Without<StartScreenRoot>, Without<HudRoot>)>,
) {
    let state = *state.get();
    for mut node in &mut start {
        node.display = display(state == GameState::StartScreen);
    }
    for mut node in &mut hud {
        node.display = display(state != GameState::StartScreen);
    }
    for mut node in &mut finish {
        node.display = display(state == GameState::Finished);
    }
}

fn update_loading_status(
    pending: Res<PendingAssets>,
    mut status: Query<&mut Text, (With<LoadingStatusText>, Without<StartButtonText>)>,
    mut button: Query<(&mut Text, &ChildOf), With<StartButtonText>>,
    mut backgrounds: Query<&mut BackgroundColor, With<StartButton>>,
) {
    if !pending.is_changed() {
        return;
    }
    let ready = pending.all_settled();

    if let Ok(mut text) = status.single_mut() {
        text.0 = if ready {
            "Ready".to_string()
        } else {
            format!(
                "Loading assets ({}/{})",
                pending.settled_count(),
                pending.entries.len()
            )
        };
    }
    if let Ok((mut text, parent)) = button.single_mut() {
        text.0 = if ready { "Start" } else { "Loading" }.to_string();
        if let Ok(mut bg) = backgrounds.get_mut(parent.parent()) {
            bg.0 = if ready { START_BG } else { BTN_BG };
        }
    }
}

// ── HUD ────────────────────────────────────────────────────────────────

fn update_countdown_text(
    state: Res<State<GameState>>,
    clock: Res<RaceClock>,
    mut query: Query<(&mut Text, &mut TextColor), With<CountdownText>>,
) {
    let Ok((mut text, mut color)) = query.single_mut() else {
        return;
    };
    let label = countdown_label(*state.get(), &clock).unwrap_or_default();
    color.0 = if label == "GO!" { GO_COLOR } else { TEXT_COLOR };
    if text.0 != label {
        text.0 = label;
    }
}

fn update_timer_text(clock: Res<RaceClock>, mut query: Query<&mut Text, With<TimerText>>) {
    if !clock.is_changed() {
        return;
    }
    if let Ok(mut text) = query.single_mut() {
        text.0 = format_race_time(clock.display_time());
    }
}

fn update_checkpoint_text(
    checkpoints: Res<Checkpoints>,
    mut query: Query<&mut Text, With<CheckpointText>>,
) {
    if !checkpoints.is_changed() {
        return;
    }
    if let Ok(mut text) = query.single_mut() {
        text.0 = format!(
            "Checkpoints {}/{}",
            checkpoints.passed_count(),
            checkpoints.points.len()
        );
    }
}

fn update_speed_text(cars: Query<&Vehicle>, mut query: Query<&mut Text, With<SpeedText>>) {
    let (Ok(vehicle), Ok(mut text)) = (cars.single(), query.single_mut()) else {
        return;
    };
    text.0 = format!("{:.0} km/h", speed_kmh(vehicle.forward_speed));
}

fn update_final_time(
    mut finished: MessageReader<RaceFinished>,
    mut query: Query<&mut Text, With<FinalTimeText>>,
) {
    let Some(last) = finished.read().last() else {
        return;
    };
    if let Ok(mut text) = query.single_mut() {
        text.0 = format!("Time {}", format_race_time(last.time));
    }
}

fn update_fps_counter(
    diagnostics: Res<DiagnosticsStore>,
    mut query: Query<&mut Text, With<FpsCounterText>>,
) {
    let Ok(mut text) = query.single_mut() else {
        return;
    };

    if let Some(fps) = diagnostics
        .get(&FrameTimeDiagnosticsPlugin::FPS)
        .and_then(|value| value.smoothed())
    {
        text.0 = format!("FPS: {fps:>3.0}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn race_time_formats_minutes_seconds_hundredths() {
        assert_eq!(format_race_time(0.0), "0:00.00");
        assert_eq!(format_race_time(5.5), "0:05.50");
        assert_eq!(format_race_time(65.43), "1:05.43");
        assert_eq!(format_race_time(600.0), "10:00.00");
    }

    #[test]
    fn race_time_clamps_negative() {
        assert_eq!(format_race_time(-1.0), "0:00.00");
    }

    #[test]
    fn countdown_shows_whole_seconds_then_go() {
        let mut clock = RaceClock::default();
        assert_eq!(countdown_label(GameState::Countdown, &clock).as_deref(), Some("3"));

        clock.countdown_remaining = 2.4;
        assert_eq!(countdown_label(GameState::Countdown, &clock).as_deref(), Some("3"));

        clock.countdown_remaining = 1.0;
        assert_eq!(countdown_label(GameState::Countdown, &clock).as_deref(), Some("1"));

        clock.countdown_remaining = 0.0;
        clock.elapsed = 0.4;
        assert_eq!(countdown_label(GameState::Racing, &clock).as_deref(), Some("GO!"));

        clock.elapsed = 1.2;
        assert_eq!(countdown_label(GameState::Racing, &clock), None);
    }

    #[test]
    fn countdown_hidden_outside_the_start() {
        let clock = RaceClock::default();
        assert_eq!(countdown_label(GameState::StartScreen, &clock), None);
        assert_eq!(countdown_label(GameState::Finished, &clock), None);
    }

    #[test]
    fn speed_is_unsigned_kmh() {
        assert!((speed_kmh(10.0) - 36.0).abs() < 1e-4);
        assert!((speed_kmh(-10.0) - 36.0).abs() < 1e-4);
    }
}

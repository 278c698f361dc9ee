pub mod state;
pub mod thread;

use crossterm::event::{Event, KeyCode, KeyEventKind};
use std::sync::mpsc::{Receiver, TryRecvError};
use surfsplat::camera;
use surfsplat::SplatFunction;

use super::{AppResult, AppState, CameraMode, MAX_MAGNIFICATION, MAX_SUPERSAMPLE};
use thread::InputMessage;

const CUTOFF_STEP: f32 = 0.1;
const MIN_CUTOFF: f32 = 0.3;
const MAX_CUTOFF: f32 = 3.0;

pub fn drain_input_events(
    app_state: &mut AppState,
    input_rx: &Receiver<InputMessage>,
) -> AppResult<bool> {
    loop {
        match input_rx.try_recv() {
            Ok(InputMessage::Event(event)) => {
                handle_input_event(app_state, event)?;
                if app_state.input_state.quit_requested {
                    return Ok(true);
                }
            }
            Ok(InputMessage::ReadError(err)) => {
                return Err(format!("Input thread read failed: {err}").into());
            }
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => {
                return Err("Input channel disconnected".into());
            }
        }
    }

    Ok(app_state.input_state.quit_requested)
}

/// Orbit around a point ahead of the camera, keeping the current distance
/// and height.
fn transition_to_orbit(app_state: &mut AppState) {
    let ahead = (app_state.camera.position - app_state.scene_center).length().max(0.5);
    let target = app_state.camera.position + app_state.camera.forward * ahead;
    app_state.orbit_target = target;

    let dx = app_state.camera.position.x - target.x;
    let dz = app_state.camera.position.z - target.z;
    app_state.orbit_radius = (dx * dx + dz * dz).sqrt().max(0.5);
    app_state.orbit_angle = dz.atan2(dx);
    app_state.orbit_height = app_state.camera.position.y - target.y;

    app_state.input_state.held = state::HeldMovementKeys::default();
    app_state.camera_mode = CameraMode::Orbit;
}

fn transition_to_free(app_state: &mut AppState) {
    camera::look_at_target(&mut app_state.camera, app_state.orbit_target);
    app_state.camera_mode = CameraMode::Free;
}

fn adjust_cutoff(app_state: &mut AppState, delta: f32) -> AppResult<()> {
    let cutoff =
        (app_state.renderer.settings().cutoff_radius + delta).clamp(MIN_CUTOFF, MAX_CUTOFF);
    app_state.renderer.set_cutoff_radius(cutoff)?;
    Ok(())
}

/// Applies one settings change through the renderer so the filter table
/// stays in sync.
fn update_settings(
    app_state: &mut AppState,
    change: impl FnOnce(&mut surfsplat::RenderSettings),
) -> AppResult<()> {
    let mut settings = app_state.renderer.settings().clone();
    change(&mut settings);
    app_state.renderer.set_settings(settings)?;
    Ok(())
}

pub fn handle_input_event(app_state: &mut AppState, event: Event) -> AppResult<()> {
    match event {
        Event::Key(key_event) => {
            let pressed = key_event.kind != KeyEventKind::Release;
            let held = &mut app_state.input_state.held;
            match key_event.code {
                KeyCode::PageUp => held.rise = pressed,
                KeyCode::PageDown => held.sink = pressed,
                KeyCode::Char(c) => match c.to_ascii_lowercase() {
                    'w' => held.forward = pressed,
                    's' => held.back = pressed,
                    'a' => held.left = pressed,
                    'd' => held.right = pressed,
                    _ => {}
                },
                _ => {}
            }

            if !matches!(key_event.kind, KeyEventKind::Press | KeyEventKind::Repeat) {
                return Ok(());
            }

            match key_event.code {
                KeyCode::Esc => app_state.input_state.quit_requested = true,
                KeyCode::Tab => app_state.show_hud = !app_state.show_hud,
                KeyCode::Char('+') | KeyCode::Char('=') => {
                    app_state.move_speed = (app_state.move_speed * 1.2).min(50.0);
                }
                KeyCode::Char('-') | KeyCode::Char('_') => {
                    app_state.move_speed = (app_state.move_speed / 1.2).max(0.01);
                }
                KeyCode::Char(']') => adjust_cutoff(app_state, CUTOFF_STEP)?,
                KeyCode::Char('[') => adjust_cutoff(app_state, -CUTOFF_STEP)?,
                KeyCode::Char(' ') => match app_state.camera_mode {
                    CameraMode::Free => transition_to_orbit(app_state),
                    CameraMode::Orbit => transition_to_free(app_state),
                },

                KeyCode::Up => match app_state.camera_mode {
                    CameraMode::Free => camera::adjust_pitch(&mut app_state.camera, 0.05),
                    CameraMode::Orbit => app_state.orbit_height += 0.1 * app_state.move_speed,
                },
                KeyCode::Down => match app_state.camera_mode {
                    CameraMode::Free => camera::adjust_pitch(&mut app_state.camera, -0.05),
                    CameraMode::Orbit => app_state.orbit_height -= 0.1 * app_state.move_speed,
                },
                KeyCode::Left => match app_state.camera_mode {
                    CameraMode::Free => camera::adjust_yaw(&mut app_state.camera, -0.05),
                    CameraMode::Orbit => app_state.orbit_angle -= 0.1,
                },
                KeyCode::Right => match app_state.camera_mode {
                    CameraMode::Free => camera::adjust_yaw(&mut app_state.camera, 0.05),
                    CameraMode::Orbit => app_state.orbit_angle += 0.1,
                },

                KeyCode::Char(c) => match c.to_ascii_lowercase() {
                    'q' => app_state.input_state.quit_requested = true,
                    'n' => {
                        update_settings(app_state, |s| s.two_sided_normals = !s.two_sided_normals)?
                    }
                    'l' => update_settings(app_state, |s| s.shading = s.shading.next())?,
                    'h' => update_settings(app_state, |s| s.specular = s.specular.toggle())?,
                    'v' => update_settings(app_state, |s| s.show_selection = !s.show_selection)?,
                    'f' => update_settings(app_state, |s| {
                        s.debug_flipped_normals = !s.debug_flipped_normals
                    })?,
                    'e' => {
                        let next = match app_state.renderer.splat_function() {
                            SplatFunction::Elliptical => SplatFunction::Additive,
                            _ => SplatFunction::Elliptical,
                        };
                        app_state.renderer.set_splat_function(next);
                    }
                    'g' => {
                        app_state.magnification = if app_state.magnification >= MAX_MAGNIFICATION {
                            1
                        } else {
                            app_state.magnification * 2
                        };
                    }
                    'r' => {
                        camera::reset(
                            &mut app_state.camera,
                            app_state.scene_center,
                            app_state.scene_radius * 2.5,
                        );
                        app_state.camera_mode = CameraMode::Free;
                        app_state.orbit_target = app_state.scene_center;
                        app_state.orbit_angle = 0.0;
                        app_state.orbit_radius = app_state.scene_radius * 2.5;
                        app_state.orbit_height = 0.0;
                    }
                    d @ '1'..='9' => {
                        let factor = d as u32 - '0' as u32;
                        if factor <= MAX_SUPERSAMPLE {
                            app_state.supersample_factor = factor;
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
        }
        Event::FocusLost => {
            app_state.input_state.held = state::HeldMovementKeys::default();
        }
        Event::Resize(_, _) => {}
        _ => {}
    }

    Ok(())
}

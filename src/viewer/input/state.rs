use surfsplat::camera;
use surfsplat::Vec3;

use crate::viewer::{AppState, CameraMode};

/// Closest the orbit camera may dolly toward its target.
const MIN_ORBIT_RADIUS: f32 = 0.1;
/// Farthest orbit distance, in scene radii.
const MAX_ORBIT_RADII: f32 = 20.0;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeldMovementKeys {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub rise: bool,
    pub sink: bool,
}

impl HeldMovementKeys {
    fn axes(self) -> (f32, f32, f32) {
        let axis = |pos: bool, neg: bool| (pos as i8 - neg as i8) as f32;
        (
            axis(self.forward, self.back),
            axis(self.right, self.left),
            axis(self.rise, self.sink),
        )
    }
}

#[derive(Debug, Default)]
pub struct InputState {
    pub held: HeldMovementKeys,
    pub quit_requested: bool,
}

/// Free mode flies the camera; orbit mode dollies toward the target, walks
/// around it and raises or lowers the orbit.
pub fn apply_movement_from_held_keys(app_state: &mut AppState, delta_time: f32) {
    let step = app_state.move_speed * delta_time.max(0.0);
    if step <= 0.0 {
        return;
    }

    let (forward, right, up) = app_state.input_state.held.axes();
    match app_state.camera_mode {
        CameraMode::Free => {
            if forward != 0.0 {
                camera::move_forward(&mut app_state.camera, forward * step);
            }
            if right != 0.0 {
                camera::move_right(&mut app_state.camera, right * step);
            }
            if up != 0.0 {
                app_state.camera.position += Vec3::Y * (up * step);
            }
        }
        CameraMode::Orbit => {
            let max_radius = (app_state.scene_radius * MAX_ORBIT_RADII).max(MIN_ORBIT_RADIUS);
            app_state.orbit_radius =
                (app_state.orbit_radius - forward * step).clamp(MIN_ORBIT_RADIUS, max_radius);
            // Same linear speed along the circle as in free flight.
            app_state.orbit_angle += right * step / app_state.orbit_radius;
            app_state.orbit_height += up * step;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::test_support::make_state;

    #[test]
    fn movement_scales_with_delta_time() {
        let mut app = make_state();
        app.input_state.held.forward = true;
        let z0 = app.camera.position.z;
        apply_movement_from_held_keys(&mut app, 0.016);
        let d1 = (app.camera.position.z - z0).abs();

        let mut app2 = make_state();
        app2.input_state.held.forward = true;
        let z1 = app2.camera.position.z;
        apply_movement_from_held_keys(&mut app2, 0.032);
        let d2 = (app2.camera.position.z - z1).abs();

        assert!((d2 - d1 * 2.0).abs() < 1e-4);
    }

    #[test]
    fn opposing_keys_cancel() {
        let mut app = make_state();
        app.input_state.held.left = true;
        app.input_state.held.right = true;
        app.input_state.held.rise = true;
        app.input_state.held.sink = true;
        let before = app.camera.position;
        apply_movement_from_held_keys(&mut app, 0.5);
        assert_eq!(app.camera.position, before);
    }

    #[test]
    fn rise_moves_along_world_up() {
        let mut app = make_state();
        app.input_state.held.rise = true;
        let before = app.camera.position;
        apply_movement_from_held_keys(&mut app, 0.5);
        assert!((app.camera.position.y - before.y - 1.0).abs() < 1e-5);
        assert_eq!(app.camera.position.x, before.x);
    }

    #[test]
    fn orbit_keys_dolly_and_circle_the_target() {
        let mut app = make_state();
        app.camera_mode = CameraMode::Orbit;
        app.orbit_radius = 3.0;
        app.input_state.held.forward = true;
        app.input_state.held.right = true;
        apply_movement_from_held_keys(&mut app, 0.25);
        assert!((app.orbit_radius - 2.5).abs() < 1e-5);
        assert!((app.orbit_angle - 0.5 / 2.5).abs() < 1e-5);

        for _ in 0..100 {
            apply_movement_from_held_keys(&mut app, 0.25);
        }
        assert!((app.orbit_radius - MIN_ORBIT_RADIUS).abs() < 1e-6);
    }
}

use crossterm::{
    cursor, queue,
    style::{ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal, Command,
};
use std::io::{self, Write};
use std::sync::mpsc::Receiver;
use std::time::Instant;

use surfsplat::{camera, Viewport};

use super::input::thread::InputMessage;
use super::input::{drain_input_events, state::apply_movement_from_held_keys};
use super::{
    is_hud_overlay_row, make_color, world_point_light, AppResult, AppState, CameraMode,
    FRAME_TARGET, HALF_BLOCK,
};

const ORBIT_SPEED: f32 = 0.45;

fn update_orbit(app_state: &mut AppState, delta_time: f32) {
    app_state.orbit_angle += ORBIT_SPEED * delta_time;
    let target = app_state.orbit_target;
    app_state.camera.position.x = target.x + app_state.orbit_radius * app_state.orbit_angle.cos();
    app_state.camera.position.z = target.z + app_state.orbit_radius * app_state.orbit_angle.sin();
    app_state.camera.position.y = target.y + app_state.orbit_height;
    camera::look_at_target(&mut app_state.camera, target);
}

/// Sizes the renderer to the supersampled terminal and loads the current
/// camera.
fn prepare_renderer(app_state: &mut AppState, width: usize, height: usize) -> AppResult<()> {
    let viewport = Viewport::new(width, height)?;
    let renderer = &mut app_state.renderer;
    if renderer.viewport() != viewport {
        tracing::info!("resizing render target to {}x{}", width, height);
        renderer.set_viewport(viewport)?;
    }
    renderer.set_frustum(app_state.camera.frustum(viewport.aspect())?);
    renderer.set_magnification(app_state.magnification)?;
    let view = app_state.camera.transformation();
    if let Some(position) = app_state.world_light {
        renderer.set_lights(vec![world_point_light(position, &view)]);
    }
    renderer.set_transformation(view);
    Ok(())
}

fn write_ansi_command(buf: &mut String, command: impl Command) -> io::Result<()> {
    command
        .write_ansi(buf)
        .map_err(|_| io::Error::other("failed to encode ANSI command"))
}

pub fn render_frame(
    app_state: &mut AppState,
    terminal_size: (u16, u16),
    stdout: &mut impl Write,
) -> AppResult<()> {
    let term_cols = terminal_size.0.max(1) as usize;
    let term_rows = terminal_size.1.max(1) as usize;
    let ss = app_state.supersample_factor.max(1) as usize;

    prepare_renderer(app_state, term_cols * ss, term_rows * 2 * ss)?;
    app_state.renderer.begin_frame();
    app_state.last_stats = app_state.renderer.warp(None, &app_state.surfels)?;
    let image = app_state.renderer.shade_frame()?;
    image.downsample_halfblock_into(term_cols, term_rows, ss, &mut app_state.halfblock_cells);

    let tc = app_state.use_truecolor;
    let cells = &app_state.halfblock_cells;
    let mut last_bg: Option<[u8; 3]> = None;
    let mut last_fg: Option<[u8; 3]> = None;
    let mut row_buf = String::with_capacity(term_cols * 8 + 32);

    for term_row in 0..term_rows {
        if is_hud_overlay_row(app_state.show_hud, term_row, term_rows) {
            last_bg = None;
            last_fg = None;
            continue;
        }

        row_buf.clear();
        write_ansi_command(&mut row_buf, cursor::MoveTo(0, term_row as u16))?;
        for x in 0..term_cols {
            let (top, bottom) = cells[term_row * term_cols + x];
            if last_bg != Some(top) {
                write_ansi_command(
                    &mut row_buf,
                    SetBackgroundColor(make_color(top[0], top[1], top[2], tc)),
                )?;
                last_bg = Some(top);
            }
            if last_fg != Some(bottom) {
                write_ansi_command(
                    &mut row_buf,
                    SetForegroundColor(make_color(bottom[0], bottom[1], bottom[2], tc)),
                )?;
                last_fg = Some(bottom);
            }
            row_buf.push(HALF_BLOCK);
        }
        stdout.write_all(row_buf.as_bytes())?;
    }

    if app_state.show_hud {
        let (cols, rows) = (terminal_size.0.max(1), terminal_size.1.max(1));
        super::hud::draw_hud(app_state, cols, rows, ss, stdout)?;
    }

    queue!(stdout, ResetColor)?;
    stdout.flush()?;
    Ok(())
}

pub fn run_app_loop(
    app_state: &mut AppState,
    input_rx: &Receiver<InputMessage>,
    stdout: &mut io::BufWriter<io::Stdout>,
) -> AppResult<()> {
    loop {
        let frame_start = Instant::now();

        if drain_input_events(app_state, input_rx)? {
            break;
        }

        let now = Instant::now();
        let delta_time = now.duration_since(app_state.last_frame_time).as_secs_f32().max(1e-6);
        app_state.last_frame_time = now;

        apply_movement_from_held_keys(app_state, delta_time);
        if app_state.camera_mode == CameraMode::Orbit {
            update_orbit(app_state, delta_time);
        }

        let terminal_size = terminal::size()?;
        render_frame(app_state, terminal_size, stdout)?;

        app_state.frame_count += 1;
        let instant_fps = 1.0 / delta_time;
        app_state.fps = if app_state.fps <= 0.01 {
            instant_fps
        } else {
            0.90 * app_state.fps + 0.10 * instant_fps
        };

        let spent = frame_start.elapsed();
        if spent < FRAME_TARGET {
            std::thread::sleep(FRAME_TARGET - spent);
        }
    }

    Ok(())
}

use crossterm::{
    cursor, queue,
    style::{Print, SetBackgroundColor, SetForegroundColor},
};
use std::fmt::Write as _;
use std::io::{self, Write};

use super::{make_color, AppState, CameraMode};

fn truncate_and_pad_in_place(text: &mut String, width: usize) {
    if width == 0 {
        text.clear();
        return;
    }

    let mut seen_chars = 0usize;
    let mut truncate_byte = None;
    for (idx, _) in text.char_indices() {
        if seen_chars == width {
            truncate_byte = Some(idx);
            break;
        }
        seen_chars += 1;
    }

    if let Some(idx) = truncate_byte {
        text.truncate(idx);
    } else {
        for _ in seen_chars..width {
            text.push(' ');
        }
    }
}

/// Status line with warp statistics and active render settings.
pub fn format_status(app_state: &AppState, ss: usize, out: &mut String) -> std::fmt::Result {
    let stats = app_state.last_stats;
    let settings = app_state.renderer.settings();
    let viewport = app_state.renderer.viewport();
    out.clear();
    write!(
        out,
        concat!(
            "FPS:{:>5.1}  Surfels:{}/{} (frustum:{} back:{} degen:{} clip:{})  Cam:{}  ",
            "Splat:{}  Shade:{}/{}  Cutoff:{:.1}  2-sided:{}  SS:{}x Mag:{}x [{}x{}]",
        ),
        app_state.fps,
        stats.rasterized,
        app_state.surfels.len(),
        stats.outside_frustum,
        stats.back_facing,
        stats.degenerate,
        stats.clipped,
        app_state.camera_mode.name(),
        app_state.renderer.splat_function().name(),
        settings.shading.name(),
        settings.specular.name(),
        settings.cutoff_radius,
        if settings.two_sided_normals { "on" } else { "off" },
        ss,
        app_state.renderer.magnification(),
        viewport.width,
        viewport.height,
    )
}

pub fn draw_hud(
    app_state: &mut AppState,
    cols: u16,
    rows: u16,
    ss: usize,
    stdout: &mut impl Write,
) -> io::Result<()> {
    let width = cols as usize;
    let mut hud = std::mem::take(&mut app_state.hud_string_buf);
    format_status(app_state, ss, &mut hud).map_err(|_| io::Error::other("failed to format HUD"))?;
    truncate_and_pad_in_place(&mut hud, width);

    let tc = app_state.use_truecolor;
    queue!(
        stdout,
        cursor::MoveTo(0, 0),
        SetBackgroundColor(make_color(0, 0, 0, tc)),
        SetForegroundColor(make_color(245, 245, 245, tc)),
        Print(hud.as_str())
    )?;

    let controls = match app_state.camera_mode {
        CameraMode::Free => {
            concat!(
                "WASD:Move  PgUp/PgDn:Rise/Sink  Arrows:Look  +/-:Speed  Space:Orbit  ",
                "[/]:Cutoff  N:2-sided  L:Shading  H:Specular  E:Splat  G:Mag  1-3:SS  ",
                "Tab:HUD  R:Reset  Q:Quit",
            )
        }
        CameraMode::Orbit => {
            concat!(
                "W/S:Dolly  A/D:Circle  PgUp/PgDn:Height  Space:Free cam  [/]:Cutoff  ",
                "N:2-sided  L:Shading  H:Specular  E:Splat  G:Mag  1-3:SS  ",
                "Tab:HUD  R:Reset  Q:Quit",
            )
        }
    };
    hud.clear();
    hud.push_str(controls);
    truncate_and_pad_in_place(&mut hud, width);

    queue!(
        stdout,
        cursor::MoveTo(0, rows.saturating_sub(1)),
        SetBackgroundColor(make_color(0, 0, 0, tc)),
        SetForegroundColor(make_color(220, 220, 220, tc)),
        Print(hud.as_str())
    )?;

    app_state.hud_string_buf = hud;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::test_support::make_state;

    #[test]
    fn truncates_and_pads_by_characters() {
        let mut text = String::from("héllo");
        truncate_and_pad_in_place(&mut text, 3);
        assert_eq!(text, "hél");

        let mut short = String::from("ab");
        truncate_and_pad_in_place(&mut short, 4);
        assert_eq!(short, "ab  ");
    }

    #[test]
    fn status_reports_settings() {
        let app = make_state();
        let mut out = String::new();
        format_status(&app, 1, &mut out).expect("format");
        assert!(out.contains("Surfels:0/2"));
        assert!(out.contains("Splat:Additive"));
        assert!(out.contains("2-sided:off"));
    }
}

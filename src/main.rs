use clap::{ArgAction, Parser, ValueEnum};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use surfsplat::render::shadow::{apply_covered_flags, ShadowPass};
use surfsplat::{
    demo, parser, Frustum, RenderSettings, ShadingMode, SpecularModel, SplatFunction, Surfel,
    SurfelRenderer, Transformation, Vec3, Viewport,
};

mod viewer;

use viewer::terminal_setup::{
    cleanup_terminal, detect_truecolor, enter_terminal, install_panic_hook,
};
use viewer::{AppResult, AppState};

const SHADOW_RESOLUTION: usize = 512;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum ShadingArg {
    Unlit,
    #[default]
    Surfel,
    Pixel,
}

impl From<ShadingArg> for ShadingMode {
    fn from(arg: ShadingArg) -> Self {
        match arg {
            ShadingArg::Unlit => ShadingMode::Unlit,
            ShadingArg::Surfel => ShadingMode::PerSurfel,
            ShadingArg::Pixel => ShadingMode::PerPixel,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum SpecularArg {
    #[default]
    Reflection,
    Halfway,
}

impl From<SpecularArg> for SpecularModel {
    fn from(arg: SpecularArg) -> Self {
        match arg {
            SpecularArg::Reflection => SpecularModel::Reflection,
            SpecularArg::Halfway => SpecularModel::Halfway,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum SplatArg {
    #[default]
    Additive,
    Elliptical,
}

impl From<SplatArg> for SplatFunction {
    fn from(arg: SplatArg) -> Self {
        match arg {
            SplatArg::Additive => SplatFunction::Additive,
            SplatArg::Elliptical => SplatFunction::Elliptical,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "surfsplat",
    version,
    about = "EWA surface splatting renderer for surfel point clouds"
)]
struct Cli {
    /// Path to a surfel .ply file (runs the demo scene if omitted)
    input: Option<PathBuf>,
    #[arg(long, help = "Run built-in demo scene", conflicts_with = "input")]
    demo: bool,
    #[arg(long, default_value_t = 42, help = "Seed for the demo scene")]
    seed: u64,
    #[arg(
        short,
        long,
        value_name = "PNG",
        help = "Render one frame to a PNG instead of opening the viewer"
    )]
    output: Option<PathBuf>,
    #[arg(long, default_value_t = 800, help = "Headless image width")]
    width: usize,
    #[arg(long, default_value_t = 600, help = "Headless image height")]
    height: usize,
    #[arg(
        long,
        default_value_t = surfsplat::render::DEFAULT_CUTOFF_RADIUS,
        help = "Gaussian cutoff radius"
    )]
    cutoff: f32,
    #[arg(long, help = "Render back-facing surfels with flipped normals")]
    two_sided: bool,
    #[arg(long, value_enum, default_value_t)]
    shading: ShadingArg,
    #[arg(long, value_enum, default_value_t)]
    specular: SpecularArg,
    #[arg(long, value_enum, default_value_t)]
    splat: SplatArg,
    #[arg(long, help = "Darken surfels hidden from a fixed scene light")]
    shadows: bool,
    #[arg(
        long,
        default_value_t = 0,
        allow_negative_numbers = true,
        help = "Level-of-detail exponent"
    )]
    lod: i32,
    #[arg(long, value_name = "RRGGBB", default_value = "101418", value_parser = parse_hex_color)]
    background: u32,
    #[arg(long, value_name = "N", default_value_t = 1, help = "Viewer supersampling factor")]
    supersample: u32,
    #[arg(long, help = "Flip Y axis")]
    flip_y: bool,
    #[arg(long, help = "Flip Z axis")]
    flip_z: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase log verbosity")]
    verbose: u8,
    #[arg(long, value_name = "FILE", help = "Write viewer logs to a file")]
    log_file: Option<PathBuf>,
}

fn parse_hex_color(value: &str) -> Result<u32, String> {
    let digits = value.trim_start_matches('#');
    if digits.len() != 6 {
        return Err(format!("expected six hex digits, got '{value}'"));
    }
    u32::from_str_radix(digits, 16).map_err(|err| format!("invalid color '{value}': {err}"))
}

fn init_logging(cli: &Cli) -> AppResult<()> {
    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    if cli.output.is_some() {
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(io::stderr)
            .try_init()
            .map_err(|err| err.to_string())?;
    } else if let Some(path) = cli.log_file.as_ref() {
        // The alternate screen owns stdout and stderr while the viewer runs.
        let file = File::create(path)?;
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init()
            .map_err(|err| err.to_string())?;
    }
    Ok(())
}

fn settings_from_cli(cli: &Cli) -> AppResult<RenderSettings> {
    let settings = RenderSettings {
        cutoff_radius: cli.cutoff,
        two_sided_normals: cli.two_sided,
        shading: cli.shading.into(),
        specular: cli.specular.into(),
        apply_shadows: cli.shadows,
        background: cli.background,
        lod_level: cli.lod,
        ..RenderSettings::default()
    };
    settings.validate()?;
    Ok(settings)
}

fn load_surfels_from_cli(cli: &Cli) -> AppResult<Vec<Surfel>> {
    let path = match cli.input.as_ref() {
        Some(path) if !cli.demo => path,
        _ => return Ok(demo::generate_demo_surfels(cli.seed)),
    };

    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "ply" => Ok(parser::ply::load_ply_file(path)?),
        _ => Err(format!(
            "Unsupported input '{}'. Use a .ply file or --demo",
            path.display()
        )
        .into()),
    }
}

/// Fixed light above and to the side of the scene.
fn scene_light_position(center: Vec3, radius: f32) -> Vec3 {
    center + Vec3::new(radius * 1.5, radius * 3.0, radius * 2.0)
}

fn mark_shadowed(
    settings: &RenderSettings,
    surfels: &mut [Surfel],
    light: Vec3,
    center: Vec3,
) -> AppResult<()> {
    let resolution = Viewport::new(SHADOW_RESOLUTION, SHADOW_RESOLUTION)?;
    let pass = ShadowPass::looking_at(light, center, 50.0_f32.to_radians(), resolution)?;
    let covered = pass.covered_surfels(settings, surfels)?;
    apply_covered_flags(surfels, &covered);
    Ok(())
}

fn render_headless(
    cli: &Cli,
    settings: RenderSettings,
    surfels: &[Surfel],
    light: Option<Vec3>,
    output: &Path,
) -> AppResult<()> {
    let (center, radius) = viewer::scene_bounds(surfels);
    let viewport = Viewport::new(cli.width, cli.height)?;
    let frustum = Frustum::new(
        60.0_f32.to_radians(),
        viewport.aspect(),
        (radius * 0.01).max(1e-3),
        radius * 20.0,
    )?;
    let eye = center + Vec3::new(0.0, radius * 0.6, radius * 2.5);
    let view = Transformation::look_at(eye, center, Vec3::Y);

    let mut renderer = SurfelRenderer::new(viewport, frustum, settings)?;
    renderer.set_splat_function(cli.splat.into());
    renderer.set_transformation(view);
    renderer.set_lights(match light {
        Some(position) => vec![viewer::world_point_light(position, &view)],
        None => viewer::default_lights(),
    });

    renderer.begin_frame();
    let stats = renderer.warp(None, surfels)?;
    tracing::info!(
        "{} surfels: {} rasterized, {} culled",
        stats.submitted,
        stats.rasterized,
        stats.culled()
    );
    renderer.shade_frame()?.save_png(output)?;
    Ok(())
}

fn run_viewer(
    cli: &Cli,
    settings: RenderSettings,
    surfels: Vec<Surfel>,
    light: Option<Vec3>,
) -> AppResult<()> {
    let (cols, rows) = crossterm::terminal::size().unwrap_or((120, 40));
    let ss = cli.supersample.clamp(1, viewer::MAX_SUPERSAMPLE);
    let ss_px = ss as usize;
    let viewport = Viewport::new(cols.max(1) as usize * ss_px, rows.max(1) as usize * 2 * ss_px)?;
    let frustum = Frustum::new(60.0_f32.to_radians(), viewport.aspect(), 0.1, 1000.0)?;

    let mut renderer = SurfelRenderer::new(viewport, frustum, settings)?;
    renderer.set_splat_function(cli.splat.into());
    renderer.set_lights(viewer::default_lights());

    let mut app_state = AppState::new(surfels, renderer);
    app_state.supersample_factor = ss;
    app_state.use_truecolor = detect_truecolor();
    app_state.world_light = light;

    install_panic_hook();
    let mut stdout = BufWriter::with_capacity(1024 * 1024, io::stdout());
    enter_terminal(&mut stdout)?;
    let input_rx = viewer::input::thread::spawn_input_thread();

    let run_result = viewer::frame::run_app_loop(&mut app_state, &input_rx, &mut stdout);
    let cleanup_result = cleanup_terminal(&mut stdout);

    run_result?;
    cleanup_result
}

fn main() -> AppResult<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;
    let settings = settings_from_cli(&cli)?;

    let mut surfels = load_surfels_from_cli(&cli)?;
    if cli.flip_y || cli.flip_z {
        for surfel in &mut surfels {
            if cli.flip_y {
                surfel.position.y = -surfel.position.y;
                surfel.normal.y = -surfel.normal.y;
            }
            if cli.flip_z {
                surfel.position.z = -surfel.position.z;
                surfel.normal.z = -surfel.normal.z;
            }
        }
    }
    tracing::info!("loaded {} surfels", surfels.len());

    let light = if cli.shadows {
        let (center, radius) = viewer::scene_bounds(&surfels);
        let position = scene_light_position(center, radius);
        mark_shadowed(&settings, &mut surfels, position, center)?;
        Some(position)
    } else {
        None
    };

    match cli.output.as_deref() {
        Some(output) => render_headless(&cli, settings, &surfels, light, output),
        None => run_viewer(&cli, settings, surfels, light),
    }
}

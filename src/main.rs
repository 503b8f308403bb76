// src/main.rs
use anyhow::{bail, Result};
use clap::Parser;
use matrix_rain::{app::App, config::Config, config::EffectKind, data::FontDescriptor};
use std::{path::PathBuf, sync::Arc};
use winit::{
    dpi::LogicalSize,
    event::{ElementState, Event, WindowEvent},
    event_loop::EventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::WindowBuilder,
};

#[derive(Parser, Debug)]
#[command(name = "matrix-rain", version, about = "Matrix digital rain")]
struct Args {
    /// Base look: classic, operator, nightmare, paradise, resurrections, 3d
    #[arg(long, default_value = "classic")]
    preset: String,

    /// JSON file with config overrides (camelCase keys)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    font: Option<String>,

    #[arg(long, value_enum)]
    effect: Option<EffectKind>,

    /// Overlay image for `--effect image`
    #[arg(long)]
    image: Option<PathBuf>,

    #[arg(long)]
    columns: Option<u32>,

    #[arg(long)]
    fall_speed: Option<f32>,

    /// Render scale relative to the window
    #[arg(long)]
    resolution: Option<f32>,

    #[arg(long)]
    fps: Option<f32>,

    /// Drops restart in place instead of drifting
    #[arg(long)]
    loops: bool,

    /// Run every pass on the host instead of the GPU
    #[arg(long)]
    cpu: bool,

    /// Print presets and fonts, then exit
    #[arg(long)]
    list: bool,
}

fn build_config(args: &Args) -> Result<Config> {
    let Some(mut cfg) = Config::preset(&args.preset) else {
        bail!(
            "unknown preset `{}` (known: {})",
            args.preset,
            Config::preset_names().join(", ")
        );
    };
    if let Some(path) = &args.config {
        cfg = cfg.with_json_file(path)?;
    }
    if let Some(font) = &args.font {
        cfg.font = font.clone();
    }
    if let Some(effect) = args.effect {
        cfg.effect = effect;
    }
    if let Some(image) = &args.image {
        cfg.image_path = Some(image.clone());
    }
    if let Some(columns) = args.columns {
        cfg.num_columns = columns;
    }
    if let Some(speed) = args.fall_speed {
        cfg.fall_speed = speed;
    }
    if let Some(resolution) = args.resolution {
        cfg.resolution = resolution;
    }
    if let Some(fps) = args.fps {
        cfg.fps = fps;
    }
    cfg.loops |= args.loops;
    cfg.validate()?;
    Ok(cfg)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.list {
        println!("presets: {}", Config::preset_names().join(", "));
        println!("fonts:   {}", FontDescriptor::names().collect::<Vec<_>>().join(", "));
        return Ok(());
    }
    let config = build_config(&args)?;
    log::info!("preset {}, font {}, effect {}", args.preset, config.font, config.effect);

    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Matrix Rain")
            .with_inner_size(LogicalSize::new(1280, 720))
            .build(&event_loop)?,
    );

    let mut app = pollster::block_on(App::new(window.clone(), config, args.cpu))?;

    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(winit::event_loop::ControlFlow::Poll);

        match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested => elwt.exit(),
                WindowEvent::Resized(sz) => app.resize(sz),
                WindowEvent::RedrawRequested => {
                    if let Err(e) = app.redraw() {
                        log::error!("{e}");
                        elwt.exit();
                    }
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if event.state != ElementState::Pressed {
                        return;
                    }
                    match event.physical_key {
                        PhysicalKey::Code(KeyCode::Escape) => elwt.exit(),
                        PhysicalKey::Code(code) => app.handle_key(code),
                        _ => {}
                    }
                }
                WindowEvent::MouseInput { button, state, .. } => {
                    app.handle_mouse_button(button, state);
                }
                WindowEvent::CursorMoved { position, .. } => {
                    app.handle_cursor((position.x, position.y));
                }
                _ => {}
            },
            Event::AboutToWait => {
                window.request_redraw();
            }
            _ => {}
        }
    })?;

    Ok(())
}

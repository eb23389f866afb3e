//! Game Frame Controller
//!
//! Console tool that captures the game window with the Windows Graphics
//! Capture API, trims letterbox borders, and simulates key presses from
//! global hotkeys or a polling loop.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use game_frame_controller::config::{init_config, init_config_from};
use game_frame_controller::paths;

#[derive(Parser, Debug)]
#[command(
    name = "game-frame-controller",
    version,
    about = "Capture a game window's frame and drive key presses from hotkeys"
)]
struct Cli {
    /// Config file (default: config.json next to the executable)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture one frame of the game window and save it
    Capture {
        /// Directory to save into (default: game_screenshots next to the executable)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Focus the game and press dodge a few times
    Demo {
        #[arg(long, default_value_t = 10)]
        count: u32,
        /// Delay between presses (milliseconds)
        #[arg(long, default_value_t = 200)]
        interval_ms: u64,
    },
    /// Listen for hotkeys until the quit hotkey is pressed
    Run {
        /// Also run the capture-and-act polling loop
        #[arg(long)]
        poll: bool,
    },
    /// List visible windows with their rectangles
    ListWindows,
}

impl Commands {
    #[cfg_attr(windows, allow(dead_code))]
    fn name(&self) -> &'static str {
        match self {
            Commands::Capture { .. } => "capture",
            Commands::Demo { .. } => "demo",
            Commands::Run { .. } => "run",
            Commands::ListWindows => "list-windows",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    game_frame_controller::install_panic_hook();
    paths::ensure_directories()?;

    match &cli.config {
        Some(path) => init_config_from(path)?,
        None => init_config(&paths::get_config_path()),
    }

    execute(cli.command.unwrap_or(Commands::Run { poll: false }))
}

#[cfg(windows)]
fn execute(command: Commands) -> Result<()> {
    use std::sync::Arc;
    use std::time::Duration;

    use game_frame_controller::app::WindowsApp;
    use game_frame_controller::capture::platform::enable_dpi_awareness;
    use game_frame_controller::config::get_config;
    use game_frame_controller::controller::{run_hotkey_loop, KeyReleaseHook};
    use game_frame_controller::log;

    unsafe {
        windows::Win32::System::WinRT::RoInitialize(
            windows::Win32::System::WinRT::RO_INIT_MULTITHREADED,
        )?
    };
    enable_dpi_awareness();

    let app = WindowsApp::for_windows(get_config().clone(), paths::get_screenshots_dir());

    match command {
        Commands::Capture { output_dir } => {
            let dir = output_dir.unwrap_or_else(paths::get_screenshots_dir);
            app.capture_to(&dir)?;
        }
        Commands::Demo { count, interval_ms } => {
            app.run_demo(count, Duration::from_millis(interval_ms))?;
        }
        Commands::Run { poll } => {
            log("Game Frame Controller started");
            log(&format!(
                "Target window: \"{}\"",
                app.config().screen_capture.window_title
            ));
            let app = Arc::new(app);
            let release_hook = KeyReleaseHook::install({
                let app = Arc::clone(&app);
                move |vk| app.handle_key_released(vk)
            })
            .map_err(|e| log(&format!("Key release tracking disabled: {:#}", e)))
            .ok();

            let result = app.run(poll, |table, handler| run_hotkey_loop(table, handler));
            if let Some(hook) = release_hook {
                hook.stop();
            }
            result?;
        }
        Commands::ListWindows => {
            for window in app.list_windows()? {
                println!("{}  {}  {}", window.handle, window.rect, window.title);
            }
        }
    }
    Ok(())
}

#[cfg(not(windows))]
fn execute(command: Commands) -> Result<()> {
    Err(anyhow::anyhow!(
        "'{}' requires Windows: window capture and key input use Win32 APIs",
        command.name()
    ))
}

//! Application wiring.
//!
//! `App` owns one capturer and one controller, each behind a `Mutex`, and
//! routes hotkey actions and polling iterations to them. The OS collaborators
//! are type parameters so the wiring runs against fakes in tests.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::capture::window::SETTLE_DELAY;
use crate::capture::{
    activate_window, locate_window, save_frame, FrameCapturer, FrameGrabber, WindowBackend,
    WindowInfo,
};
use crate::config::AppConfig;
use crate::controller::{
    DispatchOutcome, GameController, HotkeyAction, HotkeyTable, KeySender, PollingLoop,
    VirtualKey,
};

/// Action pressed repeatedly by the demo command.
pub const DEMO_ACTION: &str = "dodge";

pub struct App<W, G, S> {
    config: AppConfig,
    output_dir: PathBuf,
    capturer: Mutex<FrameCapturer<W, G>>,
    controller: Mutex<GameController<S>>,
}

#[cfg(windows)]
pub type WindowsApp = App<
    crate::capture::platform::Win32Windows,
    crate::capture::platform::GraphicsCaptureGrabber,
    crate::controller::SendInputKeys,
>;

#[cfg(windows)]
impl WindowsApp {
    /// Builds the app over the Win32 window, capture, and input backends.
    pub fn for_windows(config: AppConfig, output_dir: PathBuf) -> Self {
        App::new(
            config,
            output_dir,
            crate::capture::platform::Win32Windows,
            crate::capture::platform::GraphicsCaptureGrabber,
            crate::controller::SendInputKeys,
        )
    }
}

impl<W, G, S> App<W, G, S>
where
    W: WindowBackend,
    G: FrameGrabber,
    S: KeySender,
{
    pub fn new(config: AppConfig, output_dir: PathBuf, windows: W, grabber: G, sender: S) -> Self {
        let capturer = FrameCapturer::new(config.screen_capture.clone(), windows, grabber);
        let controller =
            GameController::new(sender, config.key_mapping.clone(), &config.controller);
        Self {
            config,
            output_dir,
            capturer: Mutex::new(capturer),
            controller: Mutex::new(controller),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn capturer(&self) -> Result<MutexGuard<'_, FrameCapturer<W, G>>> {
        self.capturer
            .lock()
            .map_err(|_| anyhow!("Capturer lock poisoned"))
    }

    fn controller(&self) -> Result<MutexGuard<'_, GameController<S>>> {
        self.controller
            .lock()
            .map_err(|_| anyhow!("Controller lock poisoned"))
    }

    /// Runs `f` with exclusive access to the controller.
    pub fn with_controller<R>(&self, f: impl FnOnce(&mut GameController<S>) -> R) -> Result<R> {
        let mut controller = self.controller()?;
        Ok(f(&mut controller))
    }

    /// Captures one frame and saves it into `dir`.
    pub fn capture_to(&self, dir: &Path) -> Result<PathBuf> {
        let frame = self.capturer()?.capture()?;
        let output = &self.config.output;
        save_frame(&frame, dir, &output.prefix, &output.format)
    }

    /// Captures one frame and saves it into the configured output directory.
    pub fn capture_and_save(&self) -> Result<PathBuf> {
        self.capture_to(&self.output_dir)
    }

    /// Lists visible windows so users can copy the exact title.
    pub fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        self.capturer()?.windows().list_windows()
    }

    /// Dispatches a game action and logs why it was skipped, if it was.
    pub fn dispatch(&self, action: &str) -> Result<DispatchOutcome> {
        let outcome = self.controller()?.dispatch(action)?;
        match &outcome {
            DispatchOutcome::Executed { .. } => {}
            DispatchOutcome::Inactive => {
                crate::log(&format!("Ignored '{}': control is not active", action))
            }
            DispatchOutcome::CoolingDown => {
                crate::log(&format!("Ignored '{}': cooling down", action))
            }
            DispatchOutcome::Unmapped => {
                crate::log(&format!("Ignored '{}': no key mapped", action))
            }
        }
        Ok(outcome)
    }

    /// Handles one hotkey press. Returns `false` when the app should quit.
    pub fn handle_hotkey(&self, action: &HotkeyAction) -> bool {
        crate::log(&format!("Hotkey pressed: {}", action));

        let result = match action {
            HotkeyAction::Capture => self
                .capture_and_save()
                .map(|path| crate::log(&format!("Screenshot saved: {}", path.display()))),
            HotkeyAction::StartControl => self.controller().map(|mut c| c.start()),
            HotkeyAction::StopControl => self.controller().and_then(|mut c| c.stop()),
            HotkeyAction::Action(name) => self.dispatch(name).map(|_| ()),
            HotkeyAction::Quit => return false,
        };

        if let Err(e) = result {
            crate::log(&format!("{} failed: {:#}", action, e));
        }
        true
    }

    /// Forwards a physical key release to the controller.
    pub fn handle_key_released(&self, vk: VirtualKey) {
        match self.controller() {
            Ok(mut controller) => controller.virtual_key_released(vk),
            Err(e) => crate::log(&format!("Key release for {:#04x} dropped: {:#}", vk, e)),
        }
    }

    /// One polling iteration: capture, optionally save, then dispatch the
    /// configured action.
    pub fn poll_once(&self) -> Result<DispatchOutcome> {
        let frame = self.capturer()?.capture()?;

        let polling = &self.config.polling;
        if polling.save_frames {
            let output = &self.config.output;
            save_frame(&frame, &self.output_dir, &output.prefix, &output.format)?;
        }

        self.dispatch(&polling.action)
    }

    /// Activates the game window, starts control, presses [`DEMO_ACTION`]
    /// `count` times, then stops and releases every key.
    ///
    /// Returns how many presses were executed.
    pub fn run_demo(&self, count: u32, interval: Duration) -> Result<u32> {
        {
            let capturer = self.capturer()?;
            let handle = locate_window(capturer.windows(), &capturer.config().window_title)?;
            if let Err(e) = activate_window(capturer.windows(), handle) {
                crate::log(&format!("{}", e));
            }
        }
        thread::sleep(SETTLE_DELAY);

        let mut controller = self.controller()?;
        controller.start();

        let mut executed = 0;
        for i in 0..count {
            match controller.dispatch(DEMO_ACTION) {
                Ok(DispatchOutcome::Executed { .. }) => executed += 1,
                Ok(outcome) => crate::log(&format!("Demo press {} skipped: {:?}", i + 1, outcome)),
                Err(e) => {
                    let _ = controller.stop();
                    return Err(e);
                }
            }
            if i + 1 < count {
                thread::sleep(interval);
            }
        }

        controller.stop()?;
        crate::log(&format!("Demo finished: {} of {} presses", executed, count));
        Ok(executed)
    }
}

impl<W, G, S> App<W, G, S>
where
    W: WindowBackend + Send + 'static,
    G: FrameGrabber + Send + 'static,
    S: KeySender + Send + 'static,
{
    /// Runs the hotkey loop until it returns, with the polling loop alongside
    /// when `poll` is set or enabled in config. Held keys are released on exit.
    ///
    /// `hotkey_loop` receives the parsed bindings and a handler that returns
    /// `false` on quit.
    pub fn run<L>(self: &Arc<Self>, poll: bool, hotkey_loop: L) -> Result<()>
    where
        L: FnOnce(&HotkeyTable, &mut dyn FnMut(&HotkeyAction) -> bool) -> Result<()>,
    {
        let table = HotkeyTable::from_config(&self.config.hotkeys)?;
        if !table.has_quit() {
            crate::log("No quit hotkey configured; close the console to exit");
        }

        let polling = if poll || self.config.polling.enabled {
            let app = Arc::clone(self);
            Some(PollingLoop::spawn(
                self.config.polling.interval(),
                move || {
                    if let Err(e) = app.poll_once() {
                        crate::log(&format!("Polling iteration failed: {:#}", e));
                    }
                },
            )?)
        } else {
            None
        };

        let result = hotkey_loop(&table, &mut |action| self.handle_hotkey(action));

        if let Some(polling) = polling {
            polling.shutdown(self.config.polling.shutdown_grace());
        }
        self.controller()?.stop()?;
        crate::log("Exiting");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::region::Rect;
    use crate::capture::window::tests::FakeWindows;
    use crate::capture::RawFrame;
    use crate::controller::input::tests::RecordingKeys;
    use crate::controller::ControlState;
    use image::GenericImageView;
    use tempfile::tempdir;

    /// Serves an opaque mid-gray frame of the requested size.
    struct GrayGrabber;

    impl FrameGrabber for GrayGrabber {
        fn grab(&self, region: Rect) -> Result<Option<RawFrame>> {
            let (w, h) = (region.width() as u32, region.height() as u32);
            let data = [128u8, 128, 128, 255].repeat((w * h) as usize);
            Ok(Some(RawFrame::new(w, h, data)?))
        }
    }

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.screen_capture.window_title = "Game".to_string();
        config.controller.action_cooldown_ms = 0;
        config
            .key_mapping
            .insert("sprint".to_string(), "shift".to_string());
        config
    }

    fn test_app(
        config: AppConfig,
        dir: &Path,
    ) -> App<FakeWindows, GrayGrabber, RecordingKeys> {
        let windows = FakeWindows::new(vec![
            ("Notepad", Rect::new(0, 0, 300, 200)),
            ("Game", Rect::new(100, 100, 420, 340)),
        ]);
        App::new(
            config,
            dir.to_path_buf(),
            windows,
            GrayGrabber,
            RecordingKeys::default(),
        )
    }

    fn events(app: &App<FakeWindows, GrayGrabber, RecordingKeys>) -> Vec<String> {
        app.with_controller(|c| c.sender().events.clone()).unwrap()
    }

    #[test]
    fn test_capture_hotkey_saves_frame() {
        let dir = tempdir().unwrap();
        let app = test_app(test_config(), dir.path());

        assert!(app.handle_hotkey(&HotkeyAction::Capture));

        let saved: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(saved.len(), 1);
        let path = saved[0].as_ref().unwrap().path();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("game_screenshot_"));
        assert!(name.ends_with(".png"));

        let image = image::open(&path).unwrap();
        assert_eq!(image.dimensions(), (320, 240));
    }

    #[test]
    fn test_capture_without_window_keeps_running() {
        let dir = tempdir().unwrap();
        let mut config = test_config();
        config.screen_capture.window_title = "Missing".to_string();
        let app = test_app(config, dir.path());

        assert!(app.handle_hotkey(&HotkeyAction::Capture));
        assert!(app.capture_and_save().is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_control_hotkeys() {
        let dir = tempdir().unwrap();
        let app = test_app(test_config(), dir.path());
        let dodge = HotkeyAction::Action("dodge".to_string());

        app.handle_hotkey(&dodge);
        assert!(events(&app).is_empty());

        app.handle_hotkey(&HotkeyAction::StartControl);
        app.handle_hotkey(&dodge);
        app.handle_hotkey(&HotkeyAction::Action("sprint".to_string()));
        app.handle_hotkey(&HotkeyAction::StopControl);

        assert_eq!(
            events(&app),
            vec!["press space", "release space", "press shift", "release shift"]
        );
        assert_eq!(
            app.with_controller(|c| c.state()).unwrap(),
            ControlState::Idle
        );
    }

    #[test]
    fn test_released_key_is_not_released_again() {
        let dir = tempdir().unwrap();
        let app = test_app(test_config(), dir.path());

        app.handle_hotkey(&HotkeyAction::StartControl);
        app.handle_hotkey(&HotkeyAction::Action("sprint".to_string()));
        app.handle_key_released(0xA1);
        app.handle_hotkey(&HotkeyAction::StopControl);

        assert_eq!(events(&app), vec!["press shift"]);
    }

    #[test]
    fn test_quit_hotkey_ends_loop() {
        let dir = tempdir().unwrap();
        let app = test_app(test_config(), dir.path());
        assert!(!app.handle_hotkey(&HotkeyAction::Quit));
    }

    #[test]
    fn test_poll_once_dispatches_when_active() {
        let dir = tempdir().unwrap();
        let mut config = test_config();
        config.polling.save_frames = true;
        let app = test_app(config, dir.path());

        assert_eq!(app.poll_once().unwrap(), DispatchOutcome::Inactive);

        app.with_controller(|c| c.start()).unwrap();
        assert_eq!(
            app.poll_once().unwrap(),
            DispatchOutcome::Executed {
                key: "space".to_string()
            }
        );
        assert!(std::fs::read_dir(dir.path()).unwrap().count() >= 1);
    }

    #[test]
    fn test_demo_presses_and_releases() {
        let dir = tempdir().unwrap();
        let app = test_app(test_config(), dir.path());

        let executed = app.run_demo(3, Duration::ZERO).unwrap();

        assert_eq!(executed, 3);
        assert_eq!(events(&app).len(), 6);
        assert!(!app.with_controller(|c| c.is_active()).unwrap());
        assert_eq!(
            app.capturer().unwrap().windows().activated.borrow().as_slice(),
            &[crate::capture::WindowHandle(2)]
        );
    }

    #[test]
    fn test_demo_requires_window() {
        let dir = tempdir().unwrap();
        let mut config = test_config();
        config.screen_capture.window_title = "Missing".to_string();
        let app = test_app(config, dir.path());

        assert!(app.run_demo(3, Duration::ZERO).is_err());
        assert!(events(&app).is_empty());
    }

    #[test]
    fn test_list_windows() {
        let dir = tempdir().unwrap();
        let app = test_app(test_config(), dir.path());

        let titles: Vec<String> = app
            .list_windows()
            .unwrap()
            .into_iter()
            .map(|w| w.title)
            .collect();
        assert_eq!(titles, vec!["Notepad", "Game"]);
    }

    #[test]
    fn test_run_releases_held_keys_on_exit() {
        let dir = tempdir().unwrap();
        let app = Arc::new(test_app(test_config(), dir.path()));

        let script = [
            HotkeyAction::StartControl,
            HotkeyAction::Action("sprint".to_string()),
            HotkeyAction::Quit,
            HotkeyAction::Action("dodge".to_string()),
        ];
        app.run(false, |table, handler| {
            assert_eq!(table.bindings().len(), 5);
            for action in &script {
                if !handler(action) {
                    break;
                }
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(events(&app), vec!["press shift", "release shift"]);
    }

    #[test]
    fn test_run_with_polling() {
        let dir = tempdir().unwrap();
        let mut config = test_config();
        config.polling.interval_ms = 5;
        let app = Arc::new(test_app(config, dir.path()));

        app.run(true, |_, handler| {
            handler(&HotkeyAction::StartControl);
            let deadline = std::time::Instant::now() + Duration::from_secs(5);
            while events(&app).is_empty() && std::time::Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            handler(&HotkeyAction::Quit);
            Ok(())
        })
        .unwrap();

        let events = events(&app);
        assert!(!events.is_empty());
        assert_eq!(events[0], "press space");
    }
}

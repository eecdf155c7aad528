use std::io::{self, Write};
use std::time::Duration;

use crossterm::cursor::{Hide, Show};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use serde_json::{Value, json};
use thiserror::Error;

use crate::error::NavError;
use crate::render::{Size, TerminalRenderer};
use crate::runtime::Navigator;

use super::MemoryDriverHandle;

pub type DriverResult<T> = std::result::Result<T, CliDriverError>;

#[derive(Debug, Error)]
pub enum CliDriverError {
    #[error("navigation error: {0}")]
    Navigation(#[from] NavError),
    #[error("terminal error: {0}")]
    Terminal(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// What a single key press turns into.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction {
    Back,
    Exit,
    Forward(Value),
    Ignore,
}

/// Esc goes back, Ctrl+C leaves, anything else is handed to the screens.
pub fn key_action(key: &KeyEvent) -> KeyAction {
    if key.kind == KeyEventKind::Release {
        return KeyAction::Ignore;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Exit,
        KeyCode::Esc => KeyAction::Back,
        KeyCode::Char(ch) => KeyAction::Forward(json!({ "key": ch.to_string() })),
        KeyCode::Enter => KeyAction::Forward(json!({ "key": "enter" })),
        KeyCode::Backspace => KeyAction::Forward(json!({ "key": "backspace" })),
        KeyCode::Tab => KeyAction::Forward(json!({ "key": "tab" })),
        KeyCode::Up => KeyAction::Forward(json!({ "key": "up" })),
        KeyCode::Down => KeyAction::Forward(json!({ "key": "down" })),
        KeyCode::Left => KeyAction::Forward(json!({ "key": "left" })),
        KeyCode::Right => KeyAction::Forward(json!({ "key": "right" })),
        _ => KeyAction::Ignore,
    }
}

/// Terminal host for a [`Navigator`]: manages raw mode and the alternate
/// screen, draws the root view and feeds key presses back in.
///
/// Keys are delivered through `input`, the handle of a
/// [`MemoryDriver`](super::MemoryDriver) registered on whichever channel the
/// screens read keys from.
pub struct CliDriver {
    navigator: Navigator,
    input: MemoryDriverHandle,
    tick: Duration,
}

impl CliDriver {
    pub fn new(navigator: Navigator, input: MemoryDriverHandle) -> Self {
        Self {
            navigator,
            input,
            tick: Duration::from_millis(50),
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn run(self) -> DriverResult<()> {
        let mut stdout = io::stdout();
        self.enter(&mut stdout)?;
        let result = self.run_inner(&mut stdout);
        self.exit(&mut stdout);
        result
    }

    fn run_inner(&self, stdout: &mut impl Write) -> DriverResult<()> {
        let (width, height) = terminal::size()?;
        let mut renderer = TerminalRenderer::with_size(Size::new(width, height));

        loop {
            self.navigator.check()?;
            if let Some(view) = self.navigator.view().latest() {
                renderer.render(stdout, &view)?;
            }

            if !event::poll(self.tick)? {
                continue;
            }
            match event::read()? {
                Event::Key(key) => {
                    if !self.apply(key_action(&key))? {
                        break;
                    }
                }
                Event::Resize(width, height) => {
                    execute!(stdout, Clear(ClearType::All))?;
                    renderer.resize(Size::new(width, height));
                }
                _ => {}
            }
        }

        self.navigator.emit_metrics();
        Ok(())
    }

    /// Returns `false` once the loop should stop.
    fn apply(&self, action: KeyAction) -> DriverResult<bool> {
        match action {
            KeyAction::Exit => return Ok(false),
            KeyAction::Back => self.navigator.back()?,
            KeyAction::Forward(payload) => {
                self.input.send(payload);
                self.navigator.check()?;
            }
            KeyAction::Ignore => {}
        }
        Ok(true)
    }

    fn enter(&self, stdout: &mut impl Write) -> DriverResult<()> {
        terminal::enable_raw_mode().map_err(|err| CliDriverError::Terminal(err.to_string()))?;
        self.prepare_screen(stdout)
    }

    /// Switch to the alternate screen, restoring the terminal if that fails.
    fn prepare_screen(&self, stdout: &mut impl Write) -> DriverResult<()> {
        if let Err(err) = execute!(stdout, EnterAlternateScreen, Hide, Clear(ClearType::All)) {
            self.exit(stdout);
            return Err(err.into());
        }
        Ok(())
    }

    fn exit(&self, stdout: &mut impl Write) {
        execute!(stdout, Show, LeaveAlternateScreen).ok();
        terminal::disable_raw_mode().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Layout, LayoutComponent};
    use crate::navigation::Command;
    use crate::runtime::driver::{Drivers, MemoryDriver};
    use crate::runtime::screens::{ScreenRegistry, ScreenSinks, ScreenSources};
    use crate::runtime::{RuntimeConfig, run};
    use crate::stream::Stream;
    use crate::view::View;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn keys_map_to_actions() {
        assert_eq!(key_action(&press(KeyCode::Esc, KeyModifiers::NONE)), KeyAction::Back);
        assert_eq!(
            key_action(&press(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            KeyAction::Exit
        );
        assert_eq!(
            key_action(&press(KeyCode::Char('c'), KeyModifiers::NONE)),
            KeyAction::Forward(json!({"key": "c"}))
        );
        assert_eq!(
            key_action(&press(KeyCode::Enter, KeyModifiers::NONE)),
            KeyAction::Forward(json!({"key": "enter"}))
        );
        assert_eq!(key_action(&press(KeyCode::F(5), KeyModifiers::NONE)), KeyAction::Ignore);
    }

    #[test]
    fn forwarded_keys_drive_the_stack() {
        let mut screens = ScreenRegistry::new();
        screens.register("Home", |sources: ScreenSources| {
            let push = sources
                .driver("keys")
                .filter(|payload: &Value| payload["key"] == "d")
                .map(|_| Command::push(LayoutComponent::new("Detail")));
            ScreenSinks::new()
                .with_screen(Stream::of(View::text("home")))
                .with_navigation(push)
        });
        screens.register("Detail", |sources: ScreenSources| {
            let navigation = sources.navigation.clone();
            let pop = sources
                .navigation
                .back()
                .filter(move |_| navigation.is_top())
                .map(|_| Command::Pop);
            ScreenSinks::new()
                .with_screen(Stream::of(View::text("detail")))
                .with_navigation(pop)
        });
        let (keys, handle) = MemoryDriver::new();
        let navigator = run(
            screens,
            Drivers::new().with("keys", keys),
            &Layout::single(LayoutComponent::new("Home")),
            RuntimeConfig::default(),
        )
        .unwrap();
        let driver = CliDriver::new(navigator, handle);

        assert!(driver.apply(KeyAction::Forward(json!({"key": "d"}))).unwrap());
        assert_eq!(driver.navigator().current_stack().len(), 2);
        assert!(driver.apply(KeyAction::Back).unwrap());
        assert_eq!(driver.navigator().current_stack().len(), 1);
        assert!(!driver.apply(KeyAction::Exit).unwrap());
    }

    /// Fails the first `failures` writes, then records everything.
    struct FlakyWriter {
        failures: usize,
        written: Vec<u8>,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(io::Error::other("terminal closed"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_screen_setup_restores_the_terminal() {
        let mut screens = ScreenRegistry::new();
        screens.register("Home", |_| ScreenSinks::new());
        let navigator = run(
            screens,
            Drivers::new(),
            &Layout::single(LayoutComponent::new("Home")),
            RuntimeConfig::default(),
        )
        .unwrap();
        let (_, handle) = MemoryDriver::new();
        let driver = CliDriver::new(navigator, handle);

        let mut stdout = FlakyWriter {
            failures: 1,
            written: Vec::new(),
        };
        assert!(matches!(
            driver.prepare_screen(&mut stdout),
            Err(CliDriverError::Io(_))
        ));
        let restored = String::from_utf8_lossy(&stdout.written);
        assert!(restored.contains("\x1b[?25h"));
        assert!(restored.contains("\x1b[?1049l"));
    }
}

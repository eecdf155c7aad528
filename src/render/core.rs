use std::io::Write;

use crate::error::Result;
use crate::view::View;

use super::{Size, display_width};

/// Renderer runtime parameters.
#[derive(Debug, Clone)]
pub struct RendererSettings {
    /// Top-left cell the view is drawn from, zero based.
    pub origin: (u16, u16),
    pub restore_cursor: Option<(u16, u16)>,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            origin: (0, 0),
            restore_cursor: None,
        }
    }
}

/// Draws the root view into a fixed terminal area using ANSI cursor
/// addressing. Frames identical to the last committed one are skipped.
pub struct TerminalRenderer {
    settings: RendererSettings,
    size: Size,
    last_frame: Option<blake3::Hash>,
}

impl TerminalRenderer {
    pub fn new(size: Size, settings: RendererSettings) -> Self {
        Self {
            settings,
            size,
            last_frame: None,
        }
    }

    pub fn with_size(size: Size) -> Self {
        Self::new(size, RendererSettings::default())
    }

    pub fn settings_mut(&mut self) -> &mut RendererSettings {
        &mut self.settings
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Resizing forces the next frame to be written in full.
    pub fn resize(&mut self, size: Size) {
        if size != self.size {
            self.size = size;
            self.last_frame = None;
        }
    }

    pub fn invalidate(&mut self) {
        self.last_frame = None;
    }

    /// Lay the view out into exactly `height` padded lines.
    pub fn frame(&self, view: &View) -> Vec<String> {
        let Size { width, height } = self.size;
        if self.size.is_empty() {
            return Vec::new();
        }

        let mut rendered_lines: Vec<String> = view
            .lines()
            .iter()
            .flat_map(|line| wrap_to_width(line, width))
            .collect();

        if rendered_lines.len() > height as usize {
            rendered_lines.truncate(height as usize);
        }

        while rendered_lines.len() < height as usize {
            rendered_lines.push(String::new());
        }

        for line in rendered_lines.iter_mut() {
            pad_line(line, width);
        }
        rendered_lines
    }

    /// Returns `false` when the frame matched the previous one and nothing
    /// was written.
    pub fn render(&mut self, writer: &mut impl Write, view: &View) -> Result<bool> {
        let lines = self.frame(view);
        let hash = blake3::hash(lines.join("\n").as_bytes());
        if self.last_frame == Some(hash) {
            return Ok(false);
        }

        let (x, y) = self.settings.origin;
        for (offset, line) in lines.iter().enumerate() {
            write!(writer, "\x1b[{};{}H", y + offset as u16 + 1, x + 1)?;
            write!(writer, "{}", line)?;
        }

        if let Some((row, col)) = self.settings.restore_cursor {
            write!(writer, "\x1b[{};{}H", row + 1, col + 1)?;
        }

        writer.flush()?;
        self.last_frame = Some(hash);
        Ok(true)
    }
}

fn wrap_to_width(content: &str, width: u16) -> Vec<String> {
    if width == 0 {
        return Vec::new();
    }
    if content.is_empty() {
        return vec![String::new()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    for ch in content.chars() {
        if current.is_empty() && ch == ' ' {
            continue;
        }
        current.push(ch);
        let display = display_width(&current) as u16;
        if display > width {
            current.pop();
            // A glyph wider than the whole area yields a blank line.
            lines.push(current.trim_start().to_string());
            current.clear();
            current.push(ch);
        } else if display == width {
            lines.push(current.trim_start().to_string());
            current.clear();
        }
    }

    if !current.is_empty() {
        lines.push(current.trim_start().to_string());
    }

    lines
}

fn pad_line(line: &mut String, width: u16) {
    let mut display = display_width(line) as u16;
    while display < width {
        line.push(' ');
        display += 1;
    }

    if display > width {
        while (display_width(line) as u16) > width {
            line.pop();
        }
        while (display_width(line) as u16) < width {
            line.push(' ');
        }
    }
}

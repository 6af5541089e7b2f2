//! Destinations for accepted readings

use std::io::Write;

use crate::error::Result;
use crate::validator::Reading;

/// Receives accepted, rate-limited readings
pub trait ReadingSink {
    /// Deliver one reading
    fn deliver(&mut self, reading: &Reading) -> Result<()>;
}

impl ReadingSink for Vec<Reading> {
    fn deliver(&mut self, reading: &Reading) -> Result<()> {
        self.push(*reading);
        Ok(())
    }
}

/// Adapts a closure into a sink
pub struct FnSink<F>(pub F);

impl<F> ReadingSink for FnSink<F>
where
    F: FnMut(&Reading),
{
    fn deliver(&mut self, reading: &Reading) -> Result<()> {
        (self.0)(reading);
        Ok(())
    }
}

impl<A: ReadingSink, B: ReadingSink> ReadingSink for (A, B) {
    fn deliver(&mut self, reading: &Reading) -> Result<()> {
        let first = self.0.deliver(reading);
        self.1.deliver(reading)?;
        first
    }
}

/// Line-oriented text output: `<channel>:<temp>:<humidity>`
#[derive(Debug)]
pub struct TextLineSink<W: Write> {
    writer: W,
}

impl<W: Write> TextLineSink<W> {
    /// Wrap a writer (serial port, stdout, file)
    pub fn new(writer: W) -> Self {
        TextLineSink { writer }
    }

    /// Borrow the writer
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReadingSink for TextLineSink<W> {
    fn deliver(&mut self, reading: &Reading) -> Result<()> {
        writeln!(self.writer, "{}", reading)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Character display columns
pub const DISPLAY_COLUMNS: usize = 16;

/// Character display rows
pub const DISPLAY_ROWS: usize = 2;

/// Text buffer of a 16x2 character display showing the latest reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterDisplay {
    rows: [String; DISPLAY_ROWS],
    updates: u32,
}

impl CharacterDisplay {
    /// Create a blank display
    pub fn new() -> Self {
        CharacterDisplay {
            rows: [blank_row(), blank_row()],
            updates: 0,
        }
    }

    /// Row contents, always exactly [`DISPLAY_COLUMNS`] characters
    pub fn row(&self, index: usize) -> Option<&str> {
        self.rows.get(index).map(String::as_str)
    }

    /// Number of readings shown so far
    pub fn updates(&self) -> u32 {
        self.updates
    }

    fn set_row(&mut self, index: usize, text: &str) {
        let mut row: String = text.chars().take(DISPLAY_COLUMNS).collect();
        let width = row.chars().count();
        row.extend(std::iter::repeat(' ').take(DISPLAY_COLUMNS - width));
        self.rows[index] = row;
    }
}

fn blank_row() -> String {
    " ".repeat(DISPLAY_COLUMNS)
}

impl Default for CharacterDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadingSink for CharacterDisplay {
    fn deliver(&mut self, reading: &Reading) -> Result<()> {
        self.set_row(
            0,
            &format!("Ch{} {:.1}C", reading.channel_number(), reading.temperature_c),
        );
        self.set_row(1, &format!("Hum {}%", reading.humidity));
        self.updates = self.updates.saturating_add(1);
        Ok(())
    }
}

impl std::fmt::Display for CharacterDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.rows[0])?;
        write!(f, "{}", self.rows[1])
    }
}

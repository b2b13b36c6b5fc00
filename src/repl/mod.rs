//! Interactive driver around the plugin slot table
//!
//! Lines are parsed into a [`Command`] and executed by a [`Host`], which
//! writes its report to any `io::Write`. The interactive loop only adds line
//! editing and history on top.

mod command;

pub use command::{Command, ParseError, HELP_TEXT};

use crate::config::ReplConfig;
use crate::plugins::{LibraryService, PluginSlotTable};
use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Whether the loop should keep reading input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Executes driver commands against a slot table
pub struct Host<S: LibraryService> {
    table: PluginSlotTable<S>,
    unload_on_exit: bool,
}

impl<S: LibraryService> Host<S> {
    #[must_use]
    pub fn new(table: PluginSlotTable<S>, unload_on_exit: bool) -> Self {
        Self {
            table,
            unload_on_exit,
        }
    }

    #[must_use]
    pub fn table(&self) -> &PluginSlotTable<S> {
        &self.table
    }

    /// Parse and execute one line of input
    ///
    /// # Errors
    /// Only fails when writing to `out` fails
    pub fn handle_line<W: Write>(&mut self, line: &str, out: &mut W) -> io::Result<Flow> {
        match Command::parse(line) {
            Ok(command) => self.execute(command, out),
            Err(e) => {
                writeln!(out, "{e}")?;
                Ok(Flow::Continue)
            }
        }
    }

    /// # Errors
    /// Only fails when writing to `out` fails
    pub fn execute<W: Write>(&mut self, command: Command, out: &mut W) -> io::Result<Flow> {
        debug!("Executing {:?}", command);
        match command {
            Command::Blank => {}
            Command::Help => writeln!(out, "\n{HELP_TEXT}")?,
            Command::Quit => {
                writeln!(out, "Exiting driver program...")?;
                self.shutdown(out)?;
                return Ok(Flow::Quit);
            }
            Command::Show(field) => {
                for (index, value) in self.table.list_all(field) {
                    writeln!(out, "Plugin Slot {index:2}:  {value}")?;
                }
            }
            Command::Load { path, slot } => {
                self.load_into(&path, slot, out)?;
            }
            Command::Unload(index) => {
                if let Err(e) = self.table.unload(index) {
                    writeln!(out, "{e}")?;
                }
            }
            Command::Run(index) => {
                // Plugin output goes straight to stdout; keep ours ordered before it.
                out.flush()?;
                if let Err(e) = self.table.run(index) {
                    writeln!(out, "{e}")?;
                }
            }
        }
        Ok(Flow::Continue)
    }

    /// Load `path` into `slot`, or the first free slot when `None`
    ///
    /// Returns whether the plugin was loaded.
    ///
    /// # Errors
    /// Only fails when writing to `out` fails
    pub fn load_into<W: Write>(
        &mut self,
        path: &Path,
        slot: Option<usize>,
        out: &mut W,
    ) -> io::Result<bool> {
        let index = match slot {
            Some(index) => index,
            None => match self.table.first_free_slot() {
                Ok(index) => index,
                Err(e) => {
                    writeln!(out, "{e}")?;
                    writeln!(out, "Plugin loading failed!")?;
                    return Ok(false);
                }
            },
        };

        writeln!(
            out,
            "Will load '{}' into slot number {}...",
            path.display(),
            index
        )?;

        match self.table.load(path, index) {
            Ok(()) => Ok(true),
            Err(e) => {
                writeln!(out, "{e}")?;
                writeln!(out, "Plugin loading failed!")?;
                Ok(false)
            }
        }
    }

    /// Release every loaded slot if configured to
    fn shutdown<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        if !self.unload_on_exit {
            return Ok(());
        }
        for (index, e) in self.table.unload_all() {
            warn!("Slot {} could not be unloaded on exit: {}", index, e);
            writeln!(out, "{e}")?;
        }
        Ok(())
    }
}

/// Read commands from the terminal until `quit` or end of input
///
/// # Errors
/// Returns an error if the line editor cannot be created or stdout fails
pub fn run_interactive<S: LibraryService>(host: &mut Host<S>, config: &ReplConfig) -> Result<()> {
    let editor_config = rustyline::Config::builder()
        .max_history_size(config.max_history)
        .context("Invalid history size")?
        .auto_add_history(true)
        .build();
    let mut editor =
        DefaultEditor::with_config(editor_config).context("Failed to initialise line editor")?;

    if let Some(history) = &config.history_file {
        if let Err(e) = editor.load_history(history) {
            debug!("No history loaded from {}: {}", history.display(), e);
        }
    }

    let mut stdout = io::stdout();
    writeln!(stdout, "Type 'help' for list of commands")?;
    writeln!(stdout, "Type 'quit' to exit")?;

    loop {
        match editor.readline(&config.prompt) {
            Ok(line) => {
                if host.handle_line(&line, &mut stdout)? == Flow::Quit {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                host.execute(Command::Quit, &mut stdout)?;
                break;
            }
            Err(e) => return Err(e).context("Failed to read command"),
        }
    }

    if let Some(history) = &config.history_file {
        if let Some(parent) = history.parent() {
            std::fs::create_dir_all(parent).context("Failed to create history directory")?;
        }
        if let Err(e) = editor.save_history(history) {
            warn!("Failed to save history to {}: {}", history.display(), e);
        }
    }

    Ok(())
}

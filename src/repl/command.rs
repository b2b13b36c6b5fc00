use crate::plugins::SlotField;
use std::path::PathBuf;

/// A parsed line of driver input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Nothing typed; prompt again
    Blank,
    Help,
    Quit,
    Show(SlotField),
    Load { path: PathBuf, slot: Option<usize> },
    Unload(usize),
    Run(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Unknown command:  '{0}'")]
    Unknown(String),
    #[error("'show' command requires argument of 'handles', 'pointers', or 'names'")]
    ShowArgument,
    #[error("'load' command requires a file name: load file [slotnum]")]
    MissingPath,
    #[error("'{0}' command requires a slot number")]
    MissingSlot(&'static str),
    #[error("Invalid slot specified: '{0}'")]
    BadSlot(String),
}

impl Command {
    /// Parse one line of input
    ///
    /// # Errors
    /// Returns a [`ParseError`] describing what the user should type instead
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(Self::Blank);
        };

        match verb {
            "help" => Ok(Self::Help),
            "quit" => Ok(Self::Quit),
            "show" => words
                .next()
                .and_then(|field| field.parse().ok())
                .map(Self::Show)
                .ok_or(ParseError::ShowArgument),
            "load" => {
                let path = words.next().ok_or(ParseError::MissingPath)?;
                let slot = words.next().map(parse_slot).transpose()?;
                Ok(Self::Load {
                    path: PathBuf::from(path),
                    slot,
                })
            }
            "unload" => parse_slot(words.next().ok_or(ParseError::MissingSlot("unload"))?)
                .map(Self::Unload),
            "run" => parse_slot(words.next().ok_or(ParseError::MissingSlot("run"))?).map(Self::Run),
            _ => Err(ParseError::Unknown(line.trim().to_string())),
        }
    }
}

fn parse_slot(word: &str) -> Result<usize, ParseError> {
    word.parse()
        .map_err(|_| ParseError::BadSlot(word.to_string()))
}

/// Text printed by `help`
pub const HELP_TEXT: &str = "\
Available Commands:
help          ...                Display this screen
quit          ...                Exit the driver program
show [handles|pointers|names]    Show info of given type for each slot
load file [slotnum] ...          Load a plugin
unload slotnum
run slotnum";

use std::io::{self, ErrorKind};

use console::Term;
use log::debug;

/// Reads one key press without waiting for Enter.
pub trait KeyReader {
    fn read_key(&mut self) -> io::Result<char>;
}

/// Raw single-key input from the attached terminal.
pub struct TerminalKeys {
    term: Term,
}

impl TerminalKeys {
    pub fn new() -> Self {
        Self {
            term: Term::stdout(),
        }
    }
}

impl KeyReader for TerminalKeys {
    fn read_key(&mut self) -> io::Result<char> {
        match self.term.read_char()? {
            '\u{3}' => Err(io::Error::new(ErrorKind::Interrupted, "interrupted")),
            key => Ok(key),
        }
    }
}

/// Raw key input only works on an interactive terminal; piped sessions fall
/// back to reading a whole line.
pub fn detect() -> Option<TerminalKeys> {
    if console::user_attended() {
        debug!("keys: using raw terminal input");
        Some(TerminalKeys::new())
    } else {
        debug!("keys: stdout is not a terminal; reading whole lines");
        None
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    use std::collections::VecDeque;

    use super::*;

    /// Replays a fixed sequence of key presses, then reports closed input.
    #[derive(Default)]
    pub struct ScriptedKeys {
        pub keys: VecDeque<char>,
    }

    impl ScriptedKeys {
        pub fn new(keys: &str) -> Self {
            Self {
                keys: keys.chars().collect(),
            }
        }
    }

    impl KeyReader for ScriptedKeys {
        fn read_key(&mut self) -> io::Result<char> {
            self.keys
                .pop_front()
                .ok_or_else(|| io::Error::new(ErrorKind::UnexpectedEof, "no more keys"))
        }
    }
}

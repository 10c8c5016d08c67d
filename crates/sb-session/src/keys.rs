//! Key translation from terminal events to remote byte sequences

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use sb_core::error::ConfigError;
use sb_core::TerminalSize;

/// Local input delivered to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Key(KeyEvent),
    Paste(String),
    Resize(TerminalSize),
}

impl InputEvent {
    /// Keep the terminal events a session cares about
    pub fn from_terminal(event: Event) -> Option<Self> {
        match event {
            Event::Key(key) => Some(InputEvent::Key(key)),
            Event::Paste(text) => Some(InputEvent::Paste(text)),
            Event::Resize(cols, rows) => Some(InputEvent::Resize(TerminalSize::new(cols, rows))),
            _ => None,
        }
    }
}

/// What to do with a key press
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    Send(Vec<u8>),
    Detach,
    Ignore,
}

/// Control byte produced by Ctrl+`c`
///
/// crossterm reports some control keys with their legacy digit
/// (Ctrl+4 for Ctrl+\ and so on), so those digits map too.
pub fn control_byte(c: char) -> Option<u8> {
    match c {
        'a'..='z' => Some(c as u8 - b'a' + 1),
        'A'..='Z' => Some(c as u8 - b'A' + 1),
        '@' | ' ' | '2' => Some(0x00),
        '[' | '3' => Some(0x1b),
        '\\' | '4' => Some(0x1c),
        ']' | '5' => Some(0x1d),
        '^' | '6' => Some(0x1e),
        '_' | '7' | '/' => Some(0x1f),
        '?' | '8' => Some(0x7f),
        _ => None,
    }
}

/// Convert a key press to the bytes a terminal would send
pub fn key_to_bytes(code: KeyCode, modifiers: KeyModifiers) -> Vec<u8> {
    use KeyCode::*;

    let bytes = match code {
        Char(c) => {
            if modifiers.contains(KeyModifiers::CONTROL) {
                match control_byte(c) {
                    Some(b) => vec![b],
                    None => return Vec::new(),
                }
            } else {
                let mut buf = [0u8; 4];
                c.encode_utf8(&mut buf).as_bytes().to_vec()
            }
        }
        Enter => vec![b'\r'],
        Tab => vec![b'\t'],
        BackTab => vec![0x1b, b'[', b'Z'],
        Backspace => vec![0x7f],
        Esc => vec![0x1b],
        Up => vec![0x1b, b'[', b'A'],
        Down => vec![0x1b, b'[', b'B'],
        Right => vec![0x1b, b'[', b'C'],
        Left => vec![0x1b, b'[', b'D'],
        Home => vec![0x1b, b'[', b'H'],
        End => vec![0x1b, b'[', b'F'],
        PageUp => vec![0x1b, b'[', b'5', b'~'],
        PageDown => vec![0x1b, b'[', b'6', b'~'],
        Insert => vec![0x1b, b'[', b'2', b'~'],
        Delete => vec![0x1b, b'[', b'3', b'~'],
        F(n) => match n {
            1 => vec![0x1b, b'O', b'P'],
            2 => vec![0x1b, b'O', b'Q'],
            3 => vec![0x1b, b'O', b'R'],
            4 => vec![0x1b, b'O', b'S'],
            5 => vec![0x1b, b'[', b'1', b'5', b'~'],
            6 => vec![0x1b, b'[', b'1', b'7', b'~'],
            7 => vec![0x1b, b'[', b'1', b'8', b'~'],
            8 => vec![0x1b, b'[', b'1', b'9', b'~'],
            9 => vec![0x1b, b'[', b'2', b'0', b'~'],
            10 => vec![0x1b, b'[', b'2', b'1', b'~'],
            11 => vec![0x1b, b'[', b'2', b'3', b'~'],
            12 => vec![0x1b, b'[', b'2', b'4', b'~'],
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    if modifiers.contains(KeyModifiers::ALT) {
        let mut prefixed = Vec::with_capacity(bytes.len() + 1);
        prefixed.push(0x1b);
        prefixed.extend(bytes);
        prefixed
    } else {
        bytes
    }
}

/// Key combination that ends a session locally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetachKey {
    byte: u8,
}

impl DetachKey {
    /// Parse `ctrl-<char>` (also `ctrl+<char>`, any case)
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let lower = spec.trim().to_ascii_lowercase();
        let key = lower
            .strip_prefix("ctrl-")
            .or_else(|| lower.strip_prefix("ctrl+"))
            .ok_or_else(|| {
                ConfigError::Invalid(format!("detach key must look like ctrl-<char>: {}", spec))
            })?;

        let mut chars = key.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => control_byte(c)
                .map(|byte| Self { byte })
                .ok_or_else(|| ConfigError::Invalid(format!("no control code for {}", spec))),
            _ => Err(ConfigError::Invalid(format!(
                "detach key must be a single character: {}",
                spec
            ))),
        }
    }

    /// Byte this key produces, never forwarded
    pub fn byte(&self) -> u8 {
        self.byte
    }

    pub fn matches(&self, key: &KeyEvent) -> bool {
        match key.code {
            KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) => {
                control_byte(c) == Some(self.byte)
            }
            _ => false,
        }
    }
}

impl Default for DetachKey {
    fn default() -> Self {
        Self { byte: 0x1c }
    }
}

/// Decide what a key event means for the session
pub fn translate(key: &KeyEvent, detach: &DetachKey) -> KeyAction {
    if key.kind == KeyEventKind::Release {
        return KeyAction::Ignore;
    }
    if detach.matches(key) {
        return KeyAction::Detach;
    }
    let bytes = key_to_bytes(key.code, key.modifiers);
    if bytes.is_empty() {
        KeyAction::Ignore
    } else {
        KeyAction::Send(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> Vec<u8> {
        key_to_bytes(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> Vec<u8> {
        key_to_bytes(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    #[test]
    fn test_basic_keys() {
        assert_eq!(press(KeyCode::Enter), vec![0x0d]);
        assert_eq!(press(KeyCode::Tab), vec![0x09]);
        assert_eq!(press(KeyCode::BackTab), vec![0x1b, 0x5b, 0x5a]);
        assert_eq!(press(KeyCode::Backspace), vec![0x7f]);
        assert_eq!(press(KeyCode::Esc), vec![0x1b]);
        assert_eq!(press(KeyCode::Up), vec![0x1b, 0x5b, 0x41]);
        assert_eq!(press(KeyCode::Down), vec![0x1b, 0x5b, 0x42]);
        assert_eq!(press(KeyCode::Right), vec![0x1b, 0x5b, 0x43]);
        assert_eq!(press(KeyCode::Left), vec![0x1b, 0x5b, 0x44]);
        assert_eq!(press(KeyCode::Home), vec![0x1b, 0x5b, 0x48]);
        assert_eq!(press(KeyCode::End), vec![0x1b, 0x5b, 0x46]);
        assert_eq!(press(KeyCode::PageUp), vec![0x1b, 0x5b, 0x35, 0x7e]);
        assert_eq!(press(KeyCode::PageDown), vec![0x1b, 0x5b, 0x36, 0x7e]);
        assert_eq!(press(KeyCode::Insert), vec![0x1b, 0x5b, 0x32, 0x7e]);
        assert_eq!(press(KeyCode::Delete), vec![0x1b, 0x5b, 0x33, 0x7e]);
    }

    #[test]
    fn test_function_keys() {
        assert_eq!(press(KeyCode::F(1)), vec![0x1b, 0x4f, 0x50]);
        assert_eq!(press(KeyCode::F(4)), vec![0x1b, 0x4f, 0x53]);
        assert_eq!(press(KeyCode::F(5)), b"\x1b[15~".to_vec());
        assert_eq!(press(KeyCode::F(6)), b"\x1b[17~".to_vec());
        assert_eq!(press(KeyCode::F(10)), b"\x1b[21~".to_vec());
        assert_eq!(press(KeyCode::F(11)), b"\x1b[23~".to_vec());
        assert_eq!(press(KeyCode::F(12)), b"\x1b[24~".to_vec());
        assert!(press(KeyCode::F(13)).is_empty());
    }

    #[test]
    fn test_control_keys() {
        assert_eq!(ctrl('a'), vec![0x01]);
        assert_eq!(ctrl('c'), vec![0x03]);
        assert_eq!(ctrl('d'), vec![0x04]);
        assert_eq!(ctrl('z'), vec![0x1a]);
        assert_eq!(ctrl('C'), vec![0x03]);
        assert_eq!(ctrl('@'), vec![0x00]);
        assert_eq!(ctrl('['), vec![0x1b]);
        assert_eq!(ctrl('\\'), vec![0x1c]);
        assert_eq!(ctrl('4'), vec![0x1c]);
        assert_eq!(ctrl(']'), vec![0x1d]);
        assert_eq!(ctrl('^'), vec![0x1e]);
        assert_eq!(ctrl('_'), vec![0x1f]);
        assert!(ctrl('1').is_empty());
    }

    #[test]
    fn test_printable_and_alt() {
        assert_eq!(press(KeyCode::Char('x')), b"x".to_vec());
        assert_eq!(press(KeyCode::Char('é')), "é".as_bytes().to_vec());
        assert_eq!(
            key_to_bytes(KeyCode::Char('b'), KeyModifiers::ALT),
            vec![0x1b, b'b']
        );
        assert_eq!(
            key_to_bytes(KeyCode::Left, KeyModifiers::ALT),
            vec![0x1b, 0x1b, b'[', b'D']
        );
        assert!(press(KeyCode::CapsLock).is_empty());
    }

    #[test]
    fn test_detach_key_parse() {
        assert_eq!(DetachKey::parse("ctrl-\\").unwrap().byte(), 0x1c);
        assert_eq!(DetachKey::parse("Ctrl+]").unwrap().byte(), 0x1d);
        assert_eq!(DetachKey::parse("ctrl-q").unwrap().byte(), 0x11);
        assert!(DetachKey::parse("alt-x").is_err());
        assert!(DetachKey::parse("ctrl-ab").is_err());
        assert!(DetachKey::parse("ctrl-1").is_err());
        assert_eq!(DetachKey::default().byte(), 0x1c);
    }

    #[test]
    fn test_translate() {
        let detach = DetachKey::default();
        let ctrl_backslash = KeyEvent::new(KeyCode::Char('\\'), KeyModifiers::CONTROL);
        assert_eq!(translate(&ctrl_backslash, &detach), KeyAction::Detach);

        let legacy = KeyEvent::new(KeyCode::Char('4'), KeyModifiers::CONTROL);
        assert_eq!(translate(&legacy, &detach), KeyAction::Detach);

        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(translate(&ctrl_c, &detach), KeyAction::Send(vec![0x03]));

        let mut release = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        assert_eq!(translate(&release, &detach), KeyAction::Ignore);

        let caps = KeyEvent::new(KeyCode::CapsLock, KeyModifiers::NONE);
        assert_eq!(translate(&caps, &detach), KeyAction::Ignore);
    }

    #[test]
    fn test_input_event_from_terminal() {
        assert_eq!(
            InputEvent::from_terminal(Event::Resize(120, 40)),
            Some(InputEvent::Resize(TerminalSize::new(120, 40)))
        );
        assert_eq!(
            InputEvent::from_terminal(Event::Paste("ls".into())),
            Some(InputEvent::Paste("ls".into()))
        );
        assert_eq!(InputEvent::from_terminal(Event::FocusGained), None);
    }
}

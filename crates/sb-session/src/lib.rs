//! sb-session: interactive exec sessions bridged to the local terminal
//!
//! [`SessionBridge`] attaches a TTY exec through a pooled client.
//! [`Session::start`] then puts the terminal in raw mode and runs two pumps
//! (local input to the exec, exec output to an [`OutputSink`]) until the
//! user detaches, the remote side closes, or something fails. The captured
//! terminal mode is restored exactly once on every path.

pub mod bridge;
pub mod input;
pub mod keys;
pub mod output;
pub mod terminal;

pub use bridge::{AttachRequest, Resizer, Session, SessionBridge, SessionOutcome, SessionState};
pub use input::{spawn_terminal_reader, terminal_input};
pub use keys::{key_to_bytes, translate, DetachKey, InputEvent, KeyAction};
pub use output::{stdout_sink, ChannelSink, OutputSink, WriterSink};
pub use terminal::{CrosstermTerminal, ModeSnapshot, RestoreGuard, TerminalMode};

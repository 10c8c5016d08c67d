//! Local terminal mode control

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sb_core::TerminalSize;

/// Terminal mode captured before a session takes over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSnapshot {
    pub was_raw: bool,
}

/// Control over the local terminal
pub trait TerminalMode: Send + Sync {
    /// Record the current mode
    fn capture(&self) -> io::Result<ModeSnapshot>;

    /// Switch to raw mode
    fn enter_raw(&self) -> io::Result<()>;

    /// Return to a captured mode
    fn restore(&self, snapshot: ModeSnapshot) -> io::Result<()>;

    /// Current size, when known
    fn size(&self) -> Option<TerminalSize>;
}

/// The process's controlling terminal, through crossterm
#[derive(Debug, Clone, Copy, Default)]
pub struct CrosstermTerminal;

impl TerminalMode for CrosstermTerminal {
    fn capture(&self) -> io::Result<ModeSnapshot> {
        Ok(ModeSnapshot {
            was_raw: crossterm::terminal::is_raw_mode_enabled()?,
        })
    }

    fn enter_raw(&self) -> io::Result<()> {
        crossterm::terminal::enable_raw_mode()
    }

    fn restore(&self, snapshot: ModeSnapshot) -> io::Result<()> {
        if snapshot.was_raw {
            Ok(())
        } else {
            crossterm::terminal::disable_raw_mode()
        }
    }

    fn size(&self) -> Option<TerminalSize> {
        crossterm::terminal::size()
            .ok()
            .map(|(cols, rows)| TerminalSize::new(cols, rows))
    }
}

/// Restores a captured mode exactly once, on [`RestoreGuard::restore`] or drop
pub struct RestoreGuard {
    terminal: Arc<dyn TerminalMode>,
    snapshot: ModeSnapshot,
    restored: AtomicBool,
}

impl RestoreGuard {
    pub fn new(terminal: Arc<dyn TerminalMode>, snapshot: ModeSnapshot) -> Self {
        Self {
            terminal,
            snapshot,
            restored: AtomicBool::new(false),
        }
    }

    /// Restore the mode. Returns false if it was already restored.
    pub fn restore(&self) -> bool {
        if self
            .restored
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if let Err(e) = self.terminal.restore(self.snapshot) {
            tracing::warn!("Failed to restore terminal mode: {}", e);
        }
        true
    }

    pub fn is_restored(&self) -> bool {
        self.restored.load(Ordering::Acquire)
    }
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        self.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingTerminal {
        restores: AtomicUsize,
    }

    impl TerminalMode for CountingTerminal {
        fn capture(&self) -> io::Result<ModeSnapshot> {
            Ok(ModeSnapshot { was_raw: false })
        }

        fn enter_raw(&self) -> io::Result<()> {
            Ok(())
        }

        fn restore(&self, _snapshot: ModeSnapshot) -> io::Result<()> {
            self.restores.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn size(&self) -> Option<TerminalSize> {
            None
        }
    }

    #[test]
    fn test_guard_restores_once() {
        let terminal = Arc::new(CountingTerminal::default());
        let guard = RestoreGuard::new(terminal.clone(), ModeSnapshot { was_raw: false });
        assert!(guard.restore());
        assert!(!guard.restore());
        assert!(guard.is_restored());
        drop(guard);
        assert_eq!(terminal.restores.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_restores_on_drop() {
        let terminal = Arc::new(CountingTerminal::default());
        {
            let _guard = RestoreGuard::new(terminal.clone(), ModeSnapshot { was_raw: false });
        }
        assert_eq!(terminal.restores.load(Ordering::SeqCst), 1);
    }
}

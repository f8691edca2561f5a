use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

/// Where log lines go besides the `/api/logs` broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogConsole {
    Stdout,
    /// Used when stdout carries a protocol, as in MCP mode.
    Stderr,
}

#[derive(Clone)]
pub(crate) struct SseMakeWriter {
    pub sender: tokio::sync::broadcast::Sender<String>,
    pub console: LogConsole,
}

impl<'a> MakeWriter<'a> for SseMakeWriter {
    type Writer = SseWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SseWriter {
            sender: self.sender.clone(),
            console: self.console,
        }
    }
}

pub(crate) struct SseWriter {
    sender: tokio::sync::broadcast::Sender<String>,
    console: LogConsole,
}

impl std::io::Write for SseWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let msg = String::from_utf8_lossy(buf).to_string();
        let _ = self.sender.send(msg); // Ignored if no receivers
        match self.console {
            LogConsole::Stdout => std::io::stdout().write_all(buf)?,
            LogConsole::Stderr => std::io::stderr().write_all(buf)?,
        }
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        match self.console {
            LogConsole::Stdout => std::io::stdout().flush(),
            LogConsole::Stderr => std::io::stderr().flush(),
        }
    }
}

/// Installs the global fmt subscriber and returns the sender feeding `/api/logs`.
pub(crate) fn init(level: Level, console: LogConsole) -> tokio::sync::broadcast::Sender<String> {
    let (log_tx, _) = tokio::sync::broadcast::channel(256);
    let make_writer = SseMakeWriter {
        sender: log_tx.clone(),
        console,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_ansi(console == LogConsole::Stdout)
        .with_writer(make_writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
    log_tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn writer_broadcasts_every_line() {
        let (tx, mut rx) = tokio::sync::broadcast::channel(4);
        let make = SseMakeWriter {
            sender: tx,
            console: LogConsole::Stderr,
        };
        let mut writer = make.make_writer();
        assert_eq!(writer.write(b"job queued\n").unwrap(), 11);
        writer.flush().unwrap();
        assert_eq!(rx.try_recv().unwrap(), "job queued\n");
    }
}

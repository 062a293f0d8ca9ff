use std::fmt::Display;
use std::io;
use std::sync::Arc;

use tracing::level_filters::LevelFilter;

use crate::env::{Env, Stream};

mod color {
    pub const BLUE: u8 = 34;
    pub const YELLOW: u8 = 33;
    pub const RED: u8 = 31;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn color(self) -> u8 {
        match self {
            Self::Info => color::BLUE,
            Self::Warning => color::YELLOW,
            Self::Error => color::RED,
        }
    }

    fn text(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }

    /// The level as shown in front of a message.
    pub fn marker(self, colored: bool) -> String {
        if colored {
            format!("\x1B[{}m{}\x1B[0m", self.color(), self.text())
        } else {
            self.text().into()
        }
    }
}

//------------ Logger --------------------------------------------------------

/// Where the outcome of signing passes is reported.
///
/// Every signer gets its own clone; all clones write to the same stream.
#[derive(Clone)]
pub struct Logger {
    prog: Arc<str>,
    stream: Arc<Stream<Box<dyn io::Write + Send>>>,
}

impl Logger {
    /// Create a logger writing to the stderr of `env`.
    pub fn new(env: &impl Env) -> Self {
        Self {
            prog: env.program_name().into(),
            stream: Arc::new(env.stderr().boxed()),
        }
    }

    pub fn log(&self, level: LogLevel, text: impl Display) {
        let prog = &self.prog;
        let marker = level.marker(self.stream.is_terminal());
        writeln!(self.stream, "[{prog}] {marker}: {text}");
    }

    pub fn info(&self, text: impl Display) {
        self.log(LogLevel::Info, text)
    }

    pub fn warn(&self, text: impl Display) {
        self.log(LogLevel::Warning, text)
    }
}

//------------ Tracing -------------------------------------------------------

/// Install a `tracing` subscriber that writes to the stderr of `env`.
///
/// `verbosity` counts the `-v` flags: none shows warnings, one adds info,
/// two add debug and three or more everything. Installing twice is a no-op.
pub fn init_tracing(env: &impl Env, verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let stderr = env.stderr();
    let ansi = stderr.is_terminal();
    let _ = tracing_subscriber::fmt()
        .with_writer(stderr)
        .with_ansi(ansi)
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::fake::{FakeCmd, FakeEnv};

    #[test]
    fn logger_prefixes_program_and_level() {
        let env = FakeEnv::from(FakeCmd::new(["/usr/sbin/zonesign", "run"]));
        let logger = Logger::new(&env);
        logger.info("Signed \"example.com\"");
        logger.clone().warn("Failed to sign \"example.com\"");
        assert_eq!(
            env.get_stderr(),
            "[zonesign] INFO: Signed \"example.com\"\n\
             [zonesign] WARNING: Failed to sign \"example.com\"\n"
        );
    }
}

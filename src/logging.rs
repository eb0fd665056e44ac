use std::fmt::Display;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};

use chrono::{DateTime, Local};
use env_logger::{Builder, Env, Target};
use log::{Level, info};

use crate::config::LogConfig;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TEXT_BORDER_WIDTH: usize = 78;
const FILTER_VAR: &str = "RUST_LOG";

/// Tees formatted records to the session log file and/or stderr.
struct SessionSink {
    file: Option<File>,
    console: bool,
}

impl Write for SessionSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(buf)?;
        }
        if self.console {
            io::stderr().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        if self.console {
            io::stderr().flush()?;
        }
        Ok(())
    }
}

impl SessionSink {
    /// Open the destinations `config.sink` selects. The log file is appended to.
    fn open(config: &LogConfig) -> Result<Self, String> {
        let file = if config.sink.writes_file() {
            if let Some(parent) = config.file.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("failed to create log dir {}: {e}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.file)
                .map_err(|e| format!("failed to open log file {}: {e}", config.file.display()))?;
            Some(file)
        } else {
            None
        };
        Ok(Self {
            file,
            console: config.sink.writes_console(),
        })
    }
}

fn log_env<'a>(filter_var: &'a str, level: &'a str) -> Env<'a> {
    Env::default().filter(filter_var).default_filter_or(level)
}

/// Install the global logger. `RUST_LOG` takes precedence over the configured level.
pub fn init(config: &LogConfig) -> Result<(), String> {
    let sink = SessionSink::open(config)?;

    Builder::from_env(log_env(FILTER_VAR, config.level.as_str()))
        .format(|buf, record| {
            writeln!(
                buf,
                "{}",
                format_line(Local::now(), record.level(), record.args())
            )
        })
        .target(Target::Pipe(Box::new(sink)))
        .try_init()
        .map_err(|e| format!("failed to initialise logging: {e}"))
}

pub fn format_line(at: DateTime<Local>, level: Level, message: &dyn Display) -> String {
    format!("[ {} - {} ] : {}", at.format(DATE_FORMAT), level, message)
}

pub fn text_border() -> String {
    "=".repeat(TEXT_BORDER_WIDTH)
}

pub fn session_start() {
    info!(
        "Welcome to the Valheim BepInEx Patcher v{}!\n>> Session Start: {}\n",
        env!("CARGO_PKG_VERSION"),
        Local::now().format(DATE_FORMAT)
    );
}

pub fn session_end() {
    info!("Exiting patcher...\n>> End of log...\n\n{}\n", text_border());
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use chrono::TimeZone;
    use log::LevelFilter;

    use super::*;
    use crate::config::LogSink;

    fn log_config(sink: LogSink, file: &Path) -> LogConfig {
        LogConfig {
            sink,
            file: file.to_path_buf(),
            ..LogConfig::default()
        }
    }

    #[test]
    fn formats_timestamp_level_and_message() {
        let at = Local.with_ymd_and_hms(2022, 3, 24, 9, 5, 0).unwrap();
        assert_eq!(
            format_line(at, Level::Warn, &"Invalid Input: \"7\""),
            "[ 2022-03-24 09:05:00 - WARN ] : Invalid Input: \"7\""
        );
    }

    #[test]
    fn border_is_a_single_rule() {
        let border = text_border();
        assert_eq!(border.len(), TEXT_BORDER_WIDTH);
        assert!(border.chars().all(|c| c == '='));
    }

    #[test]
    fn sink_appends_to_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patcher.log");
        fs::write(&path, "previous session\n").unwrap();

        let file = OpenOptions::new().append(true).open(&path).unwrap();
        let mut sink = SessionSink {
            file: Some(file),
            console: false,
        };
        sink.write_all(b"next session\n").unwrap();
        sink.flush().unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "previous session\nnext session\n"
        );
    }

    #[test]
    fn sink_selects_console_file_or_both() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("patcher.log");

        let console = SessionSink::open(&log_config(LogSink::Console, &path)).unwrap();
        assert!(console.file.is_none());
        assert!(console.console);
        assert!(!path.exists());

        let file = SessionSink::open(&log_config(LogSink::File, &path)).unwrap();
        assert!(file.file.is_some());
        assert!(!file.console);
        assert!(path.is_file());

        let mut both = SessionSink::open(&log_config(LogSink::Both, &path)).unwrap();
        assert!(both.console);
        both.write_all(b"teed line\n").unwrap();
        both.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "teed line\n");
    }

    #[test]
    fn filter_variable_overrides_configured_level() {
        let configured = Builder::from_env(log_env("BEPINEX_PATCHER_UNSET_LOG", "warn")).build();
        assert_eq!(configured.filter(), LevelFilter::Warn);

        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("BEPINEX_PATCHER_TEST_LOG", "debug") };
        let overridden = Builder::from_env(log_env("BEPINEX_PATCHER_TEST_LOG", "warn")).build();
        assert_eq!(overridden.filter(), LevelFilter::Debug);
    }
}

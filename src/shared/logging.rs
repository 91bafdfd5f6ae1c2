use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Once;

use chrono::Utc;

use crate::shared::config::{self, LogFormat, LogMode};

static INIT: Once = Once::new();

const SERVICE_NAME: &str = "alert-call-bridge";

/// Installs the global logger once, following `config::logging_config()`.
///
/// Output is JSON or plain text, to stdout or to a file under `LOG_DIR`.
/// Problems opening the log file fall back to stdout and are reported as
/// warnings once the logger is up. Safe to call more than once.
pub fn init() {
    INIT.call_once(|| {
        let cfg = config::logging_config().clone();
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

        let format = cfg.format;
        builder.format(move |buf, record| {
            let ts = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
            let line = render_line(
                &format,
                &ts,
                &record.level().to_string(),
                record.target(),
                &record.args().to_string(),
            );
            writeln!(buf, "{}", line)
        });

        let mut init_warnings = Vec::new();
        match (cfg.mode, cfg.dir.as_deref()) {
            (LogMode::File, Some(dir)) => match open_log_file(dir, &cfg.file_name) {
                Ok(file) => {
                    builder.target(env_logger::Target::Pipe(Box::new(file)));
                }
                Err(warning) => {
                    init_warnings.push(warning);
                    builder.target(env_logger::Target::Stdout);
                }
            },
            _ => {
                builder.target(env_logger::Target::Stdout);
            }
        }

        let _ = builder.try_init();
        for warning in init_warnings {
            log::warn!("{}", warning);
        }
    });
}

fn open_log_file(dir: &str, file_name: &str) -> Result<std::fs::File, String> {
    std::fs::create_dir_all(dir)
        .map_err(|err| format!("[logging] failed to create log dir {}: {}", dir, err))?;
    let path = Path::new(dir).join(file_name);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| format!("[logging] failed to open log file ({}): {}", path.display(), err))
}

fn render_line(format: &LogFormat, ts: &str, level: &str, target: &str, msg: &str) -> String {
    match format {
        LogFormat::Json => serde_json::json!({
            "ts": ts,
            "level": level,
            "service": SERVICE_NAME,
            "target": target,
            "msg": msg,
        })
        .to_string(),
        LogFormat::Text => format!("{} {} {} {}", ts, level, target, msg),
    }
}

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use crate::cli::LogFormat;

/// Build the effective filter: `RUST_LOG` when set and valid, otherwise `level`,
/// otherwise `info`.
pub fn env_filter(level: &str) -> EnvFilter {
    let from_env = std::env::var("RUST_LOG")
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok());

    from_env
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::default().add_directive(LevelFilter::INFO.into()))
}

/// Install the global subscriber. Logs go to stderr so stdout stays clean for
/// `listen --json`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(level: &str, format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_then_info_fallback() {
        // RUST_LOG wins when set, so there is nothing to check in that case.
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(env_filter("debug").max_level_hint(), Some(LevelFilter::DEBUG));
            assert_eq!(env_filter("foo=bogus").max_level_hint(), Some(LevelFilter::INFO));
        }
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init("info", LogFormat::Text);
        init("debug", LogFormat::Json);
    }
}

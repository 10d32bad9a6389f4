//! stderr logging through `tracing-subscriber`.
//!
//! `RUST_LOG` wins when set; otherwise the workspace crates log at the level
//! picked by `-v` and everything else stays at `warn`.

use std::io;

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const WORKSPACE_TARGETS: [&str; 4] = [
    "kotoba_rs",
    "kotoba_engine",
    "kotoba_contracts",
    "kotoba_canvas",
];

/// 0 → info, 1 (`-v`) → debug, 2+ (`-vv`) → trace.
pub fn level_for_verbosity(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

pub fn init_logging(verbosity: u8) -> Result<()> {
    let layer = fmt::layer()
        .compact()
        .with_writer(io::stderr)
        .with_target(false)
        .without_time();
    tracing_subscriber::registry()
        .with(build_env_filter(level_for_verbosity(verbosity)))
        .with(layer)
        .try_init()?;
    Ok(())
}

fn default_directives(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    std::iter::once("warn".to_string())
        .chain(
            WORKSPACE_TARGETS
                .iter()
                .map(|target| format!("{target}={level}")),
        )
        .collect::<Vec<_>>()
        .join(",")
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::{default_directives, level_for_verbosity};

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_for_verbosity(0), Level::INFO);
        assert_eq!(level_for_verbosity(1), Level::DEBUG);
        assert_eq!(level_for_verbosity(5), Level::TRACE);
    }

    #[test]
    fn default_filter_keeps_dependencies_quiet() {
        let directives = default_directives(Level::DEBUG);
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("kotoba_engine=debug"));
    }
}

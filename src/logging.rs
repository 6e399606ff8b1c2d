use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Filter used when neither `RUST_LOG` nor `-v` asks for anything else.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Map a `-v` count onto a filter directive.
pub fn filter_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => DEFAULT_FILTER,
        1 => "info,csv_normalizer=debug,sqlx=warn",
        _ => "debug,csv_normalizer=trace",
    }
}

/// Install the global fmt subscriber. `default_filter` applies only when
/// `RUST_LOG` is unset, so operators can always narrow output from the shell.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .compact()
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_escalates_filter() {
        assert_eq!(filter_for_verbosity(0), DEFAULT_FILTER);
        assert!(filter_for_verbosity(1).contains("csv_normalizer=debug"));
        assert!(filter_for_verbosity(7).contains("csv_normalizer=trace"));
    }
}

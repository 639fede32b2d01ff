use std::process::ExitCode;

use feed_consolidator::config::PipelineConfig;
use feed_consolidator::pipeline::Pipeline;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Ok(input) = std::env::var("FEED_INPUT") else {
        error!("FEED_INPUT not set");
        return ExitCode::FAILURE;
    };

    let mut config = PipelineConfig::default();
    if let Ok(dir) = std::env::var("FEED_IDENTITY_DIR") {
        config.identity_dir = dir.into();
    }

    let pipeline = Pipeline::new(config);
    match pipeline.run_file(&input) {
        Ok(output) => {
            info!(
                input = %input,
                groups = output.groups.len(),
                calendars = output.calendars.len(),
                runs = output.run_calendars.len(),
                reused_ids = output.identity_stats.reused,
                new_ids = output.identity_stats.new,
                temporary_ids = output.identity_stats.temporary,
                "feed consolidated"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(input = %input, error = %e, "feed consolidation failed");
            ExitCode::FAILURE
        }
    }
}

use std::error::Error;

use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    let Some(cli) = mhm_aggregate::cli::parse(std::env::args().skip(1))? else {
        return Ok(());
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();

    mhm_aggregate::cli::execute(cli)?;
    Ok(())
}

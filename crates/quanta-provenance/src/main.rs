use quanta_provenance::{cli, logging};

fn main() -> anyhow::Result<()> {
    let matches = cli::command().get_matches();
    let config = cli::load_config(&matches)?;
    logging::init(&config.logging);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = cli::run(&matches, &config, &mut out) {
        tracing::error!(error = %e, "command failed");
        return Err(e);
    }
    Ok(())
}

use anyhow::Result;
use clap::Parser;

use smtptest::args::Args;
use smtptest::config::Config;

fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(args)?;

    smtptest::logging::init(config.verbose, config.debug_level);

    let stdout = std::io::stdout();
    let report = smtptest::run(&config, &mut stdout.lock())?;

    tracing::info!(
        "sent {} message(s) to {}:{}",
        report.sent.len(),
        config.connection.server,
        config.connection.port
    );

    Ok(())
}

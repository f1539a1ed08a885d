use apiconform::app::Application;
use apiconform::cli::{Cli, Commands};
use clap::Parser;
use std::process;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.debug);

    let result = match cli.command {
        Commands::Config { files } => run(&files).await,
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(files: &[std::path::PathBuf]) -> anyhow::Result<()> {
    let app = Application::from_config_files(files).await?;
    app.run_and_report().await?;
    Ok(())
}

/// Initialize logging; `--debug` forces debug level over `RUST_LOG`
fn init_logging(debug: bool) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

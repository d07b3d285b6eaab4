use clap::Parser;
use forge_admin_rust::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_format = forge_admin_rust::cli::OutputFormat::from_cli(&cli);

    if let Err(e) = forge_admin_rust::cli::run(cli).await {
        let message = match std::env::var("CLI_VERBOSE").as_deref() {
            Ok("true") | Ok("1") => format!("{e:?}"),
            _ => e.to_string(),
        };
        forge_admin_rust::cli::output::output_error(&output_format, &message)?;
        std::process::exit(1);
    }

    Ok(())
}

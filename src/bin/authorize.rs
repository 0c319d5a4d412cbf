use gcal_relay::config::ManualAuthMode;
use gcal_relay::startup;

#[tokio::main]
async fn main() -> miette::Result<()> {
    startup::init_logging()?;

    // Load configuration
    let config = startup::load_config()?;

    // The operator is at the terminal, so the manual fallback reads the code from stdin
    let credentials = startup::credential_manager(&config, ManualAuthMode::Prompt)?;
    let credential = credentials.obtain().await?;

    println!(
        "Credential saved to {}",
        credentials.store().path().display()
    );
    match credential.expires_at {
        Some(expires_at) => println!("Access token valid until {}", expires_at),
        None => println!("Access token does not expire"),
    }

    Ok(())
}

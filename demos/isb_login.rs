// A two-step login against an identity service broker.
//
//   cargo run --example isb_login -- begin
//   cargo run --example isb_login -- finish 'state=...&code=...'
//
// `begin` prints the authorization redirect and stores nonce and state in a file,
// `finish` resumes from that file with the query string the broker sent to the callback.
use nila_isb::prelude::*;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct DemoConfig {
    #[serde(flatten)]
    settings: Settings,
    signing_key_path: PathBuf,
    encryption_key_path: PathBuf,
    pending_path: PathBuf,
}

type DemoResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> DemoResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nila_isb=debug")))
        .init();

    // --- Load Configuration from YAML ---
    let config_path = std::env::var("ISB_LOGIN_CONFIG").unwrap_or_else(|_| "demos/isb_login.yaml".to_string());
    let config_str = fs::read_to_string(&config_path)
        .map_err(|e| format!("Failed to read config file {config_path}: {e}"))?;
    let demo: DemoConfig = serde_yaml::from_str(&config_str)
        .map_err(|e| format!("Failed to parse YAML config from {config_path}: {e}"))?;

    let keys = ClientKeys::from_pem_files(&demo.signing_key_path, &demo.encryption_key_path)?;
    let config = Config::try_from(demo.settings)?;
    let relying_party = RelyingParty::new(config, keys)?;

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("begin") => {
            let pending = relying_party.begin_auth()?;
            if let Some(parent) = demo.pending_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&demo.pending_path, serde_json::to_vec_pretty(&pending)?)?;

            println!("Open this URL in a browser:\n{}", pending.redirect_url);
            println!("Pending request saved to {}", demo.pending_path.display());
        }
        Some("finish") => {
            let query = args.next().ok_or("finish needs the callback query string")?;
            let pending: PendingAuth = serde_json::from_slice(&fs::read(&demo.pending_path)?)?;
            let params = CallbackParams::from_query(&query)?;

            let identity = relying_party.handle_callback(&params, &pending).await?;
            fs::remove_file(&demo.pending_path)?;

            println!("Identified: {} ({})", identity.name, identity.birthdate);
            println!("Personal identity code: {}", identity.personal_identity_code);
        }
        _ => {
            eprintln!("usage: isb_login begin | isb_login finish '<callback query>'");
            std::process::exit(2);
        }
    }
    Ok(())
}

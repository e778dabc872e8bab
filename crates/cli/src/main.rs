use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tuba_api::{ACCESS_TOKEN_ENV, WorkflowClient, WorkflowConfig};
use tuba_mcp::{DEFAULT_HTTP_BIND_ADDRESS, HttpEndpoint, resolve_bind_address, serve_stdio};

/// MCP server exposing the Tuba workflow builder as tools.
#[derive(Debug, Parser)]
#[command(name = "tuba-workflow", version, about)]
struct Cli {
    /// Load environment variables from this file instead of `./.env`.
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Override the workflow API base URL.
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Directory where `result.zip` archives are written.
    #[arg(long, value_name = "DIR")]
    result_dir: Option<PathBuf>,

    /// Serve streamable HTTP on a loopback address instead of stdio.
    #[arg(long, value_name = "ADDR", num_args = 0..=1, default_missing_value = DEFAULT_HTTP_BIND_ADDRESS)]
    http: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded_env_file = load_env_file(cli.env_file.as_deref())?;
    init_tracing();
    if let Some(path) = loaded_env_file {
        info!(path = %path.display(), "loaded environment file");
    }

    let config = build_config(&cli)?;
    if !config.has_access_token() {
        warn!("{ACCESS_TOKEN_ENV} is not set; every tool will report that authentication is required");
    }
    info!(base_url = config.base_url(), result_dir = %config.result_dir().display(), "workflow client configured");
    let client = Arc::new(WorkflowClient::new(config).context("failed to build workflow client")?);

    match cli.http.as_deref() {
        Some(address) => serve_http(address, client).await,
        None => serve_stdio(client).await,
    }
}

/// Install the stderr subscriber; stdout belongs to the stdio transport.
fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load `.env` style variables. An explicit path must exist; the default
/// `./.env` is optional.
fn load_env_file(path: Option<&std::path::Path>) -> Result<Option<PathBuf>> {
    match path {
        Some(path) => {
            dotenvy::from_path(path).with_context(|| format!("failed to load environment file {}", path.display()))?;
            Ok(Some(path.to_path_buf()))
        }
        None => Ok(dotenvy::dotenv().ok()),
    }
}

fn build_config(cli: &Cli) -> Result<WorkflowConfig> {
    let mut config = WorkflowConfig::from_env().context("invalid workflow configuration")?;
    if let Some(api_url) = &cli.api_url {
        config = config.with_base_url(api_url.as_str()).context("invalid --api-url")?;
    }
    if let Some(result_dir) = &cli.result_dir {
        config = config.with_result_dir(result_dir.clone());
    }
    Ok(config)
}

async fn serve_http(address: &str, client: Arc<WorkflowClient>) -> Result<()> {
    let endpoint = HttpEndpoint::bind(resolve_bind_address(Some(address))?).await?;
    eprintln!("MCP endpoint: {}", endpoint.url());
    endpoint
        .serve(client, async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(%error, "failed to listen for ctrl-c; shutting down");
            }
            info!("shutdown requested");
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn http_flag_value_is_optional() {
        let bare = Cli::parse_from(["tuba-workflow", "--http"]);
        assert_eq!(bare.http.as_deref(), Some(DEFAULT_HTTP_BIND_ADDRESS));

        let explicit = Cli::parse_from(["tuba-workflow", "--http", "127.0.0.1:8811"]);
        assert_eq!(explicit.http.as_deref(), Some("127.0.0.1:8811"));

        let stdio = Cli::parse_from(["tuba-workflow"]);
        assert!(stdio.http.is_none());
    }

    #[test]
    fn flags_override_environment() {
        temp_env::with_vars(
            [
                ("TUBA_WORKFLOW_API_URL", Some("https://staging.tuba.ai/api")),
                ("TUBA_WORKFLOW_RESULT_DIR", Some("/tmp/from-env")),
                (ACCESS_TOKEN_ENV, Some("token")),
            ],
            || {
                let cli = Cli::parse_from(["tuba-workflow", "--api-url", "http://localhost:9000/", "--result-dir", "/tmp/out"]);
                let config = build_config(&cli).unwrap();
                assert_eq!(config.base_url(), "http://localhost:9000");
                assert_eq!(config.result_dir(), &PathBuf::from("/tmp/out"));
                assert_eq!(config.access_token(), Some("token"));
            },
        );
    }

    #[test]
    fn environment_applies_without_flags() {
        temp_env::with_vars(
            [
                ("TUBA_WORKFLOW_API_URL", Some("http://127.0.0.1:8080")),
                ("TUBA_WORKFLOW_RESULT_DIR", None::<&str>),
                (ACCESS_TOKEN_ENV, None),
            ],
            || {
                let config = build_config(&Cli::parse_from(["tuba-workflow"])).unwrap();
                assert_eq!(config.base_url(), "http://127.0.0.1:8080");
                assert!(!config.has_access_token());
            },
        );
    }

    #[test]
    fn explicit_env_file_must_exist() {
        let directory = tempfile::tempdir().unwrap();
        assert!(load_env_file(Some(&directory.path().join("missing.env"))).is_err());

        let env_path = directory.path().join("tuba.env");
        writeln!(std::fs::File::create(&env_path).unwrap(), "TUBA_WORKFLOW_CLI_TEST_MARKER=loaded").unwrap();
        assert_eq!(load_env_file(Some(&env_path)).unwrap(), Some(env_path.clone()));
        assert_eq!(std::env::var("TUBA_WORKFLOW_CLI_TEST_MARKER").as_deref(), Ok("loaded"));
    }
}

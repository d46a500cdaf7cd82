use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use crate::client::{AppSyncClient, ClientMode, default_endpoint};
use crate::config::{DEFAULT_PROFILE, Env, SharedConfig};
use crate::credentials::{ProviderContext, resolve_chain};
use crate::logging;
use crate::sigv4::Credentials;
use crate::types::ApiId;
use crate::upload::{UploadRequest, upload_resolver};

mod render;
use render::{render_resolver, to_pretty_json};

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "appsync-resolver-uploader")]
#[command(
    about = "Create or update an AWS AppSync resolver from local mapping templates",
    version
)]
pub struct Cli {
    /// The AWS IAM Access Key ID to use (default: the AWS credential chain)
    #[arg(long)]
    pub aws_access_key_id: Option<String>,

    /// The AWS IAM Secret Access Key to use
    #[arg(long)]
    pub aws_secret_access_key: Option<String>,

    #[arg(long)]
    pub aws_session_token: Option<String>,

    /// The AWS Region of the AppSync API to update
    #[arg(long, env = "AWS_REGION")]
    pub aws_region: Option<String>,

    /// Shared credentials/config profile used when no keys are given
    #[arg(long, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    #[arg(long, env = "APPSYNC_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,

    /// The API Id of the AppSync API to update
    #[arg(long)]
    pub api_id: String,

    /// The name of the GraphQL Type
    #[arg(long)]
    pub type_name: String,

    /// The name of the GraphQL field to attach the resolver to
    #[arg(long)]
    pub field_name: String,

    /// The AppSync data source the resolver invokes (unit resolvers only)
    #[arg(long)]
    pub datasource_name: Option<String>,

    /// The request mapping VTL file to upload (optional for Lambda data sources)
    #[arg(long)]
    pub request_mapping_template: Option<PathBuf>,

    /// The response mapping VTL file to upload (optional for Lambda data sources)
    #[arg(long)]
    pub response_mapping_template: Option<PathBuf>,

    /// Functions for a pipeline resolver: name,dataSourceName;name,dataSourceName
    #[arg(long)]
    pub pipeline_config: Option<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub output: OutputFormat,

    #[arg(long, value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,

    /// Resolve everything but skip the create/update call.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, env = "APPSYNC_FIXTURES_DIR", hide = true)]
    pub fixtures_dir: Option<PathBuf>,
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    logging::init(cli.verbose);
    install_interrupt_handler();

    let result = run_upload(&cli).inspect_err(|e| {
        eprintln!("Upload FAILED: {e:#}");
        println!();
    });
    tracing::info!("terminating");
    result
}

fn install_interrupt_handler() {
    let installed = ctrlc::set_handler(|| {
        eprintln!("Service interrupted");
        tracing::info!("terminating");
        std::process::exit(0);
    });
    if let Err(e) = installed {
        tracing::debug!(error = %e, "interrupt handler not installed");
    }
}

fn run_upload(cli: &Cli) -> anyhow::Result<()> {
    let client = AppSyncClient::new(client_mode(cli)?);
    let req = UploadRequest {
        api_id: ApiId::from(cli.api_id.as_str()),
        type_name: cli.type_name.clone(),
        field_name: cli.field_name.clone(),
        data_source_name: cli.datasource_name.clone(),
        request_mapping_template: cli.request_mapping_template.clone(),
        response_mapping_template: cli.response_mapping_template.clone(),
        pipeline_config: cli.pipeline_config.clone(),
        dry_run: cli.dry_run,
    };

    let outcome = upload_resolver(&client, &req)?;
    match outcome.response {
        None => {
            println!(
                "dry-run: would {} resolver {}.{}",
                outcome.action.verb(),
                cli.type_name,
                cli.field_name
            );
            println!("{}", to_pretty_json(&serde_json::to_value(&outcome.input)?)?);
            Ok(())
        }
        Some(response) => {
            println!("Resolver upload complete");
            render_resolver(cli, &response)
        }
    }
}

fn client_mode(cli: &Cli) -> anyhow::Result<ClientMode> {
    if let Some(dir) = &cli.fixtures_dir {
        return Ok(ClientMode::Fixtures(dir.clone()));
    }

    let profile = cli
        .profile
        .clone()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string());
    let env = Env::from_process();
    let shared = SharedConfig::load(&env)?;
    let region = resolve_region(cli, &env, &shared, &profile)?;
    let credentials = resolve_credentials(
        cli,
        &ProviderContext {
            env: &env,
            shared: &shared,
            region: &region,
        },
        &profile,
    )?;
    let endpoint = cli
        .endpoint_url
        .clone()
        .unwrap_or_else(|| default_endpoint(&region));
    tracing::debug!(%region, %endpoint, %profile, "client configured");

    Ok(ClientMode::Http {
        endpoint,
        region,
        credentials,
    })
}

fn resolve_region(
    cli: &Cli,
    env: &Env,
    shared: &SharedConfig,
    profile: &str,
) -> anyhow::Result<String> {
    if let Some(r) = cli.aws_region.clone().filter(|r| !r.trim().is_empty()) {
        return Ok(r);
    }
    if let Some(r) = env.get("AWS_DEFAULT_REGION") {
        return Ok(r.to_string());
    }
    shared.region(profile).ok_or_else(|| {
        anyhow::anyhow!("no AWS region configured; pass --aws-region or set AWS_REGION")
    })
}

/// Explicit flags first; without them, the default AWS credential chain.
fn resolve_credentials(
    cli: &Cli,
    ctx: &ProviderContext<'_>,
    profile: &str,
) -> anyhow::Result<Credentials> {
    match (&cli.aws_access_key_id, &cli.aws_secret_access_key) {
        (Some(id), Some(secret)) => Ok(Credentials {
            access_key_id: id.clone(),
            secret_access_key: secret.clone(),
            session_token: cli.aws_session_token.clone(),
        }),
        (Some(id), None) => {
            if !std::io::stdin().is_terminal() {
                anyhow::bail!("--aws-secret-access-key is required with --aws-access-key-id");
            }
            let secret = rpassword::prompt_password("AWS Secret Access Key: ")?;
            if secret.trim().is_empty() {
                anyhow::bail!("empty secret access key");
            }
            Ok(Credentials {
                access_key_id: id.clone(),
                secret_access_key: secret.trim().to_string(),
                session_token: cli.aws_session_token.clone(),
            })
        }
        (None, Some(_)) => {
            anyhow::bail!("--aws-access-key-id is required with --aws-secret-access-key")
        }
        (None, None) => resolve_chain(ctx, profile),
    }
}

fn should_color(cli: &Cli) -> bool {
    match cli.color {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => std::io::stdout().is_terminal(),
    }
}

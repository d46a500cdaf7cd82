use std::time::Duration;

use anyhow::Context;
use chrono::Utc;

use crate::config::{Env, SharedConfig};
use crate::sigv4::Credentials;

mod container;
mod imds;
mod process;
mod profile;
mod sso;
mod sts;

/// Everything a credential provider may consult.
#[derive(Debug, Clone, Copy)]
pub struct ProviderContext<'a> {
    pub env: &'a Env,
    pub shared: &'a SharedConfig,
    /// Region of the AppSync API; STS is called in the same region.
    pub region: &'a str,
}

type Provider<'a> = &'a dyn Fn() -> anyhow::Result<Option<Credentials>>;

/// Walks the default provider chain and returns the first credentials found.
///
/// A provider that is not configured is skipped. A provider that is configured but fails
/// stops the chain with its error.
pub fn resolve_chain(ctx: &ProviderContext<'_>, profile: &str) -> anyhow::Result<Credentials> {
    let providers: [(&str, Provider<'_>); 5] = [
        ("environment", &|| from_env(ctx.env)),
        ("profile", &|| profile::credentials(ctx, profile)),
        ("web identity", &|| sts::web_identity_from_env(ctx)),
        ("container", &|| container::credentials(ctx.env)),
        ("instance metadata", &|| imds::credentials(ctx.env)),
    ];

    for (source, provider) in providers {
        let found = provider().with_context(|| format!("failed to load {source} credentials"))?;
        if let Some(credentials) = found {
            tracing::debug!(source, access_key_id = %credentials.access_key_id, "credentials resolved");
            return Ok(credentials);
        }
        tracing::trace!(source, "no credentials");
    }

    anyhow::bail!(
        "no AWS credentials found; pass --aws-access-key-id/--aws-secret-access-key \
         or add profile {:?} to {}",
        profile,
        ctx.env.credentials_path().display()
    )
}

/// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`. A secret without a key id is ignored.
pub fn from_env(env: &Env) -> anyhow::Result<Option<Credentials>> {
    let Some(access_key_id) = env.get("AWS_ACCESS_KEY_ID") else {
        if env.get("AWS_SECRET_ACCESS_KEY").is_some() {
            tracing::debug!("AWS_SECRET_ACCESS_KEY is set without AWS_ACCESS_KEY_ID; ignoring it");
        }
        return Ok(None);
    };
    let Some(secret_access_key) = env.get("AWS_SECRET_ACCESS_KEY") else {
        anyhow::bail!("AWS_ACCESS_KEY_ID is set but AWS_SECRET_ACCESS_KEY is not");
    };
    Ok(Some(Credentials {
        access_key_id: access_key_id.to_string(),
        secret_access_key: secret_access_key.to_string(),
        session_token: env
            .get("AWS_SESSION_TOKEN")
            .or_else(|| env.get("AWS_SECURITY_TOKEN"))
            .map(str::to_string),
    }))
}

fn http(timeout: Duration) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder().timeout(timeout).build()?)
}

fn default_session_name() -> String {
    format!("appsync-resolver-uploader-{}", Utc::now().timestamp())
}

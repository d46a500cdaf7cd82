use std::fs;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use form_urlencoded::Serializer;
use serde::Deserialize;
use serde_json::{Value, json};
use sha1::{Digest, Sha1};

use crate::client::ServiceError;
use crate::config::Profile;
use crate::sigv4::Credentials;

use super::{ProviderContext, http};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedToken {
    access_token: String,
    expires_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetRoleCredentialsResponse {
    role_credentials: RoleCredentials,
}

/// Where the token for an SSO login lives and which portal hands out role credentials.
#[derive(Debug, PartialEq, Eq)]
struct SsoTarget {
    cache_key: String,
    region: String,
    account_id: String,
    role_name: String,
}

fn target(ctx: &ProviderContext<'_>, profile: &Profile, name: &str) -> anyhow::Result<Option<SsoTarget>> {
    let required = |p: &Profile, key: &str, section: &str| {
        p.get(key)
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("{section} is missing {key}"))
    };
    let section = format!("profile {name:?}");

    let (cache_key, region) = if let Some(session) = profile.get("sso_session") {
        let session_section = format!("[sso-session {session}]");
        let settings = ctx
            .shared
            .sso_session(session)
            .ok_or_else(|| anyhow::anyhow!("{section} refers to missing {session_section}"))?;
        required(&settings, "sso_start_url", &session_section)?;
        (
            session.to_string(),
            required(&settings, "sso_region", &session_section)?,
        )
    } else if let Some(start_url) = profile.get("sso_start_url") {
        // Tokens from the legacy setup are cached under the start URL.
        (start_url.to_string(), required(profile, "sso_region", &section)?)
    } else {
        return Ok(None);
    };

    Ok(Some(SsoTarget {
        cache_key,
        region,
        account_id: required(profile, "sso_account_id", &section)?,
        role_name: required(profile, "sso_role_name", &section)?,
    }))
}

fn parse_expiry(s: &str) -> anyhow::Result<DateTime<Utc>> {
    // Older CLI versions wrote `2024-01-01T00:00:00UTC`.
    let normalized = match s.strip_suffix("UTC") {
        Some(head) => format!("{head}Z"),
        None => s.to_string(),
    };
    Ok(DateTime::parse_from_rfc3339(&normalized)
        .with_context(|| format!("invalid SSO token expiry {s:?}"))?
        .with_timezone(&Utc))
}

/// Role credentials from the SSO portal, using the token `aws sso login` cached.
pub(super) fn credentials(
    ctx: &ProviderContext<'_>,
    profile: &Profile,
    name: &str,
) -> anyhow::Result<Option<Credentials>> {
    let Some(target) = target(ctx, profile, name)? else {
        return Ok(None);
    };

    let file = ctx
        .env
        .sso_cache_dir()
        .join(format!("{}.json", hex::encode(Sha1::digest(target.cache_key.as_bytes()))));
    let login_hint = format!("run `aws sso login --profile {name}`");
    let cached = fs::read_to_string(&file).with_context(|| {
        format!("no cached SSO token at {}; {login_hint}", file.display())
    })?;
    let token: CachedToken = serde_json::from_str(&cached)
        .with_context(|| format!("invalid SSO token cache {}", file.display()))?;
    if parse_expiry(&token.expires_at)? <= Utc::now() {
        anyhow::bail!("SSO token expired at {}; {login_hint}", token.expires_at);
    }

    let endpoint = ctx
        .env
        .get("AWS_ENDPOINT_URL_SSO")
        .map(|e| e.trim_end_matches('/').to_string())
        .unwrap_or_else(|| format!("https://portal.sso.{}.amazonaws.com", target.region));
    let query = Serializer::new(String::new())
        .append_pair("role_name", &target.role_name)
        .append_pair("account_id", &target.account_id)
        .finish();

    tracing::debug!(account_id = %target.account_id, role_name = %target.role_name, "fetching SSO role credentials");
    let resp = http(Duration::from_secs(10))?
        .get(format!("{endpoint}/federation/credentials?{query}"))
        .header("x-amz-sso_bearer_token", token.access_token)
        .send()
        .context("SSO GetRoleCredentials request failed")?;
    let status = resp.status();
    let error_type = resp
        .headers()
        .get("x-amzn-errortype")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let text = resp.text()?;

    if !status.is_success() {
        let body: Value = serde_json::from_str(&text).unwrap_or_else(|_| json!({ "message": text }));
        return Err(ServiceError::from_response(Some(status.as_u16()), error_type.as_deref(), &body))
            .context("SSO GetRoleCredentials failed");
    }

    let parsed: GetRoleCredentialsResponse =
        serde_json::from_str(&text).context("unexpected SSO GetRoleCredentials response shape")?;
    let role = parsed.role_credentials;
    Ok(Some(Credentials {
        access_key_id: role.access_key_id,
        secret_access_key: role.secret_access_key,
        session_token: role.session_token,
    }))
}

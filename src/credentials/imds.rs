use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::Env;
use crate::sigv4::Credentials;

const DEFAULT_ENDPOINT: &str = "http://169.254.169.254";
const TOKEN_TTL_SECONDS: &str = "21600";
const CREDENTIALS_PATH: &str = "/latest/meta-data/iam/security-credentials/";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
}

/// EC2 instance role credentials. An unreachable metadata service means "not on EC2",
/// not an error.
pub(super) fn credentials(env: &Env) -> anyhow::Result<Option<Credentials>> {
    if env
        .get("AWS_EC2_METADATA_DISABLED")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    {
        return Ok(None);
    }
    let endpoint = env
        .get("AWS_EC2_METADATA_SERVICE_ENDPOINT")
        .unwrap_or(DEFAULT_ENDPOINT)
        .trim_end_matches('/');
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(1))
        .no_proxy()
        .build()?;

    // IMDSv2 session token; v1 answers 403/404/405 to the PUT.
    let token = match client
        .put(format!("{endpoint}/latest/api/token"))
        .header("x-aws-ec2-metadata-token-ttl-seconds", TOKEN_TTL_SECONDS)
        .send()
    {
        Ok(resp) if resp.status().is_success() => Some(resp.text()?),
        Ok(resp)
            if matches!(
                resp.status(),
                StatusCode::FORBIDDEN | StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED
            ) =>
        {
            None
        }
        Ok(resp) => {
            tracing::debug!(status = %resp.status(), "instance metadata token refused");
            return Ok(None);
        }
        Err(e) => {
            tracing::debug!(error = %e, "instance metadata service not reachable");
            return Ok(None);
        }
    };

    let get = |path: &str| {
        let mut req = client.get(format!("{endpoint}{path}"));
        if let Some(token) = &token {
            req = req.header("x-aws-ec2-metadata-token", token.trim());
        }
        req.send()
    };

    let resp = get(CREDENTIALS_PATH).context("instance metadata role lookup failed")?;
    if !resp.status().is_success() {
        tracing::debug!(status = %resp.status(), "no instance role attached");
        return Ok(None);
    }
    let listing = resp.text()?;
    let Some(role) = listing.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Ok(None);
    };

    tracing::debug!(role, "fetching instance role credentials");
    let resp = get(&format!("{CREDENTIALS_PATH}{role}"))
        .context("instance metadata credentials request failed")?;
    if !resp.status().is_success() {
        anyhow::bail!(
            "instance metadata answered HTTP {} for role {role:?}",
            resp.status().as_u16()
        );
    }
    let body: InstanceCredentials = resp
        .json()
        .context("unexpected instance metadata credentials shape")?;
    Ok(Some(Credentials {
        access_key_id: body.access_key_id,
        secret_access_key: body.secret_access_key,
        session_token: body.token,
    }))
}

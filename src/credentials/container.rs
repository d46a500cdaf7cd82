use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use anyhow::Context;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;

use crate::config::Env;
use crate::sigv4::Credentials;

use super::http;

const ECS_HOST: &str = "http://169.254.170.2";
const TRUSTED_HTTP_HOSTS: [IpAddr; 3] = [
    IpAddr::V4(Ipv4Addr::new(169, 254, 170, 2)),
    IpAddr::V4(Ipv4Addr::new(169, 254, 170, 23)),
    IpAddr::V6(Ipv6Addr::new(0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x23)),
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
}

/// Plain HTTP is only trusted for loopback and the ECS/EKS link-local agents.
fn allowed_full_uri(uri: &str) -> anyhow::Result<reqwest::Url> {
    let url = reqwest::Url::parse(uri)
        .with_context(|| format!("invalid AWS_CONTAINER_CREDENTIALS_FULL_URI {uri:?}"))?;
    if url.scheme() == "https" {
        return Ok(url);
    }
    let host = url.host_str().unwrap_or("");
    let trusted = host == "localhost"
        || match host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
            Ok(ip) => ip.is_loopback() || TRUSTED_HTTP_HOSTS.contains(&ip),
            Err(_) => false,
        };
    if url.scheme() != "http" || !trusted {
        anyhow::bail!(
            "AWS_CONTAINER_CREDENTIALS_FULL_URI {uri:?} must use https or a loopback/container host"
        );
    }
    Ok(url)
}

fn authorization(env: &Env) -> anyhow::Result<Option<String>> {
    if let Some(path) = env.get("AWS_CONTAINER_AUTHORIZATION_TOKEN_FILE") {
        let token = fs::read_to_string(path)
            .with_context(|| format!("failed to read container authorization token {path}"))?;
        return Ok(Some(token.trim().to_string()));
    }
    Ok(env
        .get("AWS_CONTAINER_AUTHORIZATION_TOKEN")
        .map(str::to_string))
}

/// ECS task role / EKS pod identity credentials from the container agent.
pub(super) fn credentials(env: &Env) -> anyhow::Result<Option<Credentials>> {
    let url = if let Some(relative) = env.get("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI") {
        reqwest::Url::parse(&format!("{ECS_HOST}{relative}"))
            .with_context(|| format!("invalid AWS_CONTAINER_CREDENTIALS_RELATIVE_URI {relative:?}"))?
    } else if let Some(full) = env.get("AWS_CONTAINER_CREDENTIALS_FULL_URI") {
        allowed_full_uri(full)?
    } else {
        return Ok(None);
    };

    let mut req = http(Duration::from_secs(2))?.get(url.clone());
    if let Some(token) = authorization(env)? {
        req = req.header(AUTHORIZATION, token);
    }

    tracing::debug!(%url, "fetching container credentials");
    let resp = req
        .send()
        .with_context(|| format!("container credentials endpoint {url} unreachable"))?;
    let status = resp.status();
    if !status.is_success() {
        anyhow::bail!(
            "container credentials endpoint answered HTTP {}: {}",
            status.as_u16(),
            resp.text().unwrap_or_default()
        );
    }
    let body: ContainerCredentials = resp
        .json()
        .context("unexpected container credentials response shape")?;
    Ok(Some(Credentials {
        access_key_id: body.access_key_id,
        secret_access_key: body.secret_access_key,
        session_token: body.token,
    }))
}

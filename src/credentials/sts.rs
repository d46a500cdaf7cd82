use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use form_urlencoded::Serializer;
use reqwest::header::CONTENT_TYPE;
use xmlparser::{ElementEnd, Token, Tokenizer};

use crate::client::host_header;
use crate::sigv4::{self, Credentials, SignableRequest, SigningParams};

use super::{ProviderContext, default_session_name, http};

const API_VERSION: &str = "2011-06-15";

pub(super) struct AssumeRole<'a> {
    pub role_arn: &'a str,
    pub session_name: String,
    pub external_id: Option<&'a str>,
    pub duration_seconds: Option<&'a str>,
}

fn endpoint(ctx: &ProviderContext<'_>) -> String {
    ctx.env
        .get("AWS_ENDPOINT_URL_STS")
        .map(|e| e.trim_end_matches('/').to_string())
        .unwrap_or_else(|| format!("https://sts.{}.amazonaws.com", ctx.region))
}

pub(super) fn assume_role(
    ctx: &ProviderContext<'_>,
    source: &Credentials,
    req: &AssumeRole<'_>,
) -> anyhow::Result<Credentials> {
    let mut form = Serializer::new(String::new());
    form.append_pair("Action", "AssumeRole")
        .append_pair("Version", API_VERSION)
        .append_pair("RoleArn", req.role_arn)
        .append_pair("RoleSessionName", &req.session_name);
    if let Some(external_id) = req.external_id {
        form.append_pair("ExternalId", external_id);
    }
    if let Some(duration) = req.duration_seconds {
        form.append_pair("DurationSeconds", duration);
    }

    tracing::debug!(role_arn = req.role_arn, source = %source.access_key_id, "assuming role");
    call(ctx, "AssumeRole", form.finish(), Some(source))
}

/// Not signed: the token file is the credential.
pub(super) fn assume_role_with_web_identity(
    ctx: &ProviderContext<'_>,
    role_arn: &str,
    session_name: &str,
    token_file: &Path,
) -> anyhow::Result<Credentials> {
    let token = fs::read_to_string(token_file)
        .with_context(|| format!("failed to read web identity token {}", token_file.display()))?;
    let body = Serializer::new(String::new())
        .append_pair("Action", "AssumeRoleWithWebIdentity")
        .append_pair("Version", API_VERSION)
        .append_pair("RoleArn", role_arn)
        .append_pair("RoleSessionName", session_name)
        .append_pair("WebIdentityToken", token.trim())
        .finish();

    tracing::debug!(role_arn, "assuming role with web identity");
    call(ctx, "AssumeRoleWithWebIdentity", body, None)
}

/// `AWS_WEB_IDENTITY_TOKEN_FILE` + `AWS_ROLE_ARN`, as set up by EKS and similar.
pub(super) fn web_identity_from_env(
    ctx: &ProviderContext<'_>,
) -> anyhow::Result<Option<Credentials>> {
    let (Some(token_file), Some(role_arn)) = (
        ctx.env.get("AWS_WEB_IDENTITY_TOKEN_FILE"),
        ctx.env.get("AWS_ROLE_ARN"),
    ) else {
        return Ok(None);
    };
    let session_name = ctx
        .env
        .get("AWS_ROLE_SESSION_NAME")
        .map(str::to_string)
        .unwrap_or_else(default_session_name);
    assume_role_with_web_identity(ctx, role_arn, &session_name, Path::new(token_file)).map(Some)
}

fn call(
    ctx: &ProviderContext<'_>,
    action: &str,
    body: String,
    signer: Option<&Credentials>,
) -> anyhow::Result<Credentials> {
    let endpoint = endpoint(ctx);
    let url = reqwest::Url::parse(&format!("{endpoint}/"))
        .with_context(|| format!("invalid STS endpoint {endpoint:?}"))?;

    let mut req = http(Duration::from_secs(10))?
        .post(url.clone())
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded; charset=utf-8");
    if let Some(credentials) = signer {
        let host = host_header(&url)?;
        let signed = sigv4::sign(
            &SignableRequest {
                method: "POST",
                host: &host,
                path: url.path(),
                query: &[],
                body: body.as_bytes(),
            },
            &SigningParams {
                credentials,
                region: ctx.region,
                service: "sts",
                time: Utc::now(),
            },
        );
        for (name, value) in signed {
            req = req.header(name, value);
        }
    }

    let resp = req
        .body(body)
        .send()
        .with_context(|| format!("STS {action} request failed"))?;
    let status = resp.status();
    let text = resp.text()?;
    let fields = leaf_text(&text);

    if !status.is_success() {
        let fields = fields.unwrap_or_default();
        let code = fields.get("Code").map_or("UnknownError", String::as_str);
        let message = fields.get("Message").map_or("", String::as_str);
        anyhow::bail!("STS {action} failed: {code} (HTTP {}): {message}", status.as_u16());
    }

    let fields = fields.with_context(|| format!("unreadable STS {action} response"))?;
    let (Some(access_key_id), Some(secret_access_key)) =
        (fields.get("AccessKeyId"), fields.get("SecretAccessKey"))
    else {
        anyhow::bail!("STS {action} response has no credentials");
    };
    Ok(Credentials {
        access_key_id: access_key_id.clone(),
        secret_access_key: secret_access_key.clone(),
        session_token: fields.get("SessionToken").cloned(),
    })
}

/// Text of every leaf element, keyed by local name. The first occurrence wins.
fn leaf_text(xml: &str) -> anyhow::Result<HashMap<String, String>> {
    let mut out = HashMap::new();
    let mut open: Option<&str> = None;

    for token in Tokenizer::from(xml) {
        match token? {
            Token::ElementStart { local, .. } => open = Some(local.as_str()),
            Token::Text { text } => {
                let text = text.as_str().trim();
                if let Some(name) = open
                    && !text.is_empty()
                {
                    out.entry(name.to_string())
                        .or_insert_with(|| unescape(text));
                }
            }
            Token::ElementEnd {
                end: ElementEnd::Close(..) | ElementEnd::Empty,
                ..
            } => open = None,
            _ => {}
        }
    }
    Ok(out)
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

use std::path::Path;

use crate::config::{DEFAULT_PROFILE, Profile};
use crate::sigv4::Credentials;

use super::sts::{self, AssumeRole};
use super::{ProviderContext, container, default_session_name, from_env, imds, process, sso};

/// Credentials configured for `name` in the shared files.
///
/// Within a profile, `role_arn` wins over SSO, SSO over static keys, and static keys over
/// `credential_process`. The default profile may be absent; a named one may not.
pub(super) fn credentials(
    ctx: &ProviderContext<'_>,
    name: &str,
) -> anyhow::Result<Option<Credentials>> {
    if ctx.shared.profile(name).is_none() && name != DEFAULT_PROFILE {
        anyhow::bail!("profile {name:?} not found in the shared config or credentials file");
    }
    resolve(ctx, name, &mut Vec::new())
}

fn resolve(
    ctx: &ProviderContext<'_>,
    name: &str,
    visited: &mut Vec<String>,
) -> anyhow::Result<Option<Credentials>> {
    if visited.iter().any(|v| v == name) {
        visited.push(name.to_string());
        anyhow::bail!("source_profile loop: {}", visited.join(" -> "));
    }
    visited.push(name.to_string());

    let Some(profile) = ctx.shared.profile(name) else {
        return Ok(None);
    };

    if let Some(role_arn) = profile.get("role_arn") {
        return assume_role(ctx, name, &profile, role_arn, visited).map(Some);
    }
    if let Some(c) = sso::credentials(ctx, &profile, name)? {
        return Ok(Some(c));
    }
    if let Some(c) = static_keys(&profile, name)? {
        return Ok(Some(c));
    }
    if let Some(command) = profile.get("credential_process") {
        return process::credentials(command, name).map(Some);
    }
    Ok(None)
}

fn assume_role(
    ctx: &ProviderContext<'_>,
    name: &str,
    profile: &Profile,
    role_arn: &str,
    visited: &mut Vec<String>,
) -> anyhow::Result<Credentials> {
    let session_name = profile
        .get("role_session_name")
        .map(str::to_string)
        .unwrap_or_else(default_session_name);

    if let Some(token_file) = profile.get("web_identity_token_file") {
        return sts::assume_role_with_web_identity(
            ctx,
            role_arn,
            &session_name,
            Path::new(token_file),
        );
    }
    if profile.get("mfa_serial").is_some() {
        anyhow::bail!("profile {name:?} needs an MFA token (mfa_serial), which is not supported");
    }

    let source = if let Some(source_profile) = profile.get("source_profile") {
        // A profile may name itself to assume a role with its own static keys.
        let found = if source_profile == name {
            static_keys(profile, name)?
        } else {
            resolve(ctx, source_profile, visited)?
        };
        found.ok_or_else(|| {
            anyhow::anyhow!(
                "source_profile {source_profile:?} of profile {name:?} has no credentials"
            )
        })?
    } else if let Some(credential_source) = profile.get("credential_source") {
        let found = match credential_source {
            "Environment" => from_env(ctx.env)?,
            "Ec2InstanceMetadata" => imds::credentials(ctx.env)?,
            "EcsContainer" => container::credentials(ctx.env)?,
            other => anyhow::bail!(
                "profile {name:?} has unsupported credential_source {other:?}; \
                 expected Environment, Ec2InstanceMetadata or EcsContainer"
            ),
        };
        found.ok_or_else(|| {
            anyhow::anyhow!(
                "credential_source {credential_source} of profile {name:?} has no credentials"
            )
        })?
    } else {
        anyhow::bail!(
            "profile {name:?} sets role_arn without source_profile, credential_source \
             or web_identity_token_file"
        );
    };

    sts::assume_role(
        ctx,
        &source,
        &AssumeRole {
            role_arn,
            session_name,
            external_id: profile.get("external_id"),
            duration_seconds: profile.get("duration_seconds"),
        },
    )
}

fn static_keys(profile: &Profile, name: &str) -> anyhow::Result<Option<Credentials>> {
    match (
        profile.get("aws_access_key_id"),
        profile.get("aws_secret_access_key"),
    ) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(Some(Credentials {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            session_token: profile.get("aws_session_token").map(str::to_string),
        })),
        (None, None) => Ok(None),
        _ => anyhow::bail!(
            "profile {name:?} is missing aws_access_key_id or aws_secret_access_key"
        ),
    }
}

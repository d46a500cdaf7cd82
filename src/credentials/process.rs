use std::process::{Command, Stdio};

use anyhow::Context;
use serde::Deserialize;

use crate::sigv4::Credentials;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProcessOutput {
    version: u32,
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

/// Splits a command line the way a POSIX shell would for plain words and quotes.
/// No expansion of any kind happens.
fn split_command(line: &str) -> anyhow::Result<Vec<String>> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => word.push(c),
                        None => anyhow::bail!("unterminated single quote in {line:?}"),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => word.push(c),
                            Some(c) => {
                                word.push('\\');
                                word.push(c);
                            }
                            None => anyhow::bail!("unterminated double quote in {line:?}"),
                        },
                        Some(c) => word.push(c),
                        None => anyhow::bail!("unterminated double quote in {line:?}"),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(c) = chars.next() {
                    word.push(c);
                }
            }
            c => {
                in_word = true;
                word.push(c);
            }
        }
    }
    if in_word {
        words.push(word);
    }
    Ok(words)
}

/// Runs `credential_process` and reads its version 1 JSON from stdout.
pub(super) fn credentials(command: &str, profile: &str) -> anyhow::Result<Credentials> {
    let words = split_command(command)?;
    let Some((program, args)) = words.split_first() else {
        anyhow::bail!("credential_process of profile {profile:?} is empty");
    };

    tracing::debug!(%program, profile, "running credential_process");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output()
        .with_context(|| format!("failed to run credential_process {program:?}"))?;
    if !output.status.success() {
        anyhow::bail!(
            "credential_process of profile {profile:?} exited with {}",
            output.status
        );
    }

    let parsed: ProcessOutput = serde_json::from_slice(&output.stdout)
        .context("credential_process printed unexpected output")?;
    if parsed.version != 1 {
        anyhow::bail!(
            "credential_process returned Version {}; only Version 1 is supported",
            parsed.version
        );
    }
    Ok(Credentials {
        access_key_id: parsed.access_key_id,
        secret_access_key: parsed.secret_access_key,
        session_token: parsed.session_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_quotes_and_escapes() {
        assert_eq!(
            split_command(r#"aws-vault  export --format=json 'my profile' "a \"b\"" c\ d"#).unwrap(),
            vec![
                "aws-vault",
                "export",
                "--format=json",
                "my profile",
                "a \"b\"",
                "c d"
            ]
        );
        assert_eq!(split_command("  ").unwrap(), Vec::<String>::new());
        assert_eq!(split_command("''").unwrap(), vec![""]);
        assert!(split_command("'open").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn reads_version_one_output() {
        let c = credentials(
            r#"printf '{"Version":1,"AccessKeyId":"AKID","SecretAccessKey":"s","SessionToken":"t"}'"#,
            "default",
        )
        .unwrap();
        assert_eq!(c.access_key_id, "AKID");
        assert_eq!(c.session_token.as_deref(), Some("t"));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_other_versions_and_failures() {
        let err = credentials(
            r#"printf '{"Version":2,"AccessKeyId":"A","SecretAccessKey":"s"}'"#,
            "default",
        )
        .unwrap_err();
        assert!(err.to_string().contains("only Version 1"));
        assert!(credentials("false", "default").is_err());
    }
}

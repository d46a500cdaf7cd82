use std::fmt;

use crate::client::AppSyncClient;
use crate::types::{ApiId, FunctionId};

/// One `name,dataSourceName` entry of `--pipeline-config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRef {
    pub name: String,
    pub data_source_name: String,
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.name, self.data_source_name)
    }
}

/// Parses `name,dataSourceName;name,dataSourceName`. Empty entries are skipped.
pub fn parse_pipeline_config(spec: &str) -> anyhow::Result<Vec<FunctionRef>> {
    let mut out = Vec::new();
    for entry in spec.split(';').filter(|e| !e.trim().is_empty()) {
        let parts = entry.split(',').map(str::trim).collect::<Vec<_>>();
        match parts.as_slice() {
            [name, data_source_name] if !name.is_empty() && !data_source_name.is_empty() => {
                out.push(FunctionRef {
                    name: name.to_string(),
                    data_source_name: data_source_name.to_string(),
                });
            }
            _ => anyhow::bail!(
                "invalid pipeline function entry {:?}; expected name,dataSourceName",
                entry
            ),
        }
    }
    if out.is_empty() {
        anyhow::bail!("pipeline-config does not name any functions");
    }
    Ok(out)
}

/// Walks every page of the API's functions and returns the single id matching `wanted`.
pub fn find_function_id(
    client: &AppSyncClient,
    api_id: &ApiId,
    wanted: &FunctionRef,
) -> anyhow::Result<FunctionId> {
    let mut matches = Vec::new();
    let mut next_token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = client.list_functions_page(api_id, next_token.as_deref())?;
        pages += 1;
        matches.extend(
            page.functions
                .into_iter()
                .filter(|f| {
                    f.name.as_deref() == Some(wanted.name.as_str())
                        && f.data_source_name.as_deref() == Some(wanted.data_source_name.as_str())
                })
                .map(|f| f.function_id),
        );
        match page.next_token {
            Some(t) => next_token = Some(t),
            None => break,
        }
    }
    tracing::debug!(function = %wanted, pages, matches = matches.len(), "searched functions");

    match matches.as_slice() {
        [] => anyhow::bail!(
            "Function name {}, datasource {} not found",
            wanted.name,
            wanted.data_source_name
        ),
        [id] => Ok(id.clone()),
        _ => anyhow::bail!(
            "Function name {}, dataSourceName {} tuple is not unique, unable to determine function",
            wanted.name,
            wanted.data_source_name
        ),
    }
}

pub fn resolve_function_ids(
    client: &AppSyncClient,
    api_id: &ApiId,
    functions: &[FunctionRef],
) -> anyhow::Result<Vec<FunctionId>> {
    functions
        .iter()
        .map(|f| find_function_id(client, api_id, f))
        .collect()
}

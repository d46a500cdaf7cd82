use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::Value;

use crate::client::AppSyncClient;
use crate::pipeline::{FunctionRef, parse_pipeline_config, resolve_function_ids};
use crate::types::{ApiId, FunctionId, PipelineConfig, ResolverInput, ResolverKind};

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub api_id: ApiId,
    pub type_name: String,
    pub field_name: String,
    pub data_source_name: Option<String>,
    pub request_mapping_template: Option<PathBuf>,
    pub response_mapping_template: Option<PathBuf>,
    pub pipeline_config: Option<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Create,
    Update,
}

impl UpsertAction {
    pub fn verb(self) -> &'static str {
        match self {
            UpsertAction::Create => "create",
            UpsertAction::Update => "update",
        }
    }
}

#[derive(Debug)]
pub struct UploadOutcome {
    pub action: UpsertAction,
    pub input: ResolverInput,
    /// Full service response; `None` for a dry run.
    pub response: Option<Value>,
}

/// What to write, decided from local inputs alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverPlan {
    Unit {
        data_source_name: String,
        request_mapping_template: Option<String>,
        response_mapping_template: Option<String>,
    },
    Pipeline {
        functions: Vec<FunctionRef>,
        request_mapping_template: String,
        response_mapping_template: String,
    },
}

pub fn read_template(path: &Path) -> anyhow::Result<String> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            anyhow::bail!("template file not found: {}", path.display())
        }
        Err(e) => Err(e).with_context(|| format!("failed to read template {}", path.display())),
    }
}

/// Empty template text and an empty `pipeline_config` count as not given.
pub fn plan_resolver(
    req: &UploadRequest,
    request_mapping_template: Option<String>,
    response_mapping_template: Option<String>,
) -> anyhow::Result<ResolverPlan> {
    let request_mapping_template = request_mapping_template.filter(|t| !t.is_empty());
    let response_mapping_template = response_mapping_template.filter(|t| !t.is_empty());

    if let Some(spec) = req.pipeline_config.as_deref().filter(|s| !s.is_empty()) {
        let functions = parse_pipeline_config(spec)?;
        let (Some(request), Some(response)) = (request_mapping_template, response_mapping_template)
        else {
            anyhow::bail!(
                "request-mapping-template and response-mapping-template are required for a pipeline resolver"
            );
        };
        if let Some(ds) = &req.data_source_name {
            tracing::warn!(datasource = %ds, "datasource-name is ignored for pipeline resolvers");
        }
        return Ok(ResolverPlan::Pipeline {
            functions,
            request_mapping_template: request,
            response_mapping_template: response,
        });
    }

    let Some(data_source_name) = req.data_source_name.clone() else {
        anyhow::bail!("datasource-name is required for a unit resolver");
    };
    Ok(ResolverPlan::Unit {
        data_source_name,
        request_mapping_template,
        response_mapping_template,
    })
}

/// `function_ids` must line up with the plan's functions (empty for a unit resolver).
pub fn build_input(
    plan: ResolverPlan,
    action: UpsertAction,
    field_name: &str,
    function_ids: Vec<FunctionId>,
) -> ResolverInput {
    let field_name = (action == UpsertAction::Create).then(|| field_name.to_string());
    match plan {
        ResolverPlan::Unit {
            data_source_name,
            request_mapping_template,
            response_mapping_template,
        } => ResolverInput {
            field_name,
            kind: ResolverKind::Unit,
            data_source_name: Some(data_source_name),
            pipeline_config: None,
            request_mapping_template,
            response_mapping_template,
        },
        ResolverPlan::Pipeline {
            request_mapping_template,
            response_mapping_template,
            ..
        } => ResolverInput {
            field_name,
            kind: ResolverKind::Pipeline,
            data_source_name: None,
            pipeline_config: Some(PipelineConfig {
                functions: function_ids,
            }),
            request_mapping_template: Some(request_mapping_template),
            response_mapping_template: Some(response_mapping_template),
        },
    }
}

/// Creates the resolver if it does not exist yet, otherwise replaces it.
pub fn upload_resolver(client: &AppSyncClient, req: &UploadRequest) -> anyhow::Result<UploadOutcome> {
    let request_mapping_template = req
        .request_mapping_template
        .as_deref()
        .filter(|p| !p.as_os_str().is_empty())
        .map(read_template)
        .transpose()?;
    let response_mapping_template = req
        .response_mapping_template
        .as_deref()
        .filter(|p| !p.as_os_str().is_empty())
        .map(read_template)
        .transpose()?;

    let plan = plan_resolver(req, request_mapping_template, response_mapping_template)?;

    println!("Searching for existing resolver");
    let action = match client.get_resolver(&req.api_id, &req.type_name, &req.field_name)? {
        None => {
            println!("Resolver does not exist, creating");
            UpsertAction::Create
        }
        Some(existing) => {
            tracing::debug!(kind = ?existing.kind, arn = ?existing.resolver_arn, "existing resolver");
            println!("Found resolver, updating");
            UpsertAction::Update
        }
    };

    let function_ids = match &plan {
        ResolverPlan::Pipeline { functions, .. } => {
            resolve_function_ids(client, &req.api_id, functions)?
        }
        ResolverPlan::Unit { .. } => Vec::new(),
    };

    let input = build_input(plan, action, &req.field_name, function_ids);
    tracing::debug!(action = action.verb(), payload = ?input, "resolver payload");

    if req.dry_run {
        return Ok(UploadOutcome {
            action,
            input,
            response: None,
        });
    }

    let response = match action {
        UpsertAction::Create => client.create_resolver(&req.api_id, &req.type_name, &input)?,
        UpsertAction::Update => {
            client.update_resolver(&req.api_id, &req.type_name, &req.field_name, &input)?
        }
    };

    Ok(UploadOutcome {
        action,
        input,
        response: Some(response),
    })
}

use crate::errors::*;
use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use rmcp::schemars;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use strum::{Display, EnumString};

/// Dependency scope of a package as reported by the analysis.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Scope {
    Runtime,
    Development,
    Test,
    Build,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PackageRef {
    /// Dependency purl, e.g. pkg:maven/org.postgresql/postgresql@42.7.1
    pub purl: String,
    /// Dependency scope
    pub scope: Scope,
    /// Purls of the parent dependencies when the package is transitive
    #[serde(default)]
    pub dependency_graph: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationPlan {
    #[serde(default)]
    pub plan: Value,
    #[serde(default)]
    pub intel: Value,
}

#[derive(Debug, Serialize)]
struct RemediationRequest<'a> {
    cve: &'a str,
    package: &'a PackageRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    trusted_content: Option<&'a Value>,
}

#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Analyze the manifest and return the raw report.
    async fn analyze(&self, manifest: &Path, direct_only: bool) -> Result<Value>;
}

#[async_trait]
pub trait IntelBackend: Send + Sync {
    async fn remediation_plan(
        &self,
        cve: &str,
        package: &PackageRef,
        trusted_content: Option<&Value>,
    ) -> Result<RemediationPlan>;

    async fn document(&self, id: &str) -> Result<Value>;
}

fn endpoint(base: &Url, path: &str) -> String {
    format!("{}/{}", base.as_str().trim_end_matches('/'), path)
}

/// Turn non-success replies into `Failure::Transport`, keeping the body.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = match response.text().await {
        Ok(body) if !body.is_empty() => body,
        _ => status.canonical_reason().unwrap_or_default().to_string(),
    };
    Err(Failure::Transport { status, body }.into())
}

pub struct HttpAnalysisBackend {
    client: Client,
    base_url: Url,
}

impl HttpAnalysisBackend {
    pub fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl AnalysisBackend for HttpAnalysisBackend {
    async fn analyze(&self, manifest: &Path, direct_only: bool) -> Result<Value> {
        let content = tokio::fs::read(manifest)
            .await
            .with_context(|| anyhow!("Failed to read manifest {:?}", manifest))?;
        let name = manifest
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("Manifest path has no file name: {:?}", manifest))?;

        let url = endpoint(&self.base_url, "api/v5/analysis");
        debug!("Url={} (directOnly={})", url, direct_only);
        let response = self
            .client
            .post(url)
            .query(&[("directOnly", direct_only)])
            .header("Accept", "application/json")
            .header("x-manifest-name", name)
            .body(content)
            .send()
            .await
            .context("Failed to reach dependency analysis backend")?;

        let json = check_status(response)
            .await
            .context("Dependency analysis failed")?
            .json()
            .await
            .context("Dependency analysis backend returned invalid json")?;
        Ok(json)
    }
}

pub struct HttpIntelBackend {
    client: Client,
    base_url: Url,
}

impl HttpIntelBackend {
    pub fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl IntelBackend for HttpIntelBackend {
    async fn remediation_plan(
        &self,
        cve: &str,
        package: &PackageRef,
        trusted_content: Option<&Value>,
    ) -> Result<RemediationPlan> {
        let url = endpoint(&self.base_url, "v1/vulnerability/remediation_plan");
        debug!("Url={}", url);
        let response = self
            .client
            .post(url)
            .json(&RemediationRequest {
                cve,
                package,
                trusted_content,
            })
            .send()
            .await
            .context("Failed to reach intel server")?;

        let plan = check_status(response)
            .await
            .context("Failed to get remediation plan")?
            .json()
            .await
            .context("Intel server returned an invalid remediation plan")?;
        Ok(plan)
    }

    async fn document(&self, id: &str) -> Result<Value> {
        let url = endpoint(&self.base_url, &format!("v1/documents/{}", id));
        debug!("Url={}", url);
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| anyhow!("Failed to retrieve document {}", id))?;

        let json = check_status(response)
            .await
            .with_context(|| anyhow!("Failed to retrieve document {}", id))?
            .json()
            .await
            .with_context(|| anyhow!("Document {} is not valid json", id))?;
        Ok(json)
    }
}

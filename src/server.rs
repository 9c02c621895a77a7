//! MCP surface of the server: tool routing and the two `rhda://` resources.
//!
//! Tool failures never surface as protocol errors, they are returned as a
//! tool result flagged `is_error` carrying `{"error": "..."}`.
use crate::errors::*;
use crate::tools::{
    AnalyzeArgs, RedHatRepositoryArgs, RemediationArgs, SupportingDocumentsArgs, SuppressArgs,
    Tools,
};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    service::RequestContext,
    tool, tool_handler, tool_router, ErrorData as McpError, RoleServer, ServerHandler,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub const SCAN_LATEST_URI: &str = "rhda://scan/latest";
pub const REMEDIATION_LATEST_URI: &str = "rhda://remediation/latest";

fn tool_result(tool: &str, result: Result<Value>) -> Result<CallToolResult, McpError> {
    let (payload, failed) = match result {
        Ok(value) => (value, false),
        Err(err) => {
            error!("{} failed: {:#}", tool, err);
            (json!({ "error": format!("{:#}", err) }), true)
        }
    };
    let text = serde_json::to_string_pretty(&payload)
        .map_err(|err| McpError::internal_error(err.to_string(), None))?;
    if failed {
        Ok(CallToolResult::error(vec![Content::text(text)]))
    } else {
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

#[derive(Clone)]
pub struct RhdaMcpServer {
    tools: Arc<Tools>,
    tool_router: ToolRouter<RhdaMcpServer>,
}

#[tool_router]
impl RhdaMcpServer {
    pub fn new(tools: Arc<Tools>) -> Self {
        Self {
            tools,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Run a full dependency analysis of a manifest (pom.xml, package.json, ...) and report the vulnerabilities per package (purl). The report is also stored as resource rhda://scan/latest."
    )]
    async fn analyze_dependency_vulnerabilities(
        &self,
        Parameters(args): Parameters<AnalyzeArgs>,
    ) -> Result<CallToolResult, McpError> {
        let result = self.tools.analyze_dependency_vulnerabilities(args).await;
        tool_result("analyze_dependency_vulnerabilities", result)
    }

    #[tool(
        description = "Generate a remediation plan for a CVE affecting a package reported by analyze_dependency_vulnerabilities. The full plan is stored as resource rhda://remediation/latest."
    )]
    async fn generate_remediation_plan(
        &self,
        Parameters(args): Parameters<RemediationArgs>,
    ) -> Result<CallToolResult, McpError> {
        let result = self.tools.generate_remediation_plan(args).await;
        tool_result("generate_remediation_plan", result)
    }

    #[tool(description = "Retrieve the reference documents backing the evidence of a claim.")]
    async fn retrieve_supporting_documents(
        &self,
        Parameters(args): Parameters<SupportingDocumentsArgs>,
    ) -> Result<CallToolResult, McpError> {
        let result = self.tools.retrieve_supporting_documents(args).await;
        tool_result("retrieve_supporting_documents", result)
    }

    #[tool(
        description = "Suppress a vulnerability finding for a dependency by adding it to the ignore list of its manifest. Only call this when the user explicitly asks for it."
    )]
    async fn suppress_dependency_vulnerability(
        &self,
        Parameters(args): Parameters<SuppressArgs>,
    ) -> Result<CallToolResult, McpError> {
        let result = self.tools.suppress_dependency_vulnerability(args).await;
        tool_result("suppress_dependency_vulnerability", result)
    }

    #[tool(description = "Add the Red Hat repository to the project when a Red Hat remediation is available.")]
    async fn add_redhat_repository(
        &self,
        Parameters(args): Parameters<RedHatRepositoryArgs>,
    ) -> Result<CallToolResult, McpError> {
        let text = self.tools.add_redhat_repository(args);
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

impl RhdaMcpServer {
    pub fn list_resources_impl(&self) -> Vec<Resource> {
        let mut scan = RawResource::new(SCAN_LATEST_URI, "latest_scan");
        scan.description = Some(
            "Latest dependency analysis report, populated by analyze_dependency_vulnerabilities"
                .to_string(),
        );
        scan.mime_type = Some("application/json".to_string());

        let mut remediation = RawResource::new(REMEDIATION_LATEST_URI, "latest_remediation");
        remediation.description = Some(
            "Latest remediation plan with implementation details, populated by generate_remediation_plan"
                .to_string(),
        );
        remediation.mime_type = Some("application/json".to_string());

        vec![scan.no_annotation(), remediation.no_annotation()]
    }

    pub async fn read_resource_impl(&self, uri: &str) -> Result<Vec<ResourceContents>, McpError> {
        let text = match uri {
            SCAN_LATEST_URI => self.tools.latest_scan().await,
            REMEDIATION_LATEST_URI => self.tools.latest_remediation().await,
            _ => {
                return Err(McpError::resource_not_found(
                    format!("Resource not found: {}", uri),
                    None,
                ))
            }
        };
        let text = text.map_err(|err| {
            error!("Failed to read {}: {:#}", uri, err);
            McpError::internal_error(format!("{:#}", err), None)
        })?;
        Ok(vec![ResourceContents::text(text, uri)])
    }
}

#[tool_handler]
impl ServerHandler for RhdaMcpServer {
    fn get_info(&self) -> ServerInfo {
        let capabilities = ServerCapabilities::builder()
            .enable_resources()
            .enable_tools()
            .build();
        ServerInfo::new(capabilities)
            .with_server_info(Implementation::new(
                "rhda-mcp-server",
                env!("CARGO_PKG_VERSION"),
            ))
            .with_instructions(
                "Red Hat Dependency Analytics: analyze manifests for vulnerable dependencies, generate remediation plans and retrieve supporting evidence. Latest results are available as rhda://scan/latest and rhda://remediation/latest.",
            )
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult {
            resources: self.list_resources_impl(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let contents = self.read_resource_impl(&request.uri).await?;
        Ok(ReadResourceResult::new(contents))
    }
}

use crate::backend::{AnalysisBackend, IntelBackend, PackageRef};
use crate::errors::*;
use crate::report;
use crate::store::{ResultStore, Slot};
use crate::suppress;
use chrono::{DateTime, Utc};
use futures::future;
use rmcp::schemars;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use strum::Display;

pub const REDHAT_MAVEN_REPOSITORY: &str = "https://maven.repository.redhat.com/ga/";

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeArgs {
    /// Path to package manager file (pom.xml, package.json, build.gradle, build.gradle.kts, go.mod, requirements.txt)
    pub manifest_path: String,
    /// If true, analyze only direct dependencies. If false or omitted, analyze the whole stack
    #[serde(default)]
    pub direct_only: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemediationArgs {
    /// CVE id (e.g. CVE-2024-2700), as reported by analyze_dependency_vulnerabilities
    pub cve: String,
    /// Package reference, as reported by analyze_dependency_vulnerabilities
    pub package_ref: PackageRef,
    /// Trusted content recommendation from the analysis report, if any
    #[serde(default)]
    pub trusted_content: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
pub struct EvidenceItem {
    /// Id of the evidence item
    pub id: String,
    /// Source of the evidence item
    pub source: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SupportingDocumentsArgs {
    /// Evidence items that support a claim or fact
    pub evidence: Vec<EvidenceItem>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SuppressArgs {
    /// Dependency name to ignore
    pub dependency_name: String,
    /// Path to the manifest file where the dependency is declared
    pub manifest_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, schemars::JsonSchema, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PackageManager {
    Maven,
    Npm,
    Gradle,
    Go,
    Python,
    Rust,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedHatRepositoryArgs {
    /// Package manager used in the project
    pub package_manager: PackageManager,
}

/// Envelope written to the remediation slot.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredPlan<'a> {
    cve: &'a str,
    package_ref: &'a PackageRef,
    stored_at: DateTime<Utc>,
    plan: &'a Value,
    intel: &'a Value,
}

fn placeholder(error: &str, hint: &str) -> Result<String> {
    let text = serde_json::to_string_pretty(&json!({
        "error": error,
        "hint": hint,
    }))?;
    Ok(text)
}

pub struct Tools {
    store: Arc<ResultStore>,
    analysis: Arc<dyn AnalysisBackend>,
    intel: Arc<dyn IntelBackend>,
}

impl Tools {
    pub fn new(
        store: Arc<ResultStore>,
        analysis: Arc<dyn AnalysisBackend>,
        intel: Arc<dyn IntelBackend>,
    ) -> Self {
        Self {
            store,
            analysis,
            intel,
        }
    }

    pub async fn analyze_dependency_vulnerabilities(&self, args: AnalyzeArgs) -> Result<Value> {
        let direct_only = args.direct_only.unwrap_or(false);
        info!(
            "Starting analysis: manifestPath={:?}, directOnly={}",
            args.manifest_path, direct_only
        );

        let report = self
            .analysis
            .analyze(Path::new(&args.manifest_path), direct_only)
            .await?;
        let report_path = self.store.write_slot(Slot::Scan, &report).await?;
        let formatted = report::format_stack_analysis(&report, &args.manifest_path, direct_only)?;

        Ok(json!({
            "summary": formatted.summary,
            "affectedPackages": formatted.affected_packages,
            "reportPath": report_path.display().to_string(),
            "fullReport": report,
        }))
    }

    pub async fn generate_remediation_plan(&self, args: RemediationArgs) -> Result<Value> {
        if args.cve.trim().is_empty() {
            bail!("Missing required parameter: cve. First call analyze_dependency_vulnerabilities with your manifestPath, then use the cve and packageRef from those results");
        }
        info!("Requesting remediation plan for {} in {}", args.cve, args.package_ref.purl);

        let remediation = self
            .intel
            .remediation_plan(&args.cve, &args.package_ref, args.trusted_content.as_ref())
            .await?;

        let plan_path = self
            .store
            .write_slot(
                Slot::Remediation,
                &StoredPlan {
                    cve: &args.cve,
                    package_ref: &args.package_ref,
                    stored_at: Utc::now(),
                    plan: &remediation.plan,
                    intel: &remediation.intel,
                },
            )
            .await?;

        Ok(json!({
            "plan": remediation.plan,
            "intel": remediation.intel,
            "planPath": plan_path.display().to_string(),
        }))
    }

    /// Fetch every document, failing as soon as one of them fails.
    pub async fn retrieve_supporting_documents(&self, args: SupportingDocumentsArgs) -> Result<Value> {
        if args.evidence.is_empty() {
            bail!("Missing required parameter: evidence. Claims are supported by evidence which are references to supporting documents");
        }
        info!("Retrieving {} supporting documents", args.evidence.len());

        let documents = future::try_join_all(
            args.evidence
                .iter()
                .map(|item| self.intel.document(&item.id)),
        )
        .await?;
        Ok(Value::Array(documents))
    }

    pub async fn suppress_dependency_vulnerability(&self, args: SuppressArgs) -> Result<Value> {
        let suppression =
            suppress::suppress_dependency(&args.dependency_name, &args.manifest_path).await?;
        Ok(serde_json::to_value(suppression)?)
    }

    pub fn add_redhat_repository(&self, args: RedHatRepositoryArgs) -> String {
        match args.package_manager {
            PackageManager::Maven | PackageManager::Gradle => format!(
                "Check if the Red Hat repository is already in the project (pom.xml or build.gradle). Note that it can be added to the settings.xml file. If not, add a new repository to the project to use the Red Hat repository for the vulnerability. The repository url is '{}'",
                REDHAT_MAVEN_REPOSITORY
            ),
            other => format!(
                "Unsupported package manager: {}. This tool only supports Maven.",
                other
            ),
        }
    }

    /// Slot contents, or a fixed placeholder when nothing can be read.
    async fn read_latest(&self, slot: Slot, error: &str, hint: &str) -> Result<String> {
        match self.store.read_slot(slot).await {
            Ok(Some(text)) => Ok(text),
            Ok(None) => placeholder(error, hint),
            Err(err) => {
                warn!("Failed to read {} slot: {:#}", slot, err);
                placeholder(error, hint)
            }
        }
    }

    pub async fn latest_scan(&self) -> Result<String> {
        self.read_latest(
            Slot::Scan,
            "No scan result available.",
            "Run analyze_dependency_vulnerabilities first to populate this resource.",
        )
        .await
    }

    pub async fn latest_remediation(&self) -> Result<String> {
        self.read_latest(
            Slot::Remediation,
            "No remediation plan available.",
            "Run generate_remediation_plan first to populate this resource.",
        )
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::{RemediationPlan, Scope};
    use async_trait::async_trait;
    use std::sync::Mutex;

    pub struct FakeAnalysis {
        pub report: Value,
    }

    #[async_trait]
    impl AnalysisBackend for FakeAnalysis {
        async fn analyze(&self, _manifest: &Path, _direct_only: bool) -> Result<Value> {
            Ok(self.report.clone())
        }
    }

    #[derive(Default)]
    pub struct FakeIntel {
        pub requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl IntelBackend for FakeIntel {
        async fn remediation_plan(
            &self,
            cve: &str,
            package: &PackageRef,
            trusted_content: Option<&Value>,
        ) -> Result<RemediationPlan> {
            self.requested.lock().unwrap().push(cve.to_string());
            Ok(RemediationPlan {
                plan: json!({"options": [{"id": 1, "purl": package.purl}]}),
                intel: json!({"trusted": trusted_content.is_some()}),
            })
        }

        async fn document(&self, id: &str) -> Result<Value> {
            self.requested.lock().unwrap().push(id.to_string());
            if id == "missing" {
                return Err(Failure::Transport {
                    status: reqwest::StatusCode::NOT_FOUND,
                    body: "Not Found".to_string(),
                })
                .context("Failed to retrieve document missing");
            }
            Ok(json!({"id": id, "title": format!("Document {}", id)}))
        }
    }

    pub fn snyk_report() -> Value {
        json!({
            "snyk": {
                "summary": {"total": 1, "direct": 1, "dependencies": 1, "high": 1},
                "dependencies": [{"ref": "pkg:npm/a@1.0.0", "issues": [{"id": "CVE-2024-1"}]}]
            }
        })
    }

    pub fn tools(dir: &Path, report: Value) -> (Tools, Arc<FakeIntel>) {
        let intel = Arc::new(FakeIntel::default());
        let tools = Tools::new(
            Arc::new(ResultStore::with_dir(dir)),
            Arc::new(FakeAnalysis { report }),
            intel.clone(),
        );
        (tools, intel)
    }

    fn package_ref() -> PackageRef {
        PackageRef {
            purl: "pkg:npm/a@1.0.0".to_string(),
            scope: Scope::Runtime,
            dependency_graph: vec![],
        }
    }

    #[tokio::test]
    async fn test_analyze_stores_report() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (tools, _) = tools(dir.path(), snyk_report());

        let out = tools
            .analyze_dependency_vulnerabilities(AnalyzeArgs {
                manifest_path: "package.json".to_string(),
                direct_only: None,
            })
            .await?;
        assert_eq!(out["affectedPackages"], json!(["pkg:npm/a@1.0.0 (CVE-2024-1)"]));
        assert_eq!(out["fullReport"], snyk_report());
        assert_eq!(
            out["reportPath"],
            dir.path().join("scan-latest.json").display().to_string()
        );

        let stored: Value = serde_json::from_str(&tools.latest_scan().await?)?;
        assert_eq!(stored, snyk_report());
        Ok(())
    }

    #[tokio::test]
    async fn test_analyze_rejects_invalid_report() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (tools, _) = tools(dir.path(), json!(["not", "a", "report"]));

        let err = tools
            .analyze_dependency_vulnerabilities(AnalyzeArgs {
                manifest_path: "package.json".to_string(),
                direct_only: Some(true),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Failure>(),
            Some(Failure::InvalidReport("array"))
        ));

        // the raw reply is kept even though it could not be summarized
        let stored: Value = serde_json::from_str(&tools.latest_scan().await?)?;
        assert_eq!(stored, json!(["not", "a", "report"]));
        Ok(())
    }

    #[tokio::test]
    async fn test_remediation_plan_is_stored() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (tools, intel) = tools(dir.path(), snyk_report());

        let out = tools
            .generate_remediation_plan(RemediationArgs {
                cve: "CVE-2024-1".to_string(),
                package_ref: package_ref(),
                trusted_content: Some(json!({"ref": "pkg:npm/a@1.0.1-redhat"})),
            })
            .await?;
        assert_eq!(out["intel"], json!({"trusted": true}));
        assert_eq!(*intel.requested.lock().unwrap(), vec!["CVE-2024-1"]);

        let stored: Value = serde_json::from_str(&tools.latest_remediation().await?)?;
        assert_eq!(stored["cve"], "CVE-2024-1");
        assert_eq!(
            stored["packageRef"],
            json!({"purl": "pkg:npm/a@1.0.0", "scope": "runtime", "dependency_graph": []})
        );
        assert_eq!(stored["plan"], out["plan"]);
        let stored_at = stored["storedAt"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(stored_at).is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_remediation_requires_cve() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (tools, intel) = tools(dir.path(), snyk_report());

        let err = tools
            .generate_remediation_plan(RemediationArgs {
                cve: " ".to_string(),
                package_ref: package_ref(),
                trusted_content: None,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Missing required parameter: cve"));
        assert!(intel.requested.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_placeholders() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (tools, _) = tools(dir.path(), snyk_report());

        let scan: Value = serde_json::from_str(&tools.latest_scan().await?)?;
        assert_eq!(
            scan,
            json!({
                "error": "No scan result available.",
                "hint": "Run analyze_dependency_vulnerabilities first to populate this resource."
            })
        );
        let remediation: Value = serde_json::from_str(&tools.latest_remediation().await?)?;
        assert_eq!(remediation["error"], "No remediation plan available.");
        Ok(())
    }

    #[tokio::test]
    async fn test_documents_keep_input_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (tools, _) = tools(dir.path(), snyk_report());

        let out = tools
            .retrieve_supporting_documents(SupportingDocumentsArgs {
                evidence: ["b", "a", "c"]
                    .iter()
                    .map(|id| EvidenceItem {
                        id: id.to_string(),
                        source: "nvd".to_string(),
                    })
                    .collect(),
            })
            .await?;
        let ids = out
            .as_array()
            .unwrap()
            .iter()
            .map(|doc| doc["id"].as_str().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(ids, ["b", "a", "c"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_documents_fail_as_a_whole() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (tools, _) = tools(dir.path(), snyk_report());

        let err = tools
            .retrieve_supporting_documents(SupportingDocumentsArgs {
                evidence: ["a", "missing"]
                    .iter()
                    .map(|id| EvidenceItem {
                        id: id.to_string(),
                        source: "osv".to_string(),
                    })
                    .collect(),
            })
            .await
            .unwrap_err();
        assert_eq!(
            format!("{:#}", err),
            "Failed to retrieve document missing: 404 Not Found - Not Found"
        );

        let err = tools
            .retrieve_supporting_documents(SupportingDocumentsArgs { evidence: vec![] })
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Missing required parameter: evidence"));
        Ok(())
    }

    #[test]
    fn test_add_redhat_repository() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (tools, _) = tools(dir.path(), snyk_report());

        let text = tools.add_redhat_repository(RedHatRepositoryArgs {
            package_manager: PackageManager::Gradle,
        });
        assert!(text.ends_with("'https://maven.repository.redhat.com/ga/'"));

        let text = tools.add_redhat_repository(RedHatRepositoryArgs {
            package_manager: PackageManager::Npm,
        });
        assert_eq!(text, "Unsupported package manager: npm. This tool only supports Maven.");
        Ok(())
    }
}

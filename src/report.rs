use crate::errors::*;
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Provider name used when the backend returns a single flat report.
pub const FLAT_PROVIDER: &str = "component-analysis";

/// Reads a field that may be absent, null or of the wrong type as its default.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Like `lenient`, but drops only the list items that don't fit.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        _ => Vec::new(),
    };
    Ok(items
        .into_iter()
        .filter_map(|item| T::deserialize(item).ok())
        .collect())
}

fn count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let count = value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|n| n.is_finite() && *n > 0.0)
            .map(|n| n as u64)
    });
    Ok(count.unwrap_or(0))
}

/// Vulnerability counters of a provider, every counter defaults to 0.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct Summary {
    #[serde(default, deserialize_with = "count")]
    pub total: u64,
    #[serde(default, deserialize_with = "count")]
    pub direct: u64,
    #[serde(default, deserialize_with = "count")]
    pub transitive: u64,
    #[serde(default, deserialize_with = "count")]
    pub dependencies: u64,
    #[serde(default, deserialize_with = "count")]
    pub critical: u64,
    #[serde(default, deserialize_with = "count")]
    pub high: u64,
    #[serde(default, deserialize_with = "count")]
    pub medium: u64,
    #[serde(default, deserialize_with = "count")]
    pub low: u64,
}

impl Summary {
    fn severities(&self) -> [(&'static str, u64); 4] {
        [
            ("Critical", self.critical),
            ("High", self.high),
            ("Medium", self.medium),
            ("Low", self.low),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DependencyEntry {
    #[serde(rename = "ref", default, deserialize_with = "lenient")]
    pub r#ref: String,
    #[serde(default, deserialize_with = "lenient")]
    pub transitive: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub issues: Vec<Issue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Issue {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
}

/// The fields of a provider section the formatter cares about, everything
/// else in the backend reply is left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    pub name: String,
    pub summary: Option<Summary>,
    pub dependencies: Vec<DependencyEntry>,
}

impl Provider {
    fn from_value(name: &str, value: &Value) -> Self {
        let summary = value
            .get("summary")
            .filter(|summary| summary.is_object())
            .map(|summary| Summary::deserialize(summary).unwrap_or_default());

        let dependencies = match value.get("dependencies") {
            Some(Value::Array(deps)) => deps
                .iter()
                .filter_map(|dep| match DependencyEntry::deserialize(dep) {
                    Ok(dep) => Some(dep),
                    Err(err) => {
                        debug!("Skipping unrecognized dependency entry in {:?}: {:#}", name, err);
                        None
                    }
                })
                .collect(),
            _ => Vec::new(),
        };

        Provider {
            name: name.to_string(),
            summary,
            dependencies,
        }
    }

    fn affected_packages(&self) -> impl Iterator<Item = String> + '_ {
        self.dependencies
            .iter()
            .filter(|dep| !dep.r#ref.is_empty())
            .flat_map(|dep| {
                let parent = dep.transitive.as_deref().filter(|parent| !parent.is_empty());
                let hierarchy = match parent {
                    Some(parent) => format!("{} -> {}", dep.r#ref, parent),
                    None => dep.r#ref.clone(),
                };
                dep.issues
                    .iter()
                    .filter_map(|issue| issue.id.as_deref())
                    .filter(|id| !id.is_empty())
                    .map(move |id| format!("{} ({})", hierarchy, id))
            })
    }
}

/// How the top level of a report is laid out.
#[derive(Debug, PartialEq, Eq)]
pub enum ReportShape<'a> {
    /// Keyed by provider name, at least one value carries a `summary`.
    Providers(&'a Map<String, Value>),
    /// `summary`/`dependencies` directly at the top level.
    Flat(&'a Map<String, Value>),
    /// Neither, nothing to summarize but entries are still scanned for dependencies.
    Bare(&'a Map<String, Value>),
}

impl<'a> ReportShape<'a> {
    pub fn classify(report: &'a Value) -> Result<Self> {
        let map = match report {
            Value::Object(map) => map,
            other => return Err(Failure::InvalidReport(json_type(other)).into()),
        };

        let has_providers = map
            .values()
            .any(|value| value.as_object().map_or(false, |obj| obj.contains_key("summary")));

        if has_providers {
            Ok(ReportShape::Providers(map))
        } else if map.contains_key("summary") {
            Ok(ReportShape::Flat(map))
        } else {
            Ok(ReportShape::Bare(map))
        }
    }

    pub fn normalize(&self) -> Vec<Provider> {
        match self {
            ReportShape::Flat(map) => {
                vec![Provider::from_value(FLAT_PROVIDER, &Value::Object((*map).clone()))]
            }
            ReportShape::Providers(map) | ReportShape::Bare(map) => map
                .iter()
                .filter(|(_, value)| value.is_object())
                .map(|(name, value)| Provider::from_value(name, value))
                .collect(),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedOutput {
    pub summary: String,
    pub affected_packages: Vec<String>,
}

pub fn format_stack_analysis(
    report: &Value,
    manifest: &str,
    direct_only: bool,
) -> Result<FormattedOutput> {
    debug!("Formatting report for {:?} (direct_only={})", manifest, direct_only);
    let shape = ReportShape::classify(report)?;
    if let ReportShape::Flat(_) = shape {
        debug!("Detected flat report, treating it as {:?}", FLAT_PROVIDER);
    }
    let providers = shape.normalize();

    let mut lines = vec![format!(
        "The Red Hat Dependency Analytics report shows that your {} has the following vulnerabilities.\n",
        manifest
    )];
    let mut affected_packages = Vec::new();

    for provider in &providers {
        if let Some(summary) = provider.summary.as_ref().filter(|s| s.total > 0) {
            lines.push(format!(
                "`{}` Has found a total of {} Vulnerabilities ({} direct / {} transitive) in {} different dependencies",
                provider.name, summary.total, summary.direct, summary.transitive, summary.dependencies
            ));
            for (severity, count) in summary.severities() {
                if count > 0 {
                    lines.push(format!("* {}: {}", severity, count));
                }
            }
            lines.push(String::new());
        }

        affected_packages.extend(provider.affected_packages());
    }

    if !affected_packages.is_empty() {
        lines.push("\nThe affected packages are:\n".to_string());
        lines.extend(affected_packages.iter().map(|pkg| format!("* {}", pkg)));
    }

    lines.push(
        "\nDo you want me to address any vulnerability or dependency in particular or prefer to know more about a given CVE?"
            .to_string(),
    );

    Ok(FormattedOutput {
        summary: lines.join("\n"),
        affected_packages,
    })
}

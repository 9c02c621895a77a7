use crate::errors::*;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

pub const IGNORE_KEY: &str = "trustify-da-ignore";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    Npm,
    Maven,
    Go,
    Python,
    Gradle,
    Cargo,
}

impl ManifestKind {
    pub fn detect(path: &str) -> Option<Self> {
        let kind = if path.ends_with("package.json") {
            ManifestKind::Npm
        } else if path.ends_with("pom.xml") {
            ManifestKind::Maven
        } else if path.ends_with("go.mod") {
            ManifestKind::Go
        } else if path.ends_with("requirements.txt") {
            ManifestKind::Python
        } else if path.ends_with("build.gradle") || path.ends_with("build.gradle.kts") {
            ManifestKind::Gradle
        } else if path.ends_with("Cargo.toml") {
            ManifestKind::Cargo
        } else {
            return None;
        };
        Some(kind)
    }

    /// Marker comment for manifests that can't be rewritten automatically.
    pub fn comment(&self) -> Option<&'static str> {
        match self {
            ManifestKind::Npm => None,
            ManifestKind::Maven => Some("<!--trustify-da-ignore-->"),
            ManifestKind::Go | ManifestKind::Gradle => Some("//trustify-da-ignore"),
            ManifestKind::Python | ManifestKind::Cargo => Some("#trustify-da-ignore"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct Suppression {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    pub updated: bool,
}

/// Add `name` to the ignore list of a package.json document.
///
/// Returns `false` if the name was already listed.
fn add_to_ignore_list(pkg: &mut Value, name: &str) -> Result<bool> {
    let obj = pkg
        .as_object_mut()
        .ok_or_else(|| anyhow!("package.json is not a json object"))?;
    let list = obj
        .entry(IGNORE_KEY)
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| anyhow!("{:?} in package.json is not an array", IGNORE_KEY))?;

    if list.iter().any(|entry| entry.as_str() == Some(name)) {
        Ok(false)
    } else {
        list.push(Value::String(name.to_string()));
        Ok(true)
    }
}

pub async fn suppress_dependency(dependency: &str, manifest_path: &str) -> Result<Suppression> {
    let path = Path::new(manifest_path);
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| anyhow!("Failed to read manifest {:?}", manifest_path))?;

    let kind = ManifestKind::detect(manifest_path)
        .ok_or_else(|| anyhow!("Unsupported manifest type: {}", manifest_path))?;

    if kind == ManifestKind::Npm {
        let mut pkg: Value =
            serde_json::from_str(&content).context("Failed to parse package.json")?;
        if add_to_ignore_list(&mut pkg, dependency)? {
            let updated = serde_json::to_string_pretty(&pkg)?;
            tokio::fs::write(path, updated)
                .await
                .with_context(|| anyhow!("Failed to write {:?}", manifest_path))?;
            info!("Added {:?} to {} in {:?}", dependency, IGNORE_KEY, manifest_path);
            return Ok(Suppression {
                message: format!(
                    "Dependency {} has been added to the {} list in {}",
                    dependency, IGNORE_KEY, manifest_path
                ),
                instruction: None,
                updated: true,
            });
        }
        debug!("{:?} is already ignored in {:?}", dependency, manifest_path);
    }

    let comment = kind.comment().unwrap_or(IGNORE_KEY);
    Ok(Suppression {
        message: format!(
            "To ignore {}, add the comment \"{}\" next to the dependency declaration in {}",
            dependency, comment, manifest_path
        ),
        instruction: Some(format!(
            "Add \"{}\" as a comment next to {} in {}",
            comment, dependency, manifest_path
        )),
        updated: false,
    })
}

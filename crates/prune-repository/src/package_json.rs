use std::{collections::BTreeMap, io};

use miette::Diagnostic;
use prunepath::AbsoluteSystemPathBuf;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_manager: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_dependencies: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_dependencies: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_dependencies: Option<BTreeMap<String, String>>,
    // Unstructured fields kept for round trip capabilities
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum Error {
    #[error("unable to read {path}: {source}")]
    Io {
        path: AbsoluteSystemPathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to parse {path}: {source}")]
    #[diagnostic(code(package_json_parse_error))]
    Json {
        path: AbsoluteSystemPathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PackageJson {
    pub fn load(path: &AbsoluteSystemPathBuf) -> Result<PackageJson, Error> {
        let contents = path.read_to_string().map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| Error::Json {
            path: path.clone(),
            source,
        })
    }

    /// Returns an iterator over all of the dependencies an install of this
    /// package pulls in. Peer dependencies are provided by the consumer and
    /// are not included.
    pub fn all_dependencies(&self) -> impl Iterator<Item = (&String, &String)> + '_ {
        self.dev_dependencies
            .iter()
            .flatten()
            .chain(self.optional_dependencies.iter().flatten())
            .chain(self.dependencies.iter().flatten())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_all_dependencies_skips_peers() {
        let package_json: PackageJson = serde_json::from_value(json!({
            "name": "web",
            "dependencies": { "react": "^18.0.0", "ui": "*" },
            "devDependencies": { "typescript": "^5.0.0" },
            "optionalDependencies": { "fsevents": "^2.0.0" },
            "peerDependencies": { "react-dom": "^18.0.0" }
        }))
        .unwrap();
        let mut names = package_json
            .all_dependencies()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>();
        names.sort();
        assert_eq!(names, vec!["fsevents", "react", "typescript", "ui"]);
    }

    #[test]
    fn test_unknown_fields_survive() {
        let raw = json!({
            "name": "monorepo",
            "private": true,
            "workspaces": ["apps/*", "packages/*"],
            "packageManager": "yarn@1.22.19"
        });
        let package_json: PackageJson = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(package_json.package_manager.as_deref(), Some("yarn@1.22.19"));
        assert_eq!(serde_json::to_value(&package_json).unwrap(), raw);
    }

    #[test]
    fn test_load_reports_path() {
        let tmp = tempfile::tempdir().unwrap();
        let root = AbsoluteSystemPathBuf::new(tmp.path()).unwrap();
        let path = root.join_component("package.json");

        let err = PackageJson::load(&path).unwrap_err();
        assert!(matches!(err, Error::Io { path: p, .. } if p == path));

        path.create_with_contents("{ not json").unwrap();
        assert!(matches!(
            PackageJson::load(&path),
            Err(Error::Json { .. })
        ));
    }
}

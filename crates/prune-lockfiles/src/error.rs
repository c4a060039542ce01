use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Workspace '{0}' not found in lockfile")]
    MissingWorkspace(String),
    #[error("No lockfile entry found for '{0}'")]
    MissingPackage(String),
    #[error("Missing version from non-workspace package: '{0}'")]
    MissingVersion(String),
    #[error(
        "Lockfile entry '{key}' resolves differently for workspaces '{existing_workspace}' and \
         '{workspace}'"
    )]
    InconsistentLockfile {
        key: String,
        workspace: String,
        existing_workspace: String,
    },
    #[error("Unable to convert from json: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Unable to convert to yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("npm lockfiles without a 'packages' field are not supported")]
    UnsupportedNpmVersion,
    #[error(transparent)]
    Yarn1(#[from] crate::yarn1::Error),
}

//! Everything needed to understand the layout of a JavaScript monorepo:
//! its package.json files, the package manager that owns it and the graph
//! of workspaces that depend on each other.

#![deny(clippy::all)]

pub mod discovery;
pub mod package_graph;
pub mod package_json;
pub mod package_manager;

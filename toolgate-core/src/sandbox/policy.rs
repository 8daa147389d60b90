//! The sandbox policy model.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Closed-world baseline for everything the profile does not grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultBehavior {
    Allow,
    Deny,
}

/// Process capability grants.
///
/// Declaration order is preserved through compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessRule {
    /// Allow fork/posix_spawn of new processes.
    AllowFork,
    /// Allow exec of binaries readable under the file rules.
    AllowExec,
    /// Allow the process to signal itself (and its own group).
    AllowSignalSelf,
    /// Allow read-only sysctls; many runtimes need these at startup.
    AllowSysctlRead,
    /// Allow Mach bootstrap lookups; required by most system frameworks.
    AllowMachLookup,
}

/// Filesystem operation class a rule grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOperation {
    /// All read operations (`file-read*`).
    ReadAll,
    /// All write operations (`file-write*`).
    WriteAll,
    /// Mapping files for execution (`file-map-executable`).
    MapExecutable,
    /// Metadata-only reads (`file-read-metadata`).
    ReadMetadata,
}

/// Path matcher inside a file rule. Filters compile in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathFilter {
    /// The path and everything beneath it.
    Subpath(PathBuf),
    /// Exactly the path.
    Literal(PathBuf),
}

/// One additive grant: an operation class plus the paths it applies to.
/// A rule with no filters applies to every path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRule {
    pub operation: FileOperation,
    #[serde(default)]
    pub filters: Vec<PathFilter>,
}

impl FileRule {
    pub fn new(operation: FileOperation, filters: Vec<PathFilter>) -> Self {
        Self { operation, filters }
    }

    /// Grant the operation everywhere.
    pub fn everywhere(operation: FileOperation) -> Self {
        Self {
            operation,
            filters: Vec::new(),
        }
    }
}

/// Declarative description of a sandbox.
///
/// `default_behavior` establishes the baseline; process and file rules are
/// strictly additive grants on top of it, kept in declaration order because
/// profile languages can be order-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxPolicy {
    pub default_behavior: DefaultBehavior,
    #[serde(default)]
    pub process_rules: Vec<ProcessRule>,
    #[serde(default)]
    pub file_rules: Vec<FileRule>,
}

impl SandboxPolicy {
    /// Deny-everything baseline with no grants.
    pub fn deny_by_default() -> Self {
        Self {
            default_behavior: DefaultBehavior::Deny,
            process_rules: Vec::new(),
            file_rules: Vec::new(),
        }
    }

    /// Read the whole filesystem, write nowhere. The usual grants a dynamic
    /// binary needs to start are included.
    pub fn read_only() -> Self {
        Self {
            default_behavior: DefaultBehavior::Deny,
            process_rules: vec![
                ProcessRule::AllowFork,
                ProcessRule::AllowExec,
                ProcessRule::AllowSignalSelf,
                ProcessRule::AllowSysctlRead,
                ProcessRule::AllowMachLookup,
            ],
            file_rules: vec![
                FileRule::everywhere(FileOperation::ReadAll),
                FileRule::everywhere(FileOperation::MapExecutable),
                FileRule::new(
                    FileOperation::WriteAll,
                    vec![PathFilter::Literal(PathBuf::from("/dev/null"))],
                ),
            ],
        }
    }

    /// Like [`SandboxPolicy::read_only`] but with the given roots writable.
    pub fn workspace<I, P>(writable_roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut policy = Self::read_only();
        let filters: Vec<PathFilter> = writable_roots
            .into_iter()
            .map(|root| PathFilter::Subpath(root.as_ref().to_path_buf()))
            .collect();
        if !filters.is_empty() {
            policy
                .file_rules
                .push(FileRule::new(FileOperation::WriteAll, filters));
        }
        policy
    }

    pub fn with_file_rule(mut self, rule: FileRule) -> Self {
        self.file_rules.push(rule);
        self
    }

    pub fn with_process_rule(mut self, rule: ProcessRule) -> Self {
        self.process_rules.push(rule);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_adds_writable_roots_after_read_grants() {
        let policy = SandboxPolicy::workspace(["/workspace", "/tmp"]);
        let last = policy.file_rules.last().unwrap();
        assert_eq!(last.operation, FileOperation::WriteAll);
        assert_eq!(
            last.filters,
            vec![
                PathFilter::Subpath(PathBuf::from("/workspace")),
                PathFilter::Subpath(PathBuf::from("/tmp")),
            ]
        );
    }

    #[test]
    fn policy_round_trips_through_serde() {
        let policy = SandboxPolicy::workspace(["/workspace"]);
        let json = serde_json::to_string(&policy).unwrap();
        let back: SandboxPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, policy);
    }

    #[test]
    fn empty_workspace_list_grants_no_writes_beyond_dev_null() {
        let policy = SandboxPolicy::workspace(Vec::<PathBuf>::new());
        let write_rules: Vec<_> = policy
            .file_rules
            .iter()
            .filter(|r| r.operation == FileOperation::WriteAll)
            .collect();
        assert_eq!(write_rules.len(), 1);
        assert_eq!(
            write_rules[0].filters,
            vec![PathFilter::Literal(PathBuf::from("/dev/null"))]
        );
    }
}

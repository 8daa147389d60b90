//! Compilation of [`SandboxPolicy`] into macOS seatbelt profiles (SBPL).
//!
//! Compilation is deterministic: rules and filters are emitted in
//! declaration order and the same policy always yields byte-identical
//! output. Golden tests below pin the exact text, since `sandbox-exec`
//! evaluates profiles order-sensitively.

use std::fmt::Write as _;
use std::path::Path;

use super::policy::{
    DefaultBehavior, FileOperation, FileRule, PathFilter, ProcessRule, SandboxPolicy,
};

fn default_line(default_behavior: DefaultBehavior) -> &'static str {
    match default_behavior {
        DefaultBehavior::Allow => "(allow default)",
        DefaultBehavior::Deny => "(deny default)",
    }
}

fn process_rule_line(rule: ProcessRule) -> &'static str {
    match rule {
        ProcessRule::AllowFork => "(allow process-fork)",
        ProcessRule::AllowExec => "(allow process-exec)",
        ProcessRule::AllowSignalSelf => "(allow signal (target self))",
        ProcessRule::AllowSysctlRead => "(allow sysctl-read)",
        ProcessRule::AllowMachLookup => "(allow mach-lookup)",
    }
}

fn operation_name(operation: FileOperation) -> &'static str {
    match operation {
        FileOperation::ReadAll => "file-read*",
        FileOperation::WriteAll => "file-write*",
        FileOperation::MapExecutable => "file-map-executable",
        FileOperation::ReadMetadata => "file-read-metadata",
    }
}

/// Quote a path for SBPL, escaping backslashes and double quotes.
fn quote_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('"');
    for ch in raw.chars() {
        match ch {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

fn file_rule_line(rule: &FileRule) -> String {
    let mut line = format!("(allow {}", operation_name(rule.operation));
    for filter in &rule.filters {
        match filter {
            PathFilter::Subpath(path) => {
                let _ = write!(line, " (subpath {})", quote_path(path));
            }
            PathFilter::Literal(path) => {
                let _ = write!(line, " (literal {})", quote_path(path));
            }
        }
    }
    line.push(')');
    line
}

/// Compile a policy into SBPL profile text.
pub fn compile_profile(policy: &SandboxPolicy) -> String {
    let mut profile = String::from("(version 1)\n");
    profile.push_str(default_line(policy.default_behavior));
    profile.push('\n');
    for rule in &policy.process_rules {
        profile.push_str(process_rule_line(*rule));
        profile.push('\n');
    }
    for rule in &policy.file_rules {
        profile.push_str(&file_rule_line(rule));
        profile.push('\n');
    }
    profile
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn golden_workspace_profile() {
        let policy = SandboxPolicy::workspace(["/workspace"]);
        let expected = "\
(version 1)
(deny default)
(allow process-fork)
(allow process-exec)
(allow signal (target self))
(allow sysctl-read)
(allow mach-lookup)
(allow file-read*)
(allow file-map-executable)
(allow file-write* (literal \"/dev/null\"))
(allow file-write* (subpath \"/workspace\"))
";
        assert_eq!(compile_profile(&policy), expected);
    }

    #[test]
    fn golden_minimal_profile() {
        let policy = SandboxPolicy::deny_by_default();
        assert_eq!(compile_profile(&policy), "(version 1)\n(deny default)\n");
    }

    #[test]
    fn compilation_is_deterministic() {
        let policy = SandboxPolicy::workspace(["/a", "/b", "/c"]);
        assert_eq!(compile_profile(&policy), compile_profile(&policy));
    }

    #[test]
    fn filters_compile_in_declaration_order() {
        let policy = SandboxPolicy::deny_by_default().with_file_rule(FileRule::new(
            FileOperation::ReadAll,
            vec![
                PathFilter::Subpath(PathBuf::from("/second")),
                PathFilter::Subpath(PathBuf::from("/first")),
            ],
        ));
        let profile = compile_profile(&policy);
        let second = profile.find("/second").unwrap();
        let first = profile.find("/first").unwrap();
        assert!(second < first, "declaration order must be preserved");
    }

    #[test]
    fn paths_are_escaped() {
        let policy = SandboxPolicy::deny_by_default().with_file_rule(FileRule::new(
            FileOperation::ReadAll,
            vec![PathFilter::Literal(PathBuf::from("/odd\"name"))],
        ));
        let profile = compile_profile(&policy);
        assert!(profile.contains("(literal \"/odd\\\"name\")"));
    }

    #[test]
    fn allow_default_compiles() {
        let policy = SandboxPolicy {
            default_behavior: DefaultBehavior::Allow,
            process_rules: Vec::new(),
            file_rules: Vec::new(),
        };
        assert_eq!(compile_profile(&policy), "(version 1)\n(allow default)\n");
    }
}

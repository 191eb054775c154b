//! Test suite configuration types
//!
//! Defines the data structures for deserializing YAML test suites.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::common::config::{HostConfig, Timeouts};
use crate::common::{Error, Result};

/// A suite of sandboxed tests loaded from a YAML file
#[derive(Deserialize, Debug)]
pub struct TestSuite {
    /// Name of the suite
    pub name: String,
    /// Optional description of what the suite covers
    pub description: Option<String>,
    /// Host override; the configured host is used when absent
    pub host: Option<SuiteHost>,
    /// Tests, run in declaration order
    pub tests: Vec<TestDescriptor>,
}

/// Host settings a suite may override
#[derive(Deserialize, Debug)]
pub struct SuiteHost {
    /// Host executable; relative paths resolve against the suite file
    pub path: PathBuf,
    /// Arguments to pass to the host
    #[serde(default)]
    pub args: Vec<String>,
    /// How long to wait for the page and module to load
    pub ready_timeout_ms: Option<u64>,
}

/// One named test routine inside the sandbox
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TestDescriptor {
    /// Trigger name, unique within the suite
    pub name: String,
    /// Human-readable title for reports
    pub title: Option<String>,
    /// Deadline in milliseconds (missing or 0 = configured default)
    pub timeout_ms: Option<u64>,
}

impl TestDescriptor {
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }
}

impl TestSuite {
    /// Load and validate a suite file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read test suite '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    /// Parse and validate suite YAML
    pub fn parse(content: &str) -> Result<Self> {
        let suite: TestSuite = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse test suite: {}", e)))?;
        suite.validate()?;
        Ok(suite)
    }

    fn validate(&self) -> Result<()> {
        if self.tests.is_empty() {
            return Err(Error::Config(format!(
                "Test suite '{}' declares no tests",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for test in &self.tests {
            if test.name.trim().is_empty() {
                return Err(Error::Config("Test name must not be empty".to_string()));
            }
            if !seen.insert(test.name.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate test name '{}' in suite '{}'",
                    test.name, self.name
                )));
            }
            if let Some(ms) = test.timeout_ms {
                if i64::try_from(ms).is_err() {
                    return Err(Error::Config(format!(
                        "Test '{}' has an out-of-range timeout_ms {}",
                        test.name, ms
                    )));
                }
            }
        }
        Ok(())
    }

    /// Tests whose name contains `filter`, or all of them
    pub fn selected<'a>(&'a self, filter: Option<&'a str>) -> impl Iterator<Item = &'a TestDescriptor> {
        self.tests
            .iter()
            .filter(move |t| filter.map_or(true, |f| t.name.contains(f)))
    }

    /// Host to launch and timeouts to apply, after suite overrides
    ///
    /// `suite_dir` is the directory of the suite file.
    pub fn effective_host(
        &self,
        configured: &HostConfig,
        timeouts: &Timeouts,
        suite_dir: &Path,
    ) -> (HostConfig, Timeouts) {
        let mut timeouts = timeouts.clone();
        let host = match &self.host {
            Some(host) => {
                if let Some(ms) = host.ready_timeout_ms {
                    timeouts.host_ready_ms = ms;
                }
                let path = if host.path.is_relative() && host.path.components().count() > 1 {
                    suite_dir.join(&host.path)
                } else {
                    host.path.clone()
                };
                HostConfig {
                    path,
                    args: host.args.clone(),
                }
            }
            None => configured.clone(),
        };
        (host, timeouts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUITE: &str = r#"
name: Compact public key
tests:
  - name: compressedCompactPublicKeyTest256BitSmall
    title: Compressed Compact Public Key Test Small 256 Bit
  - name: compactPublicKeyZeroKnowledge
    timeout_ms: 3600000
"#;

    #[test]
    fn test_parse_suite() {
        let suite = TestSuite::parse(SUITE).unwrap();
        assert_eq!(suite.name, "Compact public key");
        assert_eq!(suite.tests.len(), 2);
        assert_eq!(
            suite.tests[0].display_name(),
            "Compressed Compact Public Key Test Small 256 Bit"
        );
        assert_eq!(suite.tests[0].timeout_ms, None);
        assert_eq!(suite.tests[1].display_name(), "compactPublicKeyZeroKnowledge");
        assert_eq!(suite.tests[1].timeout_ms, Some(3_600_000));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = TestSuite::parse(
            "name: dup\ntests:\n  - name: a\n  - name: b\n  - name: a\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Duplicate test name 'a'"));
    }

    #[test]
    fn test_out_of_range_timeout_rejected() {
        let err = TestSuite::parse(
            "name: huge\ntests:\n  - name: a\n    timeout_ms: 18446744073709551615\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("out-of-range timeout_ms"));
    }

    #[test]
    fn test_empty_suite_rejected() {
        assert!(TestSuite::parse("name: empty\ntests: []\n").is_err());
    }

    #[test]
    fn test_filter_selects_by_substring() {
        let suite = TestSuite::parse(SUITE).unwrap();
        let names: Vec<_> = suite
            .selected(Some("ZeroKnowledge"))
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, vec!["compactPublicKeyZeroKnowledge"]);
        assert_eq!(suite.selected(None).count(), 2);
    }

    #[test]
    fn test_suite_host_overrides_config() {
        let suite = TestSuite::parse(
            r#"
name: local
host:
  path: ./driver/run-page
  args: ["--headless"]
  ready_timeout_ms: 120000
tests:
  - name: a
"#,
        )
        .unwrap();

        let (host, timeouts) = suite.effective_host(
            &HostConfig::default(),
            &Timeouts::default(),
            Path::new("/suites"),
        );
        assert_eq!(host.path, PathBuf::from("/suites/./driver/run-page"));
        assert_eq!(host.args, vec!["--headless"]);
        assert_eq!(timeouts.host_ready_ms, 120_000);
        assert_eq!(timeouts.default_ms, Timeouts::default().default_ms);
    }

    #[test]
    fn test_bare_host_name_is_not_rebased() {
        let suite = TestSuite::parse("name: n\nhost:\n  path: node\ntests:\n  - name: a\n").unwrap();
        let (host, _) = suite.effective_host(
            &HostConfig::default(),
            &Timeouts::default(),
            Path::new("/suites"),
        );
        assert_eq!(host.path, PathBuf::from("node"));
    }
}

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution status accepted by TestLink for a case result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseStatus {
    Passed,
    Failed,
    Blocked,
}

impl CaseStatus {
    /// Single-letter status code used on the wire
    pub fn code(&self) -> &'static str {
        match self {
            CaseStatus::Passed => "p",
            CaseStatus::Failed => "f",
            CaseStatus::Blocked => "b",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CaseStatus::Passed => "Passed",
            CaseStatus::Failed => "Failed",
            CaseStatus::Blocked => "Blocked",
        };
        write!(f, "{label}")
    }
}

/// A test plan inside a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestPlan {
    pub id: String,
    pub name: String,
}

/// A build attached to a test plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Build {
    pub id: String,
    pub name: String,
}

/// A test case resolved by its external id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub id: String,
    pub external_id: String,
    pub name: String,
}

/// Everything one result submission carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseReport {
    pub case_external_id: String,
    pub plan_id: String,
    pub status: CaseStatus,
    pub build_name: String,
    pub platform_name: String,
    /// An existing result for this build/case is left untouched when false
    pub overwrite: bool,
    pub notes: Option<String>,
}

/// Remote operations the reporter needs from a TestLink server.
///
/// The production implementation is [`XmlRpcClient`](crate::core::testlink::XmlRpcClient);
/// tests substitute a recording mock. Lookup failures and submission failures
/// surface as errors here and are never retried by callers.
#[async_trait]
pub trait TestlinkApi: Send + Sync {
    /// Resolves a plan by name within the named project
    async fn plan_by_name(&self, project_name: &str, plan_name: &str) -> Result<TestPlan>;

    /// Resolves a case by its external id
    async fn case_by_external_id(&self, external_id: &str) -> Result<TestCase>;

    /// Creates a build on the plan
    async fn create_build(&self, plan: &TestPlan, name: &str, notes: &str) -> Result<Build>;

    /// Submits one execution result
    async fn report_result(&self, report: &CaseReport) -> Result<()>;
}

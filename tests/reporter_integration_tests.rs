use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use testlink_reporter::{
    Annotation, Build, CaseReport, CaseStatus, ReporterConfig, ResultReporter, TestCase, TestPlan,
    TestlinkApi, DEFAULT_ENDPOINT,
};

/// One remote operation observed by the mock server
#[derive(Debug, Clone, PartialEq)]
enum Call {
    PlanByName { project: String, plan: String },
    CaseByExternalId(String),
    CreateBuild { plan_id: String, name: String, notes: String },
    Report(CaseReport),
}

/// Recording stand-in for a TestLink server
#[derive(Default)]
struct MockApi {
    calls: Mutex<Vec<Call>>,
    fail_case_lookup: bool,
    fail_reports: bool,
}

impl MockApi {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn reports(&self) -> Vec<CaseReport> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Report(report) => Some(report),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl TestlinkApi for MockApi {
    async fn plan_by_name(&self, project_name: &str, plan_name: &str) -> Result<TestPlan> {
        self.record(Call::PlanByName {
            project: project_name.to_string(),
            plan: plan_name.to_string(),
        });
        Ok(TestPlan {
            id: format!("plan-{project_name}-{plan_name}"),
            name: plan_name.to_string(),
        })
    }

    async fn case_by_external_id(&self, external_id: &str) -> Result<TestCase> {
        if self.fail_case_lookup {
            return Err(anyhow!("case '{external_id}' not found"));
        }
        self.record(Call::CaseByExternalId(external_id.to_string()));
        Ok(TestCase {
            id: format!("tc-{external_id}"),
            external_id: external_id.to_string(),
            name: String::new(),
        })
    }

    async fn create_build(&self, plan: &TestPlan, name: &str, notes: &str) -> Result<Build> {
        self.record(Call::CreateBuild {
            plan_id: plan.id.clone(),
            name: name.to_string(),
            notes: notes.to_string(),
        });
        Ok(Build {
            id: "build-1".to_string(),
            name: name.to_string(),
        })
    }

    async fn report_result(&self, report: &CaseReport) -> Result<()> {
        if self.fail_reports {
            return Err(anyhow!("server error during reportTCResult"));
        }
        self.record(Call::Report(report.clone()));
        Ok(())
    }
}

fn settings(build_name: Option<&str>) -> ReporterConfig {
    ReporterConfig {
        endpoint: DEFAULT_ENDPOINT.to_string(),
        key: "devkey".to_string(),
        project_name: "Storefront".to_string(),
        plan_name: "Regression".to_string(),
        build_name: build_name.map(str::to_string),
        platform_name: "linux".to_string(),
    }
}

async fn configured_reporter(api: Arc<MockApi>) -> ResultReporter {
    ResultReporter::configure(settings(Some("Build-42")), api)
        .await
        .unwrap()
}

#[tokio::test]
async fn configure_resolves_plan_and_creates_build_when_unnamed() {
    let api = Arc::new(MockApi::default());
    let reporter = ResultReporter::configure(settings(None), api.clone())
        .await
        .unwrap();

    let calls = api.calls();
    assert_eq!(
        calls[0],
        Call::PlanByName {
            project: "Storefront".to_string(),
            plan: "Regression".to_string(),
        }
    );

    // Exactly one build creation, named Build-YYYY-MM-DDtHH:MM:SS (UTC)
    let builds: Vec<_> = calls
        .iter()
        .filter_map(|call| match call {
            Call::CreateBuild { plan_id, name, notes } => Some((plan_id, name, notes)),
            _ => None,
        })
        .collect();
    assert_eq!(builds.len(), 1);
    let (plan_id, name, notes) = builds[0];
    assert_eq!(plan_id, "plan-Storefront-Regression");
    assert_eq!(notes, "Automated by testlink-reporter");
    assert_eq!(name.len(), "Build-".len() + 19);
    let stamp = name.strip_prefix("Build-").unwrap();
    let bytes = stamp.as_bytes();
    assert_eq!(bytes[4], b'-');
    assert_eq!(bytes[7], b'-');
    assert_eq!(bytes[10], b't');
    assert_eq!(bytes[13], b':');
    assert_eq!(bytes[16], b':');

    assert_eq!(reporter.build_name(), name);
}

#[tokio::test]
async fn configure_keeps_explicit_build_name() {
    let api = Arc::new(MockApi::default());
    let reporter = configured_reporter(api.clone()).await;

    assert_eq!(reporter.build_name(), "Build-42");
    assert!(api
        .calls()
        .iter()
        .all(|call| !matches!(call, Call::CreateBuild { .. })));
}

#[tokio::test]
async fn success_reports_passed_against_default_plan() {
    let api = Arc::new(MockApi::default());
    let reporter = configured_reporter(api.clone()).await;

    reporter.annotate("test_login", Annotation::new(1234));
    reporter.record_success("test_login").await.unwrap();

    let reports = api.reports();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.case_external_id, "1234");
    assert_eq!(report.status, CaseStatus::Passed);
    assert_eq!(report.plan_id, "plan-Storefront-Regression");
    assert_eq!(report.build_name, "Build-42");
    assert_eq!(report.platform_name, "linux");
    assert!(!report.overwrite);
    assert!(report.notes.is_none());

    // The case was looked up by external id before submission
    assert!(api
        .calls()
        .contains(&Call::CaseByExternalId("1234".to_string())));
}

#[tokio::test]
async fn failure_resolves_overridden_plan_fresh() {
    let api = Arc::new(MockApi::default());
    let reporter = configured_reporter(api.clone()).await;

    reporter.annotate(
        "test_checkout",
        Annotation::new(5678)
            .with_project("Store")
            .with_plan("ReleasePlan"),
    );
    reporter.record_failure("test_checkout").await.unwrap();

    assert!(api.calls().contains(&Call::PlanByName {
        project: "Store".to_string(),
        plan: "ReleasePlan".to_string(),
    }));
    let reports = api.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, CaseStatus::Failed);
    assert_eq!(reports[0].plan_id, "plan-Store-ReleasePlan");
}

#[tokio::test]
async fn plan_override_without_project_uses_configured_project() {
    let api = Arc::new(MockApi::default());
    let reporter = configured_reporter(api.clone()).await;

    reporter.annotate("test_refund", Annotation::new(11).with_plan("Hotfix"));
    reporter.record_success("test_refund").await.unwrap();

    assert!(api.calls().contains(&Call::PlanByName {
        project: "Storefront".to_string(),
        plan: "Hotfix".to_string(),
    }));
}

#[tokio::test]
async fn error_hook_reports_failed() {
    let api = Arc::new(MockApi::default());
    let reporter = configured_reporter(api.clone()).await;

    reporter.annotate("test_timeout", Annotation::new(77));
    reporter.record_error("test_timeout").await.unwrap();

    assert_eq!(api.reports()[0].status, CaseStatus::Failed);
}

#[tokio::test]
async fn second_hook_without_new_annotation_is_a_no_op() {
    let api = Arc::new(MockApi::default());
    let reporter = configured_reporter(api.clone()).await;

    reporter.annotate("test_login", Annotation::new(1234));
    reporter.record_success("test_login").await.unwrap();
    reporter.record_success("test_login").await.unwrap();

    assert_eq!(api.reports().len(), 1);
}

#[tokio::test]
async fn unannotated_test_is_never_reported() {
    let api = Arc::new(MockApi::default());
    let reporter = configured_reporter(api.clone()).await;

    reporter.record_failure("test_untracked").await.unwrap();

    assert!(api.reports().is_empty());
}

#[tokio::test]
async fn back_to_back_tests_consume_their_own_records() {
    let api = Arc::new(MockApi::default());
    let reporter = configured_reporter(api.clone()).await;

    reporter.annotate("test_login", Annotation::new(1));
    reporter.annotate("test_checkout", Annotation::new(2));

    // Hooks fire in the opposite order; each still matches its own test
    reporter.record_success("test_checkout").await.unwrap();
    reporter.record_failure("test_login").await.unwrap();

    let reports = api.reports();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].case_external_id, "2");
    assert_eq!(reports[0].status, CaseStatus::Passed);
    assert_eq!(reports[1].case_external_id, "1");
    assert_eq!(reports[1].status, CaseStatus::Failed);
    assert_eq!(reporter.annotations().pending_count(), 0);
}

#[tokio::test]
async fn lookup_failure_propagates_and_consumes_the_annotation() {
    let api = Arc::new(MockApi {
        fail_case_lookup: true,
        ..MockApi::default()
    });
    let reporter = configured_reporter(api.clone()).await;

    reporter.annotate("test_login", Annotation::new(404));
    assert!(reporter.record_success("test_login").await.is_err());

    assert!(api.reports().is_empty());
    // The record was consumed before the lookup, so a retry finds nothing
    reporter.record_success("test_login").await.unwrap();
    assert!(api.reports().is_empty());
}

#[tokio::test]
async fn submission_failure_propagates() {
    let api = Arc::new(MockApi {
        fail_reports: true,
        ..MockApi::default()
    });
    let reporter = configured_reporter(api.clone()).await;

    reporter.annotate("test_login", Annotation::new(1234));
    let err = reporter.record_success("test_login").await.unwrap_err();
    assert!(err.to_string().contains("Failed to report case '1234'"));
}

#[tokio::test]
async fn notes_reach_the_submission_when_given() {
    let api = Arc::new(MockApi::default());
    let reporter = configured_reporter(api.clone()).await;

    reporter.annotate("test_login", Annotation::new(1234));
    reporter
        .record_outcome(
            "test_login",
            CaseStatus::Blocked,
            Some("environment down".to_string()),
        )
        .await
        .unwrap();

    let reports = api.reports();
    assert_eq!(reports[0].status, CaseStatus::Blocked);
    assert_eq!(reports[0].notes.as_deref(), Some("environment down"));
}

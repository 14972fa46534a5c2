use crate::config::ReporterConfig;
use crate::core::annotation::{Annotation, AnnotationRegistry};
use crate::core::client::{CaseReport, CaseStatus, TestPlan, TestlinkApi};
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// Note attached to builds this reporter creates
const GENERATED_BUILD_NOTES: &str = "Automated by testlink-reporter";

/// Current UTC time in the format used for generated build names
fn current_date_string() -> String {
    Utc::now().format("%Y-%m-%dt%H:%M:%S").to_string()
}

/// Pushes per-test verdicts to TestLink.
///
/// Configured once per test run; the host integration then calls one of the
/// outcome hooks after each test finishes. Tests announce themselves through
/// the [`AnnotationRegistry`] owned by this reporter, keyed by test identity,
/// so execution order never matters.
pub struct ResultReporter {
    api: Arc<dyn TestlinkApi>,
    config: ReporterConfig,
    /// Plan resolved from the configured project/plan names
    plan: TestPlan,
    /// Build every result of this run is attached to
    build_name: String,
    annotations: AnnotationRegistry,
}

impl ResultReporter {
    /// Resolves remote resources for the run.
    ///
    /// Fails fast: an unknown project or plan aborts configuration. When no
    /// build name is configured, one is synthesized as
    /// `Build-<UTC YYYY-MM-DDtHH:MM:SS>` and created on the plan. That is a
    /// remote side effect, so runs without an explicit build name each get a
    /// fresh build.
    pub async fn configure(config: ReporterConfig, api: Arc<dyn TestlinkApi>) -> Result<Self> {
        let plan = api
            .plan_by_name(&config.project_name, &config.plan_name)
            .await
            .with_context(|| {
                format!(
                    "Failed to resolve plan '{}' in project '{}'",
                    config.plan_name, config.project_name
                )
            })?;

        let build_name = match &config.build_name {
            Some(name) => name.clone(),
            None => {
                let name = format!("Build-{}", current_date_string());
                api.create_build(&plan, &name, GENERATED_BUILD_NOTES)
                    .await
                    .with_context(|| format!("Failed to create build '{name}'"))?;
                info!("Created build '{}' on plan '{}'", name, plan.name);
                name
            }
        };

        Ok(Self {
            api,
            config,
            plan,
            build_name,
            annotations: AnnotationRegistry::new(),
        })
    }

    /// Registry tests use to announce their TestLink case before running
    pub fn annotations(&self) -> &AnnotationRegistry {
        &self.annotations
    }

    /// Build results of this run are attached to
    pub fn build_name(&self) -> &str {
        &self.build_name
    }

    /// Registers an annotation for a test about to run
    pub fn annotate(&self, test_id: &str, annotation: Annotation) {
        self.annotations.annotate(test_id, annotation);
    }

    /// Outcome hook: the test passed
    pub async fn record_success(&self, test_id: &str) -> Result<()> {
        self.record_outcome(test_id, CaseStatus::Passed, None).await
    }

    /// Outcome hook: the test failed an assertion
    pub async fn record_failure(&self, test_id: &str) -> Result<()> {
        self.record_outcome(test_id, CaseStatus::Failed, None).await
    }

    /// Outcome hook: the test errored before completing
    pub async fn record_error(&self, test_id: &str) -> Result<()> {
        self.record_outcome(test_id, CaseStatus::Failed, None).await
    }

    /// Consumes the test's pending annotation and submits its result.
    ///
    /// A test with no pending annotation is not linked to TestLink; that is
    /// a silent no-op, which also makes a duplicate hook invocation harmless.
    /// Lookup and submission errors propagate to the caller unretried.
    pub async fn record_outcome(
        &self,
        test_id: &str,
        status: CaseStatus,
        notes: Option<String>,
    ) -> Result<()> {
        let Some(annotation) = self.annotations.take(test_id) else {
            debug!("No pending annotation for test '{}', skipping report", test_id);
            return Ok(());
        };

        let project_name = annotation
            .project_name
            .as_deref()
            .unwrap_or(&self.config.project_name);
        let plan_id = match &annotation.plan_name {
            Some(plan_name) => {
                self.api
                    .plan_by_name(project_name, plan_name)
                    .await
                    .with_context(|| {
                        format!("Failed to resolve plan '{plan_name}' in project '{project_name}'")
                    })?
                    .id
            }
            None => self.plan.id.clone(),
        };

        let case = self
            .api
            .case_by_external_id(&annotation.case_external_id)
            .await
            .with_context(|| {
                format!("Failed to resolve case '{}'", annotation.case_external_id)
            })?;

        let report = CaseReport {
            case_external_id: case.external_id,
            plan_id,
            status,
            build_name: self.build_name.clone(),
            platform_name: self.config.platform_name.clone(),
            overwrite: false,
            notes,
        };
        self.api
            .report_result(&report)
            .await
            .with_context(|| format!("Failed to report case '{}'", report.case_external_id))?;

        info!(
            "Reported case {} as {} for test '{}'",
            report.case_external_id, status, test_id
        );
        Ok(())
    }
}

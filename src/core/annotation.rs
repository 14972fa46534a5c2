use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

/// Metadata linking one test execution to a TestLink case.
///
/// The project and plan names are optional; when absent the reporter falls
/// back to its globally configured values at submission time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// External id of the case in TestLink (e.g. the `1234` in `PROJ-1234`)
    pub case_external_id: String,

    /// Project to resolve the case's plan in, overriding the configured one
    pub project_name: Option<String>,

    /// Plan to report against, overriding the configured one
    pub plan_name: Option<String>,
}

impl Annotation {
    /// Creates an annotation for a case, using the reporter's configured
    /// project and plan
    pub fn new(case_external_id: impl ToString) -> Self {
        Self {
            case_external_id: case_external_id.to_string(),
            project_name: None,
            plan_name: None,
        }
    }

    /// Overrides the project the case is resolved in
    pub fn with_project(mut self, project_name: impl Into<String>) -> Self {
        self.project_name = Some(project_name.into());
        self
    }

    /// Overrides the plan the result is reported against
    pub fn with_plan(mut self, plan_name: impl Into<String>) -> Self {
        self.plan_name = Some(plan_name.into());
        self
    }
}

/// Pending annotations, keyed by test identity.
///
/// At most one record is pending per test id; re-annotating the same test
/// before its outcome hook fires overwrites the previous record. Records are
/// consumed by [`take`](Self::take), so an outcome hook that fires twice for
/// the same test finds nothing the second time. A record whose hook never
/// fires (e.g. the process dies mid-test) simply stays behind.
#[derive(Debug, Default)]
pub struct AnnotationRegistry {
    pending: Mutex<HashMap<String, Annotation>>,
}

impl AnnotationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the annotation for a test, returning any record it replaced
    pub fn annotate(&self, test_id: &str, annotation: Annotation) -> Option<Annotation> {
        let mut pending = self.pending.lock().unwrap();
        let replaced = pending.insert(test_id.to_string(), annotation);
        if let Some(previous) = &replaced {
            warn!(
                "Replacing unconsumed annotation for test '{}' (case {})",
                test_id, previous.case_external_id
            );
        }
        replaced
    }

    /// Removes and returns the pending annotation for a test
    pub fn take(&self, test_id: &str) -> Option<Annotation> {
        self.pending.lock().unwrap().remove(test_id)
    }

    /// Number of annotations not yet consumed by an outcome hook
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Registers the annotation, then runs the test body.
    ///
    /// Transparent wrapper: the body's return value comes back unchanged and
    /// panics propagate. The annotation is recorded before the body runs, so
    /// it is pending (and consumable by the outcome hook) whatever the body
    /// does.
    pub fn run_annotated<T>(
        &self,
        test_id: &str,
        annotation: Annotation,
        test: impl FnOnce() -> T,
    ) -> T {
        self.annotate(test_id, annotation);
        test()
    }
}

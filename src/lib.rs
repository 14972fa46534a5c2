// Library interface for testlink-reporter
pub mod config;
pub mod core;

// Re-export commonly used types
pub use crate::config::{Config, ConfigError, ReporterConfig, TestlinkArgs, DEFAULT_ENDPOINT};
pub use crate::core::annotation::{Annotation, AnnotationRegistry};
pub use crate::core::client::{Build, CaseReport, CaseStatus, TestCase, TestPlan, TestlinkApi};
pub use crate::core::reporter::ResultReporter;
pub use crate::core::testlink::{ApiError, XmlRpcClient};

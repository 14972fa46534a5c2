//! XML-RPC client for the TestLink API.
//!
//! One HTTP POST per call, the developer key injected into every parameter
//! struct. No retry, no batching, no local caching: a failed lookup or
//! submission surfaces to the caller unchanged.

use crate::core::client::{Build, CaseReport, TestCase, TestPlan, TestlinkApi};
use crate::core::xmlrpc;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

/// Call-level failures reported by the TestLink server
#[derive(Debug, Error, PartialEq)]
pub enum ApiError {
    /// The server answered the call with its `{code, message}` error convention
    #[error("TestLink rejected {method}: {message} (code {code})")]
    Rejected {
        method: &'static str,
        code: i64,
        message: String,
    },

    /// The call succeeded but the payload is missing an expected field
    #[error("unexpected response shape from {method}: {detail}")]
    UnexpectedResponse {
        method: &'static str,
        detail: String,
    },
}

/// TestLink client speaking XML-RPC over HTTP
pub struct XmlRpcClient {
    http: reqwest::Client,
    endpoint: String,
    dev_key: String,
}

impl XmlRpcClient {
    pub fn new(endpoint: impl Into<String>, dev_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("Failed to construct HTTP client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            dev_key: dev_key.into(),
        })
    }

    /// Assembles the request body for a call, injecting the developer key.
    ///
    /// Every TestLink method authenticates through a `devKey` member of its
    /// parameter struct.
    fn request_body(&self, method: &str, mut params: Map<String, Value>) -> String {
        params.insert("devKey".to_string(), json!(self.dev_key));
        xmlrpc::encode_request(method, &params)
    }

    async fn call(&self, method: &'static str, params: Map<String, Value>) -> Result<Value> {
        let body = self.request_body(method, params);

        debug!("Calling {} at {}", method, self.endpoint);
        let response = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach TestLink at {}", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            bail!("TestLink returned HTTP {status} for {method}");
        }

        let text = response
            .text()
            .await
            .context("Failed to read TestLink response body")?;
        let value = xmlrpc::decode_response(&text)
            .with_context(|| format!("Invalid XML-RPC response to {method}"))?;
        check_api_error(method, value).map_err(Into::into)
    }
}

/// TestLink signals call-level errors inside a 200 response, as an array of
/// `{code, message}` structs. Map that convention onto [`ApiError`].
fn check_api_error(method: &'static str, value: Value) -> Result<Value, ApiError> {
    if let Some(first) = value.as_array().and_then(|items| items.first()) {
        if let (Some(code), Some(message)) = (first.get("code"), first.get("message")) {
            return Err(ApiError::Rejected {
                method,
                code: int_of(code),
                message: text_of(message),
            });
        }
    }
    Ok(value)
}

/// Some TestLink endpoints wrap their single result struct in an array
fn first_record(value: &Value) -> &Value {
    match value.as_array().and_then(|items| items.first()) {
        Some(first) => first,
        None => value,
    }
}

/// Reads a field as text; TestLink returns ids both as strings and as ints
fn str_field(record: &Value, key: &str, method: &'static str) -> Result<String, ApiError> {
    record
        .get(key)
        .map(text_of)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| ApiError::UnexpectedResponse {
            method,
            detail: format!("missing field '{key}'"),
        })
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn int_of(value: &Value) -> i64 {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0)
}

#[async_trait]
impl TestlinkApi for XmlRpcClient {
    async fn plan_by_name(&self, project_name: &str, plan_name: &str) -> Result<TestPlan> {
        let method = "tl.getTestPlanByName";
        let mut params = Map::new();
        params.insert("testprojectname".to_string(), json!(project_name));
        params.insert("testplanname".to_string(), json!(plan_name));

        let value = self.call(method, params).await?;
        let record = first_record(&value);
        Ok(TestPlan {
            id: str_field(record, "id", method)?,
            name: plan_name.to_string(),
        })
    }

    async fn case_by_external_id(&self, external_id: &str) -> Result<TestCase> {
        let method = "tl.getTestCase";
        let mut params = Map::new();
        params.insert("testcaseexternalid".to_string(), json!(external_id));

        let value = self.call(method, params).await?;
        let record = first_record(&value);
        let id = str_field(record, "id", method)
            .or_else(|_| str_field(record, "testcase_id", method))?;
        let name = record.get("name").map(text_of).unwrap_or_default();
        Ok(TestCase {
            id,
            external_id: external_id.to_string(),
            name,
        })
    }

    async fn create_build(&self, plan: &TestPlan, name: &str, notes: &str) -> Result<Build> {
        let method = "tl.createBuild";
        let mut params = Map::new();
        params.insert("testplanid".to_string(), json!(plan.id));
        params.insert("buildname".to_string(), json!(name));
        params.insert("buildnotes".to_string(), json!(notes));

        let value = self.call(method, params).await?;
        let record = first_record(&value);
        Ok(Build {
            id: str_field(record, "id", method)?,
            name: name.to_string(),
        })
    }

    async fn report_result(&self, report: &CaseReport) -> Result<()> {
        let method = "tl.reportTCResult";
        let mut params = Map::new();
        params.insert(
            "testcaseexternalid".to_string(),
            json!(report.case_external_id),
        );
        params.insert("testplanid".to_string(), json!(report.plan_id));
        params.insert("status".to_string(), json!(report.status.code()));
        params.insert("buildname".to_string(), json!(report.build_name));
        params.insert("platformname".to_string(), json!(report.platform_name));
        params.insert("overwrite".to_string(), json!(report.overwrite));
        if let Some(notes) = &report.notes {
            params.insert("notes".to_string(), json!(notes));
        }

        let value = self.call(method, params).await?;
        let record = first_record(&value);
        let accepted = record
            .get("status")
            .map(|status| status == &json!(true) || text_of(status) == "1")
            .unwrap_or(false);
        if !accepted {
            let message = record.get("message").map(text_of).unwrap_or_default();
            return Err(ApiError::Rejected {
                method,
                code: record.get("code").map(int_of).unwrap_or(0),
                message,
            }
            .into());
        }
        Ok(())
    }
}

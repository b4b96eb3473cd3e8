//! Scheduler backed by the database's `pg_cron` extension.
//!
//! The job target is rendered to a `net.http_post(...)` / `net.http_get(...)`
//! SQL call and handed to the `schedule_cron_job` stored procedure over
//! PostgREST. The procedure unschedules any job with the same name before
//! scheduling the new one.

use crate::{SchedulerError, SchedulerFactory, SchedulerInterface, SchedulerRegistry};
use async_trait::async_trait;
use expiry_types::{
	non_empty, BackendConfig, ConfigSchema, Field, FieldType, HttpMethod, ImplementationRegistry,
	JobTarget, ScheduledJob, Schema, SecretString, ValidationError,
};
use std::time::Duration;

/// pg_cron scheduler client.
pub struct PgCronScheduler {
	client: reqwest::Client,
	rest_url: String,
	service_key: SecretString,
	/// Name of the upsert stored procedure.
	procedure: String,
}

impl PgCronScheduler {
	pub fn new(backend: &BackendConfig, procedure: impl Into<String>) -> Result<Self, SchedulerError> {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(backend.timeout_seconds))
			.build()
			.map_err(|e| SchedulerError::Configuration(e.to_string()))?;

		Ok(Self {
			client,
			rest_url: backend.rest_url(),
			service_key: backend.service_role_key.clone(),
			procedure: procedure.into(),
		})
	}
}

/// Quotes a string as a SQL literal.
fn sql_literal(value: &str) -> String {
	format!("'{}'", value.replace('\'', "''"))
}

/// Renders a job target as the SQL statement pg_cron executes.
pub fn render_http_call(target: &JobTarget) -> String {
	let headers: serde_json::Map<String, serde_json::Value> = target
		.headers
		.iter()
		.map(|(name, value)| (name.clone(), serde_json::Value::String(value.clone())))
		.collect();
	let headers = serde_json::Value::Object(headers).to_string();

	match target.method {
		HttpMethod::Post => format!(
			"select net.http_post(url:={}, headers:={}::jsonb, body:={}::jsonb) as request_id;",
			sql_literal(&target.url),
			sql_literal(&headers),
			sql_literal(&target.body.to_string()),
		),
		HttpMethod::Get => format!(
			"select net.http_get(url:={}, headers:={}::jsonb) as request_id;",
			sql_literal(&target.url),
			sql_literal(&headers),
		),
	}
}

#[async_trait]
impl SchedulerInterface for PgCronScheduler {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(PgCronSchedulerSchema)
	}

	async fn upsert_job(&self, job: &ScheduledJob) -> Result<(), SchedulerError> {
		let url = format!("{}/rpc/{}", self.rest_url, self.procedure);
		let payload = serde_json::json!({
			"job_name": job.name,
			"schedule": job.schedule,
			"command": render_http_call(&job.target),
		});

		let response = self
			.client
			.post(url)
			.header("apikey", self.service_key.expose_secret())
			.header("Authorization", self.service_key.bearer())
			.json(&payload)
			.send()
			.await
			.map_err(|e| SchedulerError::Network(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(SchedulerError::Backend(format!(
				"rpc {} failed with {}: {}",
				self.procedure,
				status,
				body.trim()
			)));
		}
		Ok(())
	}
}

/// Configuration schema for PgCronScheduler.
pub struct PgCronSchedulerSchema;

impl ConfigSchema for PgCronSchedulerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new("procedure", FieldType::String).with_validator(non_empty)],
		);
		schema.validate(config)
	}
}

/// Factory function to create a pg_cron scheduler from configuration.
///
/// Configuration parameters:
/// - `procedure`: upsert stored procedure (default: "schedule_cron_job")
pub fn create_scheduler(
	config: &toml::Value,
	backend: &BackendConfig,
) -> Result<Box<dyn SchedulerInterface>, SchedulerError> {
	PgCronSchedulerSchema
		.validate(config)
		.map_err(|e| SchedulerError::Configuration(e.to_string()))?;

	let procedure = config
		.get("procedure")
		.and_then(|v| v.as_str())
		.unwrap_or("schedule_cron_job");

	Ok(Box::new(PgCronScheduler::new(backend, procedure)?))
}

/// Registry for the pg_cron scheduler.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "pg_cron";
	type Factory = SchedulerFactory;

	fn factory() -> Self::Factory {
		create_scheduler
	}
}

impl SchedulerRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use wiremock::matchers::{body_partial_json, header, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn backend(url: &str) -> BackendConfig {
		BackendConfig {
			url: url.to_string(),
			service_role_key: "service-key".into(),
			anon_key: "anon-key".into(),
			timeout_seconds: 5,
		}
	}

	fn hourly_job() -> ScheduledJob {
		ScheduledJob::new(
			"expire-orders-hourly",
			"0 * * * *",
			JobTarget::post_json(
				"https://x.test/functions/v1/expire-orders",
				"anon-key",
				serde_json::json!({ "scheduled": true }),
			),
		)
	}

	#[test]
	fn test_shipped_procedure_upserts_by_name() {
		let sql = include_str!("../../../../migrations/002_schedule_cron_job.sql");
		assert!(sql.contains("function public.schedule_cron_job("));
		for param in ["job_name text", "schedule text", "command text"] {
			assert!(sql.contains(param), "missing {}", param);
		}
		let unschedule = sql.find("cron.unschedule(").unwrap();
		let schedule = sql.find("cron.schedule(").unwrap();
		assert!(unschedule < schedule);
	}

	#[test]
	fn test_render_post_call() {
		let sql = render_http_call(&hourly_job().target);
		assert_eq!(
			sql,
			concat!(
				"select net.http_post(url:='https://x.test/functions/v1/expire-orders', ",
				"headers:='{\"Authorization\":\"Bearer anon-key\",\"Content-Type\":\"application/json\"}'::jsonb, ",
				"body:='{\"scheduled\":true}'::jsonb) as request_id;"
			)
		);
	}

	#[test]
	fn test_render_escapes_quotes() {
		let target = JobTarget::post_json(
			"https://x.test/fn",
			"a'b",
			serde_json::json!({ "note": "it's" }),
		);
		let sql = render_http_call(&target);
		assert!(sql.contains("Bearer a''b"));
		assert!(sql.contains("it''s"));
		assert!(!sql.contains("a'b"));
	}

	#[tokio::test]
	async fn test_upsert_calls_procedure() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/rest/v1/rpc/schedule_cron_job"))
			.and(header("apikey", "service-key"))
			.and(header("Authorization", "Bearer service-key"))
			.and(body_partial_json(serde_json::json!({
				"job_name": "expire-orders-hourly",
				"schedule": "0 * * * *",
			})))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(42)))
			.expect(1)
			.mount(&server)
			.await;

		let scheduler = PgCronScheduler::new(&backend(&server.uri()), "schedule_cron_job").unwrap();
		scheduler.upsert_job(&hourly_job()).await.unwrap();
	}

	#[tokio::test]
	async fn test_upsert_failure_is_backend_error() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/rest/v1/rpc/schedule_cron_job"))
			.respond_with(
				ResponseTemplate::new(400).set_body_string("schema \"cron\" does not exist"),
			)
			.mount(&server)
			.await;

		let scheduler = PgCronScheduler::new(&backend(&server.uri()), "schedule_cron_job").unwrap();
		let err = scheduler.upsert_job(&hourly_job()).await.unwrap_err();
		assert!(matches!(err, SchedulerError::Backend(_)));
		assert!(err.to_string().contains("does not exist"));
	}

	#[tokio::test]
	async fn test_list_jobs_unsupported() {
		let scheduler = PgCronScheduler::new(&backend("https://x.test"), "schedule_cron_job").unwrap();
		assert!(matches!(
			scheduler.list_jobs().await,
			Err(SchedulerError::Unsupported(_))
		));
	}
}

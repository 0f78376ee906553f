//! Daily-update orchestration: pluggable opportunity sources, upserts, and
//! stale-record cleanup.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobmatch_core::Opportunity;
use jobmatch_store::UpdateLog;
use rand::Rng;
use serde::Serialize;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobmatch-update";

/// Records older than this are deactivated on every update pass.
pub const STALE_AFTER_DAYS: i64 = 30;

#[derive(Debug, Clone)]
pub struct UpdateConfig {
    pub scheduler_enabled: bool,
    pub update_cron: String,
    pub http_timeout_secs: u64,
    pub external_source_urls: Vec<String>,
}

impl UpdateConfig {
    pub fn from_env() -> Self {
        Self {
            scheduler_enabled: std::env::var("JOBMATCH_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            update_cron: std::env::var("JOBMATCH_UPDATE_CRON")
                .unwrap_or_else(|_| "0 0 6 * * *".to_string()),
            http_timeout_secs: std::env::var("JOBMATCH_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            external_source_urls: std::env::var("JOBMATCH_EXTERNAL_SOURCES")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// Where new opportunity records come from. The synthetic variant stands in
/// for real job-board feeds; an external feed slots in without touching the
/// pipeline.
#[async_trait]
pub trait OpportunitySource: Send + Sync {
    fn label(&self) -> &str;
    async fn fetch(&self) -> Result<Vec<Opportunity>>;
}

const COMPANIES: &[&str] = &[
    "TechCorp",
    "InnovateLabs",
    "FutureStack",
    "CodeCraft",
    "DataDrive",
    "CloudWorks",
];

const POSITIONS: &[&str] = &[
    "Senior Full Stack Developer",
    "Product Manager",
    "Data Scientist",
    "DevOps Engineer",
    "UX/UI Designer",
    "Backend Engineer",
    "Frontend Developer",
    "Machine Learning Engineer",
];

const CATEGORY_POOL: &[(&str, &[&str])] = &[
    ("tech", &["it", "ai", "data"]),
    ("career", &["software", "internship"]),
    ("managers", &["general", "operations"]),
];

const TYPES: &[&str] = &["full-time", "contract", "part-time"];

const LOCATIONS: &[&str] = &[
    "Remote",
    "San Francisco, CA",
    "New York, NY",
    "Austin, TX",
    "Seattle, WA",
    "Boston, MA",
];

const SKILL_SETS: &[&[&str]] = &[
    &["JavaScript", "React", "Node.js", "TypeScript"],
    &["Python", "Django", "PostgreSQL", "AWS"],
    &["Java", "Spring Boot", "MySQL", "Docker"],
    &["React", "Vue.js", "CSS", "HTML"],
    &["Python", "TensorFlow", "PyTorch", "MLOps"],
    &["Kubernetes", "Docker", "CI/CD", "AWS"],
    &["Figma", "Adobe XD", "CSS", "JavaScript"],
];

/// Generates a small batch (2-4) of mock postings with fresh timestamps.
pub fn generate_opportunities(rng: &mut impl Rng, now: DateTime<Utc>) -> Vec<Opportunity> {
    let count = rng.gen_range(2..=4);
    (0..count)
        .map(|i| {
            let company = COMPANIES[rng.gen_range(0..COMPANIES.len())];
            let position = POSITIONS[rng.gen_range(0..POSITIONS.len())];
            let (category, subcategories) = CATEGORY_POOL[rng.gen_range(0..CATEGORY_POOL.len())];
            let subcategory = subcategories[rng.gen_range(0..subcategories.len())];
            let employment_type = TYPES[rng.gen_range(0..TYPES.len())];
            let location = LOCATIONS[rng.gen_range(0..LOCATIONS.len())];
            let skills = SKILL_SETS[rng.gen_range(0..SKILL_SETS.len())];
            let salary_base = rng.gen_range(80..160);
            let salary_top = salary_base + rng.gen_range(20..60);
            let company_slug = company.to_lowercase().replace(' ', "");

            Opportunity {
                id: format!("webhook_{}_{}", now.timestamp_millis(), i),
                company: company.to_string(),
                title: position.to_string(),
                category: category.to_string(),
                subcategory: Some(subcategory.to_string()),
                employment_type: Some(employment_type.to_string()),
                salary_range: Some(format!("${salary_base}k - ${salary_top}k")),
                url: Some(format!(
                    "https://jobs.{company_slug}.com/position-{}-{}",
                    now.timestamp_millis(),
                    i
                )),
                location: Some(location.to_string()),
                skills: skills.iter().map(|s| s.to_string()).collect(),
                experience: Some(format!("{}+ years", rng.gen_range(1..=5))),
                description: format!(
                    "Join {company} as a {position} and help build innovative solutions. \
                     Work with cutting-edge technologies and a talented team in a \
                     collaborative environment."
                ),
                is_active: true,
                created_at: now,
                updated_at: now,
            }
        })
        .collect()
}

/// The current mock behavior: random postings drawn from fixed pools.
pub struct SyntheticSource;

#[async_trait]
impl OpportunitySource for SyntheticSource {
    fn label(&self) -> &str {
        "synthetic"
    }

    async fn fetch(&self) -> Result<Vec<Opportunity>> {
        Ok(generate_opportunities(&mut rand::thread_rng(), Utc::now()))
    }
}

/// Fetches a JSON array of opportunities from a remote feed.
pub struct ExternalSource {
    label: String,
    url: String,
    client: reqwest::Client,
}

impl ExternalSource {
    pub fn new(
        label: impl Into<String>,
        url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(timeout)
            .build()
            .context("building feed http client")?;
        Ok(Self {
            label: label.into(),
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl OpportunitySource for ExternalSource {
    fn label(&self) -> &str {
        &self.label
    }

    async fn fetch(&self) -> Result<Vec<Opportunity>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .with_context(|| format!("fetching {}", self.url))?;
        response
            .json::<Vec<Opportunity>>()
            .await
            .with_context(|| format!("decoding {}", self.url))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateSummary {
    pub run_id: Uuid,
    pub opportunities_updated: usize,
    pub deactivated: u64,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

pub struct UpdatePipeline {
    sources: Vec<Box<dyn OpportunitySource>>,
}

impl UpdatePipeline {
    pub fn new(sources: Vec<Box<dyn OpportunitySource>>) -> Self {
        Self { sources }
    }

    /// Synthetic source plus one external feed per configured URL.
    pub fn from_config(config: &UpdateConfig) -> Result<Self> {
        let mut sources: Vec<Box<dyn OpportunitySource>> = vec![Box::new(SyntheticSource)];
        let timeout = Duration::from_secs(config.http_timeout_secs);
        for url in &config.external_source_urls {
            sources.push(Box::new(ExternalSource::new(url.clone(), url.clone(), timeout)?));
        }
        Ok(Self::new(sources))
    }

    /// One update pass: gather from every source, upsert and clean up when a
    /// database is present, append an audit row. Storage failures are logged
    /// and never escape; the caller always gets a summary.
    pub async fn run_once(&self, pool: Option<&PgPool>, trigger: &str) -> UpdateSummary {
        let run_id = Uuid::new_v4();
        let now = Utc::now();

        let mut gathered = Vec::new();
        for source in &self.sources {
            match source.fetch().await {
                Ok(records) => {
                    info!(
                        source = source.label(),
                        count = records.len(),
                        "fetched opportunities"
                    );
                    gathered.extend(records);
                }
                Err(err) => {
                    warn!(source = source.label(), error = %err, "source fetch failed, skipping");
                }
            }
        }

        let mut status = "success".to_string();
        let mut error_message = None;
        let mut deactivated = 0;

        if let Some(pool) = pool {
            if let Err(err) = jobmatch_store::upsert_opportunities(pool, &gathered).await {
                warn!(error = %err, "database update failed, update still reported as processed");
                status = "error".to_string();
                error_message = Some(err.to_string());
            }

            let cutoff = now - chrono::Duration::days(STALE_AFTER_DAYS);
            match jobmatch_store::deactivate_older_than(pool, cutoff).await {
                Ok(count) => {
                    deactivated = count;
                    if count > 0 {
                        info!(count, "deactivated stale opportunities");
                    }
                }
                Err(err) => warn!(error = %err, "stale-record cleanup failed"),
            }

            let log = UpdateLog {
                id: format!("{trigger}_{}", now.timestamp_millis()),
                action: "daily_update".to_string(),
                opportunities_updated: gathered.len() as i32,
                status: status.clone(),
                error_message,
                details: serde_json::json!({
                    "source": trigger,
                    "timestamp": now.to_rfc3339(),
                    "opportunities_count": gathered.len(),
                }),
            };
            if let Err(err) = jobmatch_store::insert_update_log(pool, &log).await {
                warn!(error = %err, "failed to record update log");
            }
        }

        UpdateSummary {
            run_id,
            opportunities_updated: gathered.len(),
            deactivated,
            status,
            timestamp: now,
            source: trigger.to_string(),
        }
    }
}

/// Builds the cron-driven update job when enabled; the scheduler fires the
/// same pipeline the webhook does.
pub async fn maybe_build_scheduler(
    config: &UpdateConfig,
    pipeline: Arc<UpdatePipeline>,
    pool: Option<PgPool>,
) -> Result<Option<JobScheduler>> {
    if !config.scheduler_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let cron = config.update_cron.clone();
    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let pipeline = pipeline.clone();
        let pool = pool.clone();
        Box::pin(async move {
            let summary = pipeline.run_once(pool.as_ref(), "scheduled").await;
            info!(
                run_id = %summary.run_id,
                updated = summary.opportunities_updated,
                status = %summary.status,
                "scheduled daily update finished"
            );
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    Ok(Some(sched))
}

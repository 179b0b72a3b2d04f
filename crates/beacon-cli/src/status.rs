//! Build-status source client.
//!
//! Queries a Jenkins view's JSON API for the per-job `color` markers and
//! reduces them to a single failing-job count.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Jenkins ball colors that count as a failing job.
pub const FAILED_JOB_COLORS: &[&str] = &["yellow", "red"];

/// Response body of `/api/json?tree=jobs[color]`.
#[derive(Debug, Deserialize)]
struct ViewStatus {
    #[serde(default)]
    jobs: Vec<Job>,
}

#[derive(Debug, Deserialize)]
struct Job {
    /// Absent for non-job entries such as folders.
    color: Option<String>,
}

/// Blocking client for one Jenkins view.
pub struct StatusClient {
    client: reqwest::blocking::Client,
    api_url: String,
}

impl StatusClient {
    /// Build a client for the given view URL
    /// (e.g. `http://jenkins.example.com/view/Main`).
    ///
    /// No explicit request timeout is set beyond the transport default; a
    /// hung status source stalls the iteration, not the teardown.
    pub fn new(view_url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: format!(
                "{}/api/json?tree=jobs[color]",
                view_url.trim_end_matches('/')
            ),
        })
    }

    /// Number of jobs currently failing, per the view's color markers.
    pub fn failed_job_count(&self) -> Result<u32> {
        let response = self
            .client
            .get(&self.api_url)
            .send()
            .with_context(|| format!("Status query to {} failed", self.api_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            anyhow::bail!("Status source returned {status}, content:\n{body}");
        }

        let view: ViewStatus = response
            .json()
            .context("Failed to parse status source response")?;

        Ok(count_failed(&view.jobs))
    }
}

fn count_failed(jobs: &[Job]) -> u32 {
    jobs.iter()
        .filter(|job| {
            job.color
                .as_deref()
                .is_some_and(|color| FAILED_JOB_COLORS.contains(&color))
        })
        .count() as u32
}

//! Fleet outcome aggregation and console summary

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::upgrade::report::{JobOutcome, JobReport};

/// Exit status when every job completed
pub const EXIT_OK: u8 = 0;

/// Exit status when at least one job failed
pub const EXIT_JOB_FAILED: u8 = 1;

/// Aggregate of every device's job report, in launch order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub jobs: Vec<JobReport>,
}

impl FleetReport {
    pub fn single(job: JobReport) -> Self {
        Self {
            started_at: job.started_at,
            finished_at: job.finished_at,
            jobs: vec![job],
        }
    }

    pub fn completed(&self) -> usize {
        self.jobs.iter().filter(|j| !j.is_failed()).count()
    }

    pub fn failed(&self) -> usize {
        self.jobs.iter().filter(|j| j.is_failed()).count()
    }

    pub fn any_failed(&self) -> bool {
        self.jobs.iter().any(JobReport::is_failed)
    }

    pub fn exit_code(&self) -> u8 {
        if self.any_failed() {
            EXIT_JOB_FAILED
        } else {
            EXIT_OK
        }
    }

    pub fn job(&self, hostname: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|j| j.hostname == hostname)
    }
}

/// Print one line per device plus totals
pub fn print_summary(report: &FleetReport) {
    println!();
    println!("{}", "═".repeat(70).bright_black());
    println!("{}", "Upgrade summary".cyan().bold());
    println!("{}", "═".repeat(70).bright_black());

    for job in &report.jobs {
        let mode = if job.dry_run { " (dry run)" } else { "" };
        match &job.outcome {
            JobOutcome::Completed => {
                let version = job
                    .version_after
                    .as_deref()
                    .or(job.version_before.as_deref())
                    .unwrap_or("unknown");
                println!(
                    "{} {} {}{}",
                    "✓".green().bold(),
                    job.hostname.as_str().bold(),
                    format!("completed, running {}", version).as_str().green(),
                    mode.bright_black()
                );
            }
            JobOutcome::Failed {
                kind,
                step,
                message,
            } => {
                println!(
                    "{} {} {}{}",
                    "✗".red().bold(),
                    job.hostname.as_str().bold(),
                    format!("failed at {} ({})", step, kind).as_str().red(),
                    mode.bright_black()
                );
                println!("    {}", message.as_str().bright_black());
            }
        }

        for action in &job.planned_actions {
            println!("    {} would {}", "→".cyan(), action);
        }
        if let Some(diff) = &job.diff {
            println!("    {} {}", "Δ".cyan(), diff);
        }
        if let Some(artifact) = &job.report {
            println!("    {} {}", "report".bright_black(), artifact.path.display());
        }
    }

    println!();
    let totals = format!(
        "{} completed, {} failed, {} total",
        report.completed(),
        report.failed(),
        report.jobs.len()
    );
    if report.any_failed() {
        println!("{}", totals.as_str().red().bold());
    } else {
        println!("{}", totals.as_str().green().bold());
    }
}

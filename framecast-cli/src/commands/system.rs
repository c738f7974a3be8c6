//! Health and metrics command handlers

use anyhow::Result;
use colored::*;
use framecast_client::OrchestratorClient;
use framecast_core::dto::health::HealthStatus;

use crate::config::Config;

/// Check orchestrator health
pub async fn health(config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match client.health().await {
        Ok(response) => match response.status {
            HealthStatus::Ok => {
                println!("{} Orchestrator is healthy", "✓".green());
                Ok(())
            }
            HealthStatus::Unhealthy => {
                println!("{} Orchestrator is up but its queue is unreachable", "✗".red());
                anyhow::bail!("queue backend unreachable")
            }
        },
        Err(e) => {
            println!(
                "{} Cannot reach orchestrator at {}",
                "✗".red(),
                client.base_url().dimmed()
            );
            Err(e.into())
        }
    }
}

/// Show the orchestrator's job metrics
pub async fn metrics(config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);
    let snapshot = client.metrics().await?;

    println!("{}", "Job Metrics:".bold());
    println!("  Created:      {}", snapshot.jobs_created);
    println!("  Completed:    {}", snapshot.jobs_completed.to_string().green());
    println!("  Failed:       {}", snapshot.jobs_failed.to_string().red());
    println!("  In progress:  {}", snapshot.jobs_in_progress.to_string().cyan());

    if snapshot.job_duration_count > 0 {
        let mean = snapshot.job_duration_sum_seconds / snapshot.job_duration_count as f64;
        println!(
            "  Mean duration: {:.1}s over {} execution(s)",
            mean, snapshot.job_duration_count
        );
    }

    Ok(())
}

//! Job command handlers
//!
//! Handles submission, status queries, waiting and result downloads.

use anyhow::{Context, Result};
use colored::*;
use framecast_client::{OrchestratorClient, ResultDownload};
use framecast_core::dto::job::{ReportedStatus, StatusResponse};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::Config;

/// Upload an image, optionally waiting for the video
pub async fn submit(config: &Config, file: &Path, wait_for_video: bool, output: Option<PathBuf>) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    let submitted = client
        .submit_file(file)
        .await
        .with_context(|| format!("Failed to submit {}", file.display()))?;

    println!("{}", "✓ Job submitted successfully!".green().bold());
    println!("  ID:     {}", submitted.task_id.to_string().cyan());
    println!("  Status: {}", submitted.status.to_string().yellow());
    println!("  Output: {}", submitted.output_ref.dimmed());

    if wait_for_video {
        println!();
        let output = output
            .unwrap_or_else(|| default_destination(submitted.task_id, Some(&submitted.output_ref)));
        wait_with(&client, submitted.task_id, Duration::from_secs(2), None, Some(output)).await?;
    }

    Ok(())
}

/// Show the status of a job
pub async fn status(config: &Config, id: Uuid) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);
    let status = client.get_status(id).await?;

    print_status(&status);

    if status.status == ReportedStatus::NotFound {
        anyhow::bail!("job {} not found", id);
    }

    Ok(())
}

/// Download the video of a job
pub async fn result(config: &Config, id: Uuid, output: Option<PathBuf>) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);
    download(&client, id, output).await
}

/// Poll a job until it reaches a final status
pub async fn wait(
    config: &Config,
    id: Uuid,
    interval: u64,
    timeout: Option<u64>,
    output: Option<PathBuf>,
) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);
    wait_with(
        &client,
        id,
        Duration::from_secs(interval.max(1)),
        timeout.map(Duration::from_secs),
        output,
    )
    .await
}

async fn wait_with(
    client: &OrchestratorClient,
    id: Uuid,
    interval: Duration,
    timeout: Option<Duration>,
    output: Option<PathBuf>,
) -> Result<()> {
    let started = Instant::now();
    let mut last = None;

    let status = loop {
        let status = client.get_status(id).await?;

        if last != Some(status.status) {
            println!(
                "{} {} is {}",
                "▸".cyan(),
                id.to_string().dimmed(),
                colorize_status(status.status)
            );
            last = Some(status.status);
        }

        if is_final(status.status) {
            break status;
        }

        if let Some(timeout) = timeout {
            if started.elapsed() >= timeout {
                anyhow::bail!("timed out after {}s waiting for job {}", timeout.as_secs(), id);
            }
        }

        tokio::time::sleep(interval).await;
    };

    println!();
    print_status(&status);

    match status.status {
        ReportedStatus::Succeeded => {
            if let Some(output) = output {
                println!();
                download(client, id, Some(output)).await?;
            }
            Ok(())
        }
        ReportedStatus::Failed => anyhow::bail!("job {} failed", id),
        _ => anyhow::bail!("job {} not found", id),
    }
}

async fn download(client: &OrchestratorClient, id: Uuid, output: Option<PathBuf>) -> Result<()> {
    let dest = match output {
        Some(path) => path,
        None => {
            let status = client.get_status(id).await?;
            default_destination(id, status.output_ref.as_deref())
        }
    };

    match client.download_result(id, &dest).await? {
        ResultDownload::Saved {
            path,
            bytes,
            content_type,
        } => {
            println!("{}", "✓ Video downloaded".green().bold());
            println!("  File: {}", path.display().to_string().cyan());
            println!("  Size: {}", format_bytes(bytes));
            if let Some(content_type) = content_type {
                println!("  Type: {}", content_type.dimmed());
            }
            Ok(())
        }
        ResultDownload::Unavailable(reason) => {
            println!(
                "{} No video for job {} ({})",
                "✗".red(),
                id.to_string().dimmed(),
                colorize_status(reason.status)
            );
            anyhow::bail!(reason.error)
        }
    }
}

fn is_final(status: ReportedStatus) -> bool {
    matches!(
        status,
        ReportedStatus::Succeeded | ReportedStatus::Failed | ReportedStatus::NotFound
    )
}

/// `./<file name of the output locator>`, or `./<id>.mp4` when unknown
fn default_destination(id: Uuid, output_ref: Option<&str>) -> PathBuf {
    output_ref
        .and_then(|r| Path::new(r).file_name())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(format!("{}.mp4", id)))
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Print detailed job status
fn print_status(status: &StatusResponse) {
    println!("{}", "Job Status:".bold());
    println!("  ID:      {}", status.task_id.to_string().cyan());
    println!("  Status:  {}", colorize_status(status.status));

    if let Some(retries) = status.retry_count {
        println!("  Retries: {}", retries);
    }

    if let Some(output_ref) = &status.output_ref {
        println!("  Output:  {}", output_ref.dimmed());
    }

    if let Some(result) = &status.result {
        println!("\n{}", "Video:".bold());
        println!("  Frames:     {} at {} fps", result.frame_count, result.fps);
        println!("  Resolution: {}x{}", result.width, result.height);
        println!("  Size:       {}", format_bytes(result.size_bytes));
        println!("  Took:       {:.1}s", result.elapsed_ms as f64 / 1000.0);
    }

    if let Some(error) = &status.error {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}

/// Colorize job status for display
fn colorize_status(status: ReportedStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        ReportedStatus::Queued => status_str.yellow(),
        ReportedStatus::Running => status_str.cyan(),
        ReportedStatus::Succeeded => status_str.green(),
        ReportedStatus::Failed => status_str.red(),
        ReportedStatus::NotFound => status_str.dimmed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_destination_uses_output_file_name() {
        let id = Uuid::new_v4();
        let dest = default_destination(id, Some(&format!("/srv/results/{}.gif", id)));
        assert_eq!(dest, PathBuf::from(format!("{}.gif", id)));

        let dest = default_destination(id, None);
        assert_eq!(dest, PathBuf::from(format!("{}.mp4", id)));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024 + 512 * 1024), "5.5 MiB");
    }

    #[test]
    fn test_final_statuses() {
        assert!(!is_final(ReportedStatus::Queued));
        assert!(!is_final(ReportedStatus::Running));
        assert!(is_final(ReportedStatus::Succeeded));
        assert!(is_final(ReportedStatus::Failed));
        assert!(is_final(ReportedStatus::NotFound));
    }
}

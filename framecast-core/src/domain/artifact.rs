//! Artifact locators
//!
//! Input and output locators are derived from the job id so that the
//! orchestrator can report an output location before the job has run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Container format of the produced video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    Mp4,
    Gif,
}

impl VideoFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Gif => "gif",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "video/mp4",
            VideoFormat::Gif => "image/gif",
        }
    }

    /// Infers the format from a locator's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        ext.parse().ok()
    }
}

impl std::str::FromStr for VideoFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp4" => Ok(VideoFormat::Mp4),
            "gif" => Ok(VideoFormat::Gif),
            other => Err(format!("unsupported video format '{}'", other)),
        }
    }
}

impl std::fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// `{upload_dir}/{id}_{filename}` with the client filename reduced to a safe basename
pub fn input_ref_for(upload_dir: &Path, id: Uuid, filename: Option<&str>) -> PathBuf {
    let name = filename.map(sanitize_filename).unwrap_or_default();
    if name.is_empty() {
        upload_dir.join(format!("{}_upload", id))
    } else {
        upload_dir.join(format!("{}_{}", id, name))
    }
}

/// `{results_dir}/{id}.{ext}`
pub fn output_ref_for(results_dir: &Path, id: Uuid, format: VideoFormat) -> PathBuf {
    results_dir.join(format!("{}.{}", id, format.extension()))
}

/// Keeps the last path component and replaces anything outside `[A-Za-z0-9._-]`
fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_ref_is_deterministic() {
        let id = Uuid::new_v4();
        let a = output_ref_for(Path::new("/data/results"), id, VideoFormat::Mp4);
        let b = output_ref_for(Path::new("/data/results"), id, VideoFormat::Mp4);
        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from(format!("/data/results/{}.mp4", id)));
    }

    #[test]
    fn test_input_ref_strips_directories() {
        let id = Uuid::new_v4();
        let path = input_ref_for(Path::new("/up"), id, Some("../../etc/pass wd.png"));
        assert_eq!(path, PathBuf::from(format!("/up/{}_pass_wd.png", id)));
    }

    #[test]
    fn test_input_ref_without_filename() {
        let id = Uuid::new_v4();
        let path = input_ref_for(Path::new("/up"), id, None);
        assert_eq!(path, PathBuf::from(format!("/up/{}_upload", id)));
        let hidden = input_ref_for(Path::new("/up"), id, Some("..."));
        assert_eq!(hidden, PathBuf::from(format!("/up/{}_upload", id)));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            VideoFormat::from_path(Path::new("/r/x.MP4")),
            Some(VideoFormat::Mp4)
        );
        assert_eq!(
            VideoFormat::from_path(Path::new("/r/x.gif")),
            Some(VideoFormat::Gif)
        );
        assert_eq!(VideoFormat::from_path(Path::new("/r/x.avi")), None);
        assert_eq!(VideoFormat::from_path(Path::new("/r/x")), None);
    }
}

//! Video models
//!
//! A model is the expensive resource of a worker: it is loaded once at
//! startup, handed to each job by `&mut` reference, and released when the
//! worker exits. Nothing else in the process may hold it.

mod motion;
mod process;

pub use motion::MotionModelLoader;
pub use process::ProcessModelLoader;

use async_trait::async_trait;
use framecast_core::domain::params::GenerationParams;
use image::RgbImage;

use crate::config::{Config, ModelBackend};

/// One generated video frame
pub type Frame = RgbImage;

/// Model error type
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to load model: {0}")]
    Load(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("model produced no frames")]
    NoFrames,

    #[error("model I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Image-to-video model
#[async_trait]
pub trait VideoModel: Send {
    fn name(&self) -> &str;

    /// Generates `params.frames` frames from a normalized image
    async fn generate(
        &mut self,
        image: &RgbImage,
        params: &GenerationParams,
    ) -> Result<Vec<Frame>, ModelError>;

    /// Frees the model's resources; called exactly once on worker exit
    async fn release(&mut self);
}

/// Builds a model once at worker startup
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Box<dyn VideoModel>, ModelError>;
}

/// Selects the loader configured for this worker
pub fn loader_for(config: &Config) -> anyhow::Result<Box<dyn ModelLoader>> {
    match config.model_backend {
        ModelBackend::Motion => Ok(Box::new(MotionModelLoader)),
        ModelBackend::Process => {
            let (Some(command), Some(model_path)) = (&config.model_command, &config.model_path)
            else {
                anyhow::bail!("MODEL_COMMAND and MODEL_PATH are required for the process backend");
            };
            Ok(Box::new(ProcessModelLoader::new(
                command.clone(),
                model_path.clone(),
            )))
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable models for worker and pipeline tests

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Observations shared between a test and the model it handed out
    #[derive(Clone, Default)]
    pub struct ModelProbe {
        pub released: Arc<AtomicBool>,
        pub loads: Arc<AtomicUsize>,
        pub calls: Arc<AtomicUsize>,
    }

    impl ModelProbe {
        pub fn released(&self) -> bool {
            self.released.load(Ordering::SeqCst)
        }

        pub fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    /// What the next `generate` call does
    #[derive(Clone, Debug)]
    pub enum Step {
        Frames,
        /// Ignores `params.frames` and produces this many
        Count(u32),
        /// Frames of the wrong resolution
        Size(u32, u32),
        Fail(&'static str),
        Hang,
    }

    /// Model producing solid frames, following a script of steps
    pub struct ScriptedModel {
        script: VecDeque<Step>,
        probe: ModelProbe,
    }

    #[async_trait]
    impl VideoModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &mut self,
            image: &RgbImage,
            params: &GenerationParams,
        ) -> Result<Vec<Frame>, ModelError> {
            self.probe.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.pop_front().unwrap_or(Step::Frames) {
                Step::Frames => Ok((0..params.frames)
                    .map(|i| {
                        let shade = (i * 10 % 255) as u8;
                        RgbImage::from_pixel(image.width(), image.height(), image::Rgb([shade, 0, 0]))
                    })
                    .collect()),
                Step::Count(n) => Ok((0..n)
                    .map(|_| RgbImage::new(image.width(), image.height()))
                    .collect()),
                Step::Size(w, h) => Ok((0..params.frames).map(|_| RgbImage::new(w, h)).collect()),
                Step::Fail(message) => Err(ModelError::Inference(message.to_string())),
                Step::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(ModelError::Inference("woke up".to_string()))
                }
            }
        }

        async fn release(&mut self) {
            self.probe.released.store(true, Ordering::SeqCst);
        }
    }

    pub struct ScriptedLoader {
        script: Vec<Step>,
        fail: bool,
        probe: ModelProbe,
    }

    impl ScriptedLoader {
        pub fn new(script: Vec<Step>) -> (Self, ModelProbe) {
            let probe = ModelProbe::default();
            (
                Self {
                    script,
                    fail: false,
                    probe: probe.clone(),
                },
                probe,
            )
        }

        pub fn failing() -> (Self, ModelProbe) {
            let (mut loader, probe) = Self::new(Vec::new());
            loader.fail = true;
            (loader, probe)
        }
    }

    #[async_trait]
    impl ModelLoader for ScriptedLoader {
        async fn load(&self) -> Result<Box<dyn VideoModel>, ModelError> {
            self.probe.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ModelError::Load("weights not found".to_string()));
            }
            Ok(Box::new(ScriptedModel {
                script: self.script.clone().into(),
                probe: self.probe.clone(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_loader_for_process_requires_paths() {
        let mut config = Config::default();
        config.model_backend = ModelBackend::Process;
        assert!(loader_for(&config).is_err());

        config.model_command = Some(PathBuf::from("/bin/true"));
        config.model_path = Some(PathBuf::from("/tmp"));
        assert!(loader_for(&config).is_ok());
    }
}

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use snafu::ResultExt;
use tracing::{error, info, warn};

use crate::{
    consts::{INFERENCE_WORKERS, OVERLAY_FONT_ENV, SAMPLING_FPS},
    engine::executor::{AnalysisExecutor, CodeSynthesis},
    error::{EnvNotFoundSnafu, FramelensError, IoReadSnafu, IoWriteSnafu, SpawnSnafu},
    metadata::{fusion, record::Detection, region},
    nim::{
        llm::{ChatClient, CodegenNim, NounChunkExtraction, NounChunkNim},
        vision::{self, DetectionModel, TextRegionModel, VisionSession},
    },
    pipeline::{overlay, session::SessionDirs},
};

/// Tunables for one pipeline instance.
#[derive(Builder, Clone, Debug)]
#[builder(setter(into))]
pub struct PipelineConfig {
    #[builder(default = "SAMPLING_FPS")]
    pub sampling_fps: u32,
    #[builder(default = "INFERENCE_WORKERS")]
    pub workers: usize,
    /// Font for the overlay text; falls back to the `FRAMELENS_FONT`
    /// environment variable. Overlay and video reassembly are skipped
    /// when neither is set.
    #[builder(default)]
    pub font_path: Option<PathBuf>,
    #[builder(default = "true")]
    pub render_video: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sampling_fps: SAMPLING_FPS,
            workers: INFERENCE_WORKERS,
            font_path: None,
            render_video: true,
        }
    }
}

/// One frame's row in the batch result table.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameResult {
    pub frame_id: String,
    pub output: String,
}

/// Everything one request produces: the per-frame result table and,
/// for video requests with overlay enabled, the annotated output
/// video.
#[derive(Debug)]
pub struct BatchOutput {
    pub video: Option<PathBuf>,
    pub frames: Vec<FrameResult>,
}

/// One sampled frame with its fused metadata, ready for analysis.
pub struct FrameBundle {
    pub frame_id: String,
    pub image_path: PathBuf,
    pub detections: Vec<Detection>,
    pub metadata: serde_json::Value,
}

/// Runs the cached analysis function over a batch of frames.
///
/// The first frame's metadata is the synthesis sample. Per-frame
/// failures (and a session-level load failure) become that frame's
/// result value; the batch always reports one entry per frame and
/// never aborts on analysis errors.
pub async fn analyze_frames(
    executor: &AnalysisExecutor,
    synthesis: &dyn CodeSynthesis,
    question: &str,
    frames: &[(String, serde_json::Value)],
) -> Vec<FrameResult> {
    let mut results = Vec::with_capacity(frames.len());
    let Some((_, sample)) = frames.first() else {
        return results;
    };

    if let Err(err) = executor.ensure_ready(sample, question, synthesis).await {
        error!("analysis function synthesis failed: {err}");
        return frames
            .iter()
            .map(|(frame_id, _)| FrameResult {
                frame_id: frame_id.clone(),
                output: format!("error: {err}"),
            })
            .collect();
    }

    for (frame_id, metadata) in frames {
        let output = match executor.run(frame_id, metadata).await {
            Ok(value) => result_text(&value),
            Err(err) => {
                warn!("frame {frame_id} analysis failed: {err}");
                format!("error: {err}")
            }
        };
        results.push(FrameResult {
            frame_id: frame_id.clone(),
            output,
        });
    }
    results
}

/// Plain strings stay bare; everything else is rendered as JSON.
fn result_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// End-to-end orchestration over the external collaborators.
pub struct Pipeline {
    config: PipelineConfig,
    http: reqwest::Client,
    api_key: String,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, api_key: &str) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
        }
    }

    /// Builds a pipeline with the API key taken from the environment.
    pub fn from_env(config: PipelineConfig) -> Result<Self, FramelensError> {
        let api_key = std::env::var(crate::consts::API_KEY_ENV).context(EnvNotFoundSnafu {
            name: crate::consts::API_KEY_ENV,
        })?;
        Ok(Self::new(config, &api_key))
    }

    /// Answers a question about a video: sample frames, run both
    /// vision services, fuse, analyze each frame with the cached
    /// synthesized function, and (when a font is available) render the
    /// annotated output video.
    pub async fn answer_video(
        &self,
        video_path: &Path,
        question: &str,
        output_dir: &Path,
    ) -> Result<BatchOutput, FramelensError> {
        let dirs = SessionDirs::create()?;

        extract_frames(video_path, &dirs.frames(), self.config.sampling_fps).await?;
        self.run_vision_batches(&dirs, question).await?;

        let bundles = self.fuse_frames(&dirs)?;
        let frames: Vec<(String, serde_json::Value)> = bundles
            .iter()
            .map(|b| (b.frame_id.clone(), b.metadata.clone()))
            .collect();

        let executor = AnalysisExecutor::new();
        let codegen = CodegenNim::new(ChatClient::new(self.http.clone(), &self.api_key));
        let results = analyze_frames(&executor, &codegen, question, &frames).await;
        self.write_analytics(&dirs, &results)?;

        let video = if self.config.render_video {
            self.render_output_video(&dirs, &bundles, &results, output_dir)
                .await?
        } else {
            None
        };

        Ok(BatchOutput {
            video,
            frames: results,
        })
    }

    /// Answers a question about a single image; no overlay video.
    pub async fn answer_image(
        &self,
        image_path: &Path,
        question: &str,
    ) -> Result<BatchOutput, FramelensError> {
        let dirs = SessionDirs::create()?;

        let extension = image_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png");
        let staged = dirs.frames().join(format!("frame_00001.{extension}"));
        std::fs::copy(image_path, &staged).context(IoWriteSnafu {
            path: staged.display().to_string(),
        })?;

        self.run_vision_batches(&dirs, question).await?;

        let bundles = self.fuse_frames(&dirs)?;
        let frames: Vec<(String, serde_json::Value)> = bundles
            .iter()
            .map(|b| (b.frame_id.clone(), b.metadata.clone()))
            .collect();

        let executor = AnalysisExecutor::new();
        let codegen = CodegenNim::new(ChatClient::new(self.http.clone(), &self.api_key));
        let results = analyze_frames(&executor, &codegen, question, &frames).await;

        Ok(BatchOutput {
            video: None,
            frames: results,
        })
    }

    /// Runs detection (prompted with the question's noun chunks) and
    /// text-region inference over the sampled frames.
    async fn run_vision_batches(
        &self,
        dirs: &SessionDirs,
        question: &str,
    ) -> Result<(), FramelensError> {
        let chat = ChatClient::new(self.http.clone(), &self.api_key);
        let phrases = NounChunkNim::new(chat).extract(question).await?;
        info!("detection vocabulary: {phrases:?}");

        let detection = VisionSession::new(
            DetectionModel::new(&phrases),
            self.http.clone(),
            &self.api_key,
        );
        detection
            .batch_infer(&dirs.frames(), &dirs.detection(), self.config.workers)
            .await?;

        let regions = VisionSession::new(
            TextRegionModel::new(),
            self.http.clone(),
            &self.api_key,
        );
        regions
            .batch_infer(&dirs.frames(), &dirs.regions(), self.config.workers)
            .await
    }

    /// Fuses detection and text-region outputs frame by frame, in
    /// frame-identity order.
    fn fuse_frames(&self, dirs: &SessionDirs) -> Result<Vec<FrameBundle>, FramelensError> {
        let frames_dir = dirs.frames();
        let mut image_paths: Vec<PathBuf> = std::fs::read_dir(&frames_dir)
            .context(IoReadSnafu {
                path: frames_dir.display().to_string(),
            })?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        image_paths.sort();

        let mut bundles = Vec::with_capacity(image_paths.len());
        for image_path in image_paths {
            let Some(stem) = image_path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let detections = vision::detection_labels(&dirs.detection().join(stem))?;
            let regions = region::load_regions(&dirs.regions().join(stem), true)?;
            let records = fusion::fuse(detections.clone(), &regions);
            let metadata = serde_json::to_value(&records).unwrap_or_default();
            info!(
                "frame {stem}: {} detection(s), {} text region(s)",
                detections.len(),
                regions.len()
            );
            bundles.push(FrameBundle {
                frame_id: stem.to_string(),
                image_path,
                detections,
                metadata,
            });
        }
        Ok(bundles)
    }

    /// Persists each frame's analytic result as a text file named by
    /// frame identifier.
    fn write_analytics(
        &self,
        dirs: &SessionDirs,
        results: &[FrameResult],
    ) -> Result<(), FramelensError> {
        for result in results {
            let path = dirs.analytics().join(format!("{}.txt", result.frame_id));
            std::fs::write(&path, &result.output).context(IoWriteSnafu {
                path: path.display().to_string(),
            })?;
        }
        Ok(())
    }

    /// Overlays boxes and results on every frame and reassembles the
    /// annotated video under `output_dir`. Skipped with a warning when
    /// no overlay font is configured.
    async fn render_output_video(
        &self,
        dirs: &SessionDirs,
        bundles: &[FrameBundle],
        results: &[FrameResult],
        output_dir: &Path,
    ) -> Result<Option<PathBuf>, FramelensError> {
        let font_path = self
            .config
            .font_path
            .clone()
            .or_else(|| std::env::var(OVERLAY_FONT_ENV).ok().map(PathBuf::from));
        let Some(font_path) = font_path else {
            warn!("no overlay font configured, skipping annotated video");
            return Ok(None);
        };
        let font = overlay::load_font(&font_path)?;

        for (bundle, result) in bundles.iter().zip(results) {
            let Some(name) = bundle.image_path.file_name() else {
                continue;
            };
            overlay::render_frame(
                &bundle.image_path,
                &bundle.detections,
                &result.output,
                &font,
                &dirs.overlay().join(name),
            )?;
        }

        std::fs::create_dir_all(output_dir).context(IoWriteSnafu {
            path: output_dir.display().to_string(),
        })?;
        let output_video = output_dir.join("framelens_output.mp4");
        assemble_video(&dirs.overlay(), self.config.sampling_fps, &output_video).await?;
        info!("annotated video at {}", output_video.display());
        Ok(Some(output_video))
    }
}

/// Samples the input video into numbered PNG frames via ffmpeg.
pub async fn extract_frames(
    video_path: &Path,
    frames_dir: &Path,
    fps: u32,
) -> Result<(), FramelensError> {
    run_command(
        "ffmpeg",
        &[
            "-i".as_ref(),
            video_path.as_os_str(),
            "-vf".as_ref(),
            format!("fps={fps}").as_ref(),
            frames_dir.join("frame_%05d.png").as_os_str(),
        ],
    )
    .await
}

/// Reassembles annotated frames into one H.264 video at the sampling
/// frame rate.
pub async fn assemble_video(
    overlay_dir: &Path,
    fps: u32,
    output_video: &Path,
) -> Result<(), FramelensError> {
    run_command(
        "ffmpeg",
        &[
            "-y".as_ref(),
            "-framerate".as_ref(),
            format!("{fps}").as_ref(),
            "-i".as_ref(),
            overlay_dir.join("frame_%05d.png").as_os_str(),
            "-c:v".as_ref(),
            "libx264".as_ref(),
            "-pix_fmt".as_ref(),
            "yuv420p".as_ref(),
            output_video.as_os_str(),
        ],
    )
    .await
}

async fn run_command(program: &str, args: &[&std::ffi::OsStr]) -> Result<(), FramelensError> {
    let rendered = format!(
        "{program} {}",
        args.iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );
    info!("running: {rendered}");
    let status = tokio::process::Command::new(program)
        .args(args)
        .status()
        .await
        .context(SpawnSnafu {
            command: rendered.as_str(),
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(FramelensError::Command {
            command: rendered,
            status: status.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct FixedSynthesis(&'static str);

    #[async_trait]
    impl CodeSynthesis for FixedSynthesis {
        async fn synthesize(
            &self,
            _sample_metadata: &serde_json::Value,
            _question: &str,
        ) -> Result<String, FramelensError> {
            Ok(self.0.to_string())
        }
    }

    fn frames(n: usize) -> Vec<(String, serde_json::Value)> {
        (1..=n)
            .map(|i| {
                (
                    format!("frame_{i:05}"),
                    serde_json::json!({"frame": i, "objects": []}),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_batch_reports_every_frame_with_frame_local_failure() {
        // Synthesized function raises on frame 3 of 5; the other four
        // frames produce normal results and the batch reports all five.
        let synthesis = FixedSynthesis(
            "function postprocessor(m) { \
                 if (m.frame === 3) { throw new Error('no key'); } \
                 return 'frame ' + m.frame + ' ok'; \
             }",
        );
        let executor = AnalysisExecutor::new();
        let results = analyze_frames(&executor, &synthesis, "q", &frames(5)).await;

        assert_eq!(results.len(), 5);
        assert_eq!(results[0].output, "frame 1 ok");
        assert_eq!(results[1].output, "frame 2 ok");
        assert!(results[2].output.starts_with("error:"), "{}", results[2].output);
        assert_eq!(results[3].output, "frame 4 ok");
        assert_eq!(results[4].output, "frame 5 ok");
    }

    #[tokio::test]
    async fn test_load_failure_marks_every_frame_and_completes() {
        let synthesis = FixedSynthesis("this is not even javascript {{{");
        let executor = AnalysisExecutor::new();
        let results = analyze_frames(&executor, &synthesis, "q", &frames(3)).await;

        assert_eq!(results.len(), 3);
        for result in &results {
            assert!(result.output.starts_with("error:"), "{}", result.output);
        }
    }

    #[tokio::test]
    async fn test_synthesis_collaborator_failure_marks_every_frame() {
        struct Unavailable;

        #[async_trait]
        impl CodeSynthesis for Unavailable {
            async fn synthesize(
                &self,
                _sample_metadata: &serde_json::Value,
                _question: &str,
            ) -> Result<String, FramelensError> {
                Err(FramelensError::CollaboratorStatus {
                    service: "codegen".to_string(),
                    status: 502,
                    message: "bad gateway".to_string(),
                })
            }
        }

        let executor = AnalysisExecutor::new();
        let results = analyze_frames(&executor, &Unavailable, "q", &frames(2)).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].output.contains("codegen"));
    }

    #[tokio::test]
    async fn test_empty_batch_yields_no_results() {
        let executor = AnalysisExecutor::new();
        let results =
            analyze_frames(&executor, &FixedSynthesis(""), "q", &[]).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_json_results_are_rendered_as_json() {
        let synthesis = FixedSynthesis(
            "function postprocessor(m) { return {seen: m.frame}; }",
        );
        let executor = AnalysisExecutor::new();
        let results = analyze_frames(&executor, &synthesis, "q", &frames(1)).await;
        assert_eq!(results[0].output, r#"{"seen":1}"#);
    }
}

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use framelens_core::consts::SAMPLING_FPS;
use framelens_core::{Pipeline, PipelineConfigBuilder};

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];

#[derive(Parser)]
#[command(name = "answer")]
#[command(about = "Visual question answering over images and videos")]
struct Args {
    #[arg(help = "Input image or video file path")]
    input: PathBuf,

    #[arg(help = "Question to answer about the input")]
    question: String,

    #[arg(
        short,
        long,
        default_value = "output",
        help = "Output directory for the annotated video"
    )]
    output: PathBuf,

    #[arg(long, default_value_t = SAMPLING_FPS, help = "Video sampling frame rate")]
    fps: u32,

    #[arg(long, help = "Path to a TTF font for the overlay text")]
    font: Option<PathBuf>,
}

fn is_video(path: &PathBuf) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = PipelineConfigBuilder::default()
        .sampling_fps(args.fps)
        .font_path(args.font.clone())
        .build()?;
    let pipeline = Pipeline::from_env(config)?;

    let output = if is_video(&args.input) {
        info!("answering over video {}", args.input.display());
        pipeline
            .answer_video(&args.input, &args.question, &args.output)
            .await?
    } else {
        info!("answering over image {}", args.input.display());
        pipeline.answer_image(&args.input, &args.question).await?
    };

    println!("question: {}", args.question);
    for frame in &output.frames {
        println!("{}\t{}", frame.frame_id, frame.output);
    }
    if let Some(video) = &output.video {
        println!("annotated video: {}", video.display());
    }

    Ok(())
}

use argh::FromArgs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use photomesh::{FixtureBackend, ReconstructionBackend, ReconstructionConfig, SfmPipeline};

#[derive(FromArgs)]
/// Reconstruct a surface mesh from two photographs of the same scene
struct Args {
    /// path to the first image
    #[argh(positional)]
    image_a: PathBuf,

    /// path to the second image
    #[argh(positional)]
    image_b: PathBuf,

    /// output model, written as PLY for a .ply extension and glTF binary otherwise
    #[argh(option, short = 'o', default = "PathBuf::from(\"model.glb\")")]
    output: PathBuf,

    /// JSON configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// time budget in seconds
    #[argh(option, short = 't')]
    timeout: Option<u64>,

    /// serve this model instead of reconstructing
    #[argh(option)]
    fixture: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => ReconstructionConfig::from_json_file(path)?,
        None => ReconstructionConfig::default(),
    };
    if let Some(secs) = args.timeout {
        config = config.with_timeout(Some(Duration::from_secs(secs)));
    }

    let backend: Box<dyn ReconstructionBackend> = match args.fixture {
        Some(fixture) => Box::new(FixtureBackend::new(fixture)),
        None => Box::new(SfmPipeline::new(config)),
    };

    run(backend.as_ref(), &args.image_a, &args.image_b, &args.output)
}

fn run(
    backend: &dyn ReconstructionBackend,
    image_a: &Path,
    image_b: &Path,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    match backend.reconstruct(image_a, image_b, output) {
        Ok(report) => {
            println!(
                "Wrote {} ({} vertices, {} faces) from {} matches, {} inliers, {} points in {:.2?}",
                output.display(),
                report.vertices,
                report.faces,
                report.matches,
                report.inliers,
                report.points,
                report.elapsed
            );
            Ok(())
        }
        Err(err) => {
            log::error!("{} failure: {err}", err.kind());
            Err(err.into())
        }
    }
}

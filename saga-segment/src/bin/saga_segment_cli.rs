use clap::Parser;
use saga_segment::{ChunkConfig, Chunker, PositionIndexer, SceneDetector};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};

/// Chunk a manuscript and dump its structural index as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Target length for each chunk window, in bytes.
    #[arg(short, long, default_value_t = 1200)]
    target_len: usize,

    /// Overlap fraction between consecutive windows (0.0 to 0.5).
    #[arg(short = 'o', long, default_value_t = 0.15)]
    overlap: f32,

    /// Also emit the per-line position index.
    #[arg(short, long)]
    lines: bool,
}

#[derive(Serialize)]
struct Output<'a> {
    scenes: &'a [saga_segment::SceneBoundary],
    chunks: &'a [saga_segment::ChunkWindow],
    #[serde(skip_serializing_if = "Option::is_none")]
    lines: Option<&'a [saga_segment::LineEntry]>,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let text = if let Some(input_path) = args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let detector = SceneDetector::default();
    let scenes = detector.detect(&text);

    let chunker = Chunker::new(
        ChunkConfig::default()
            .with_target_len(args.target_len)
            .with_overlap_fraction(args.overlap),
    );
    let chunks = chunker.chunk(&text);

    let lines = args.lines.then(|| PositionIndexer::index(&text, &scenes));

    let output = Output {
        scenes: &scenes,
        chunks: &chunks,
        lines: lines.as_deref(),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

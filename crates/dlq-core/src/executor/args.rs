//! Downloader command line for a single task.

use std::path::Path;

/// Output file name template handed to the downloader.
pub const OUTPUT_TEMPLATE: &str = "%(title).80s.%(ext)s";

/// Arguments for fetching `source` as an mp3.
///
/// `ffmpeg` is passed through only when the path exists on disk; otherwise the
/// downloader finds ffmpeg on `PATH` itself. The source is always last.
pub fn build_download_args(source: &str, is_playlist: bool, ffmpeg: Option<&Path>) -> Vec<String> {
    let mut args: Vec<String> = [
        "-f",
        "bestaudio/best",
        "-x",
        "--audio-format",
        "mp3",
        "--audio-quality",
        "0",
        "--restrict-filenames",
        "--trim-filenames",
        "100",
        "--newline",
        "--no-mtime",
        "--windows-filenames",
        "--no-warnings",
        "-o",
        OUTPUT_TEMPLATE,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if let Some(path) = ffmpeg.filter(|p| p.exists()) {
        args.push("--ffmpeg-location".to_string());
        args.push(path.display().to_string());
    }
    if !is_playlist {
        args.push("--no-playlist".to_string());
    }
    args.push(source.to_string());
    args
}

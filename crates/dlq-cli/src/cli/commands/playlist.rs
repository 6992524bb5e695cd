//! `dlq playlist` – expand a playlist and download every entry.

use anyhow::Result;
use dlq_core::registry::TaskMetadata;

use super::session::{self, SessionOptions};

pub async fn run_playlist(opts: &SessionOptions, url: &str, performance: usize) -> Result<()> {
    let manager = opts.start();
    let summary = manager
        .add_playlist(url, &opts.dest, TaskMetadata::default(), performance)
        .await?;
    if !opts.json {
        println!("queued {} video(s) from {:?}", summary.video_count, summary.title);
    }
    if summary.task_ids.is_empty() {
        return Ok(());
    }
    session::wait(&manager).await;
    session::summarize(&manager, opts.json)?;
    Ok(())
}

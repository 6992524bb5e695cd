//! `dlq get` – download one or more URLs.

use anyhow::{bail, Result};
use dlq_core::registry::TaskMetadata;

use super::session::{self, SessionOptions};

pub async fn run_get(opts: &SessionOptions, urls: &[String], playlist_id: Option<String>) -> Result<()> {
    let manager = opts.start();
    let mut added = 0;
    for url in urls {
        let meta = TaskMetadata {
            playlist_id: playlist_id.clone(),
            ..TaskMetadata::default()
        };
        match manager.add_download(url, &opts.dest, meta) {
            Ok(id) => {
                tracing::info!(task = id, "added {}", url);
                added += 1;
            }
            Err(e) => eprintln!("skipping {}: {}", url, e),
        }
    }
    if added == 0 {
        bail!("nothing to download");
    }
    session::wait(&manager).await;
    session::summarize(&manager, opts.json)?;
    Ok(())
}

//! Stand-in for yt-dlp: a shell script that answers playlist queries and
//! "downloads" by printing progress lines.
//!
//! Behaviour is keyed on the last argument (the URL):
//! - contains `fail`: error on stderr, exit 1
//! - contains `hang`: one progress line, then sleeps until killed
//! - otherwise: progress up to 100% and exit 0
//!
//! Flat-playlist queries report "Road Trip" with three entries
//! `https://media.test/v1..v3` titled `Track 1..3`. A playlist URL containing
//! `huge` reports 5000 entries and fails if the entries are actually listed.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const SCRIPT: &str = r#"#!/bin/sh
for last in "$@"; do :; done
case " $* " in
  *" --flat-playlist "*)
    case "$last" in
      *huge*)
        case "$*" in
          *playlist_count*) printf '5000\nEverything\n'; exit 0 ;;
        esac
        echo "ERROR: entries listed" >&2; exit 3 ;;
    esac
    case "$*" in
      *playlist_count*) printf '3\nRoad Trip\n3\nRoad Trip\n'; exit 0 ;;
    esac
    i=1
    while [ $i -le 3 ]; do
      printf 'https://media.test/v%s\nTrack %s\n' $i $i
      i=$((i+1))
    done
    exit 0 ;;
esac
case "$last" in
  *fail*) echo "ERROR: [generic] media unavailable" >&2; exit 1 ;;
  *hang*) echo "[download]   1.0% of 1.00MiB"; exec sleep 30 ;;
esac
echo "[download] Destination: out.webm"
echo "[download]  10.0% of 1.00MiB at 1.00MiB/s ETA 00:01"
echo "[download]  55.5% of 1.00MiB at 1.00MiB/s ETA 00:01"
echo "[download] 100.0% of 1.00MiB in 00:01"
exit 0
"#;

/// Write the script into `dir` and return its path.
pub fn install(dir: &Path) -> PathBuf {
    let path = dir.join("fake-yt-dlp");
    fs::write(&path, SCRIPT).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

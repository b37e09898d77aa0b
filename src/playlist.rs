//! M3U playlist rewriter
//! Streams a playlist line by line, injecting tvg-id attributes for channels
//! whose display name is known to the guide index. Everything else passes
//! through untouched, in the original order.

use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::fsutil;
use crate::guide::GuideIndex;

const HEADER: &str = "#EXTM3U";
const METADATA_PREFIX: &str = "#EXTINF:";

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("source playlist unavailable: {0}")]
    SourceUnavailable(#[source] std::io::Error),
    #[error("cannot write rewritten playlist: {0}")]
    Output(#[source] std::io::Error),
}

/// Counters reported after a rewrite, for logging and the status view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    /// Input lines processed
    pub lines: u64,
    /// Metadata lines that received a tvg-id
    pub matched: u64,
}

/// Rewrite the playlist at `playlist_path` against `index`, writing the
/// result to `output_path`.
///
/// The output always starts with the `#EXTM3U` header; an input file that
/// already carries one on its first line is normalized rather than
/// duplicated. The output is assembled in a scratch file unique to this call
/// and renamed into place, so readers never observe a truncated file and
/// concurrent rewrites of the same list cannot interleave their lines.
pub fn rewrite(
    playlist_path: &Path,
    index: &GuideIndex,
    output_path: &Path,
) -> Result<RewriteStats, RewriteError> {
    let input = fs::File::open(playlist_path).map_err(RewriteError::SourceUnavailable)?;
    let reader = BufReader::new(input);
    rewrite_lines(reader, index, output_path)
}

fn rewrite_lines<R: BufRead>(
    reader: R,
    index: &GuideIndex,
    output_path: &Path,
) -> Result<RewriteStats, RewriteError> {
    // Dropped without persist on any error below, which removes it.
    let scratch = fsutil::scratch_for(output_path).map_err(RewriteError::Output)?;
    let mut writer = BufWriter::new(scratch);
    let mut stats = RewriteStats::default();

    writeln!(writer, "{HEADER}").map_err(RewriteError::Output)?;

    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(RewriteError::SourceUnavailable)?;
        stats.lines += 1;

        // The normalized header above stands in for an input header line
        if lineno == 0 && line.trim_start().starts_with(HEADER) {
            continue;
        }

        match tag_metadata_line(&line, index) {
            Some(tagged) => {
                stats.matched += 1;
                writeln!(writer, "{tagged}").map_err(RewriteError::Output)?;
            }
            None => writeln!(writer, "{line}").map_err(RewriteError::Output)?,
        }
    }

    let scratch = writer
        .into_inner()
        .map_err(|e| RewriteError::Output(e.into_error()))?;
    scratch
        .persist(output_path)
        .map_err(|e| RewriteError::Output(e.error))?;
    Ok(stats)
}

/// Inject a tvg-id attribute into an `#EXTINF` line whose trailing display
/// name matches the index. Returns `None` when the line is not a metadata
/// line or no channel matches, leaving the caller to pass it through.
///
/// The attribute is inserted right after the duration token. This is a pure
/// insertion: an already-present tvg-id is neither detected nor replaced, so
/// re-running over an already-tagged playlist doubles the attribute.
fn tag_metadata_line(line: &str, index: &GuideIndex) -> Option<String> {
    if !line.starts_with(METADATA_PREFIX) {
        return None;
    }

    // Display name is whatever follows the last comma
    let name = line.rsplit(',').next()?.trim();
    if name.is_empty() {
        return None;
    }
    let id = index.lookup(name)?;

    let insert_at = duration_end(line);
    Some(format!(
        "{} tvg-id=\"{}\"{}",
        &line[..insert_at],
        id,
        &line[insert_at..]
    ))
}

/// Byte offset just past the duration token of an `#EXTINF:` line
fn duration_end(line: &str) -> usize {
    let mut end = METADATA_PREFIX.len();
    for c in line[end..].chars() {
        if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' {
            end += c.len_utf8();
        } else {
            break;
        }
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> GuideIndex {
        GuideIndex::from_xml(
            r#"<tv>
  <channel id="bbc1"><display-name>BBC One</display-name></channel>
  <channel id="cnn.us"><display-name>CNN</display-name></channel>
</tv>"#,
        )
        .unwrap()
    }

    #[test]
    fn test_tag_matched_line() {
        let line = "#EXTINF:-1,BBC One";
        assert_eq!(
            tag_metadata_line(line, &index()).unwrap(),
            "#EXTINF:-1 tvg-id=\"bbc1\",BBC One"
        );
    }

    #[test]
    fn test_tag_preserves_existing_attributes() {
        let line = "#EXTINF:-1 group-title=\"News\",CNN";
        assert_eq!(
            tag_metadata_line(line, &index()).unwrap(),
            "#EXTINF:-1 tvg-id=\"cnn.us\" group-title=\"News\",CNN"
        );
    }

    #[test]
    fn test_tag_handles_positive_duration() {
        let line = "#EXTINF:120.5,BBC One";
        assert_eq!(
            tag_metadata_line(line, &index()).unwrap(),
            "#EXTINF:120.5 tvg-id=\"bbc1\",BBC One"
        );
    }

    #[test]
    fn test_unmatched_name_passes_through() {
        assert!(tag_metadata_line("#EXTINF:-1,Unknown Channel", &index()).is_none());
    }

    #[test]
    fn test_non_metadata_lines_pass_through() {
        assert!(tag_metadata_line("http://example.com/1.ts", &index()).is_none());
        assert!(tag_metadata_line("#EXTGRP:News", &index()).is_none());
        assert!(tag_metadata_line("", &index()).is_none());
    }

    #[test]
    fn test_retagging_is_not_idempotent() {
        // Documented quirk: the rewriter does not detect an existing tvg-id,
        // so a second pass adds a second attribute.
        let once = tag_metadata_line("#EXTINF:-1,CNN", &index()).unwrap();
        let twice = tag_metadata_line(&once, &index()).unwrap();
        assert_eq!(
            twice,
            "#EXTINF:-1 tvg-id=\"cnn.us\" tvg-id=\"cnn.us\",CNN"
        );
    }

    #[test]
    fn test_name_is_after_last_comma() {
        let line = "#EXTINF:-1 tvg-name=\"BBC, One\",BBC One";
        assert_eq!(
            tag_metadata_line(line, &index()).unwrap(),
            "#EXTINF:-1 tvg-id=\"bbc1\" tvg-name=\"BBC, One\",BBC One"
        );
    }
}

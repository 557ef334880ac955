//! Record text splitting.
//!
//! Splitting turns record text into fragment drafts for embedding. Offsets
//! are character positions into the source text, and every draft's content
//! is the exact slice at its offsets, so a fragment can always be traced
//! back to the document it came from.

use serde::{Deserialize, Serialize};

use crate::config::SplittingSettings;
use crate::error::{AnamneseError, Result};

/// A fragment cut from a source document, before embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentDraft {
    pub content: String,
    /// Character offset of the first character, inclusive.
    pub offset_start: usize,
    /// Character offset past the last character, exclusive.
    pub offset_end: usize,
}

/// Available splitting strategies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SplitStrategy {
    /// Pack whole paragraphs up to the target size; oversized paragraphs
    /// fall back to fixed windows.
    Paragraph,
    /// Sliding windows of the target size with a configured overlap.
    Fixed,
}

impl std::str::FromStr for SplitStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "paragraph" => Ok(SplitStrategy::Paragraph),
            "fixed" => Ok(SplitStrategy::Fixed),
            _ => Err(format!("Unknown split strategy: {}", s)),
        }
    }
}

/// Size limits for splitting, all in characters.
#[derive(Debug, Clone)]
pub struct SplitterConfig {
    pub target_chars: usize,
    pub overlap_chars: usize,
    pub min_chars: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            target_chars: 1200,
            overlap_chars: 200,
            min_chars: 64,
        }
    }
}

/// Splits document text into fragment drafts.
pub struct Splitter {
    strategy: SplitStrategy,
    config: SplitterConfig,
}

impl Splitter {
    pub fn new(strategy: SplitStrategy, config: SplitterConfig) -> Self {
        Self { strategy, config }
    }

    pub fn from_settings(settings: &SplittingSettings) -> Result<Self> {
        let strategy = settings.strategy.parse().map_err(AnamneseError::Config)?;
        Ok(Self::new(
            strategy,
            SplitterConfig {
                target_chars: settings.target_chars,
                overlap_chars: settings.overlap_chars,
                min_chars: settings.min_chars,
            },
        ))
    }

    /// Split text into drafts in document order.
    pub fn split(&self, text: &str) -> Vec<FragmentDraft> {
        let byte_at = char_byte_offsets(text);
        let char_count = byte_at.len() - 1;

        match self.strategy {
            SplitStrategy::Fixed => {
                let mut drafts = Vec::new();
                self.fixed_windows(text, &byte_at, 0, char_count, &mut drafts);
                drafts
            }
            SplitStrategy::Paragraph => self.split_paragraphs(text, &byte_at),
        }
    }

    /// Emit overlapping fixed windows covering the char range [lo, hi).
    fn fixed_windows(
        &self,
        text: &str,
        byte_at: &[usize],
        lo: usize,
        hi: usize,
        out: &mut Vec<FragmentDraft>,
    ) {
        if lo >= hi {
            return;
        }
        let target = self.config.target_chars.max(1);
        let overlap = self.config.overlap_chars.min(target.saturating_sub(1));
        let step = target - overlap;

        let mut start = lo;
        loop {
            let end = (start + target).min(hi);
            out.push(FragmentDraft {
                content: text[byte_at[start]..byte_at[end]].to_string(),
                offset_start: start,
                offset_end: end,
            });
            if end == hi {
                break;
            }
            start += step;
        }
    }

    fn split_paragraphs(&self, text: &str, byte_at: &[usize]) -> Vec<FragmentDraft> {
        let target = self.config.target_chars.max(1);
        let blocks = paragraph_blocks(text);
        let mut drafts = Vec::new();

        let mut i = 0;
        while i < blocks.len() {
            let (start, first_end) = blocks[i];
            if first_end - start > target {
                self.fixed_windows(text, byte_at, start, first_end, &mut drafts);
                i += 1;
                continue;
            }

            // Pack consecutive blocks while the covered span stays under target.
            let mut end = first_end;
            let mut j = i + 1;
            while j < blocks.len() && blocks[j].1 - start <= target {
                end = blocks[j].1;
                j += 1;
            }
            drafts.push(FragmentDraft {
                content: text[byte_at[start]..byte_at[end]].to_string(),
                offset_start: start,
                offset_end: end,
            });
            i = j;
        }

        self.merge_short_tail(text, byte_at, &mut drafts);
        drafts
    }

    /// A trailing fragment below the minimum size joins its predecessor
    /// rather than going to the index as a sliver.
    fn merge_short_tail(&self, text: &str, byte_at: &[usize], drafts: &mut Vec<FragmentDraft>) {
        if drafts.len() < 2 {
            return;
        }
        let tail_is_short = drafts
            .last()
            .map(|d| d.offset_end - d.offset_start < self.config.min_chars)
            .unwrap_or(false);
        if !tail_is_short {
            return;
        }
        if let Some(tail) = drafts.pop() {
            if let Some(prev) = drafts.last_mut() {
                prev.offset_end = tail.offset_end;
                prev.content = text[byte_at[prev.offset_start]..byte_at[prev.offset_end]].to_string();
            }
        }
    }
}

/// Byte position of every character, plus one past the end. Indexing this
/// table turns char offsets into valid byte offsets for slicing.
fn char_byte_offsets(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(text.len()))
        .collect()
}

/// Maximal runs of non-blank lines as (start, end) char offsets.
fn paragraph_blocks(text: &str) -> Vec<(usize, usize)> {
    let mut blocks = Vec::new();
    let mut offset = 0usize;
    let mut current: Option<(usize, usize)> = None;

    for line in text.split_inclusive('\n') {
        let len = line.chars().count();
        if line.trim().is_empty() {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
        } else {
            match current.as_mut() {
                Some((_, end)) => *end = offset + len,
                None => current = Some((offset, offset + len)),
            }
        }
        offset += len;
    }
    if let Some(block) = current {
        blocks.push(block);
    }
    blocks
}

/*!
 * Boundary-aware chunk splitting.
 *
 * Long fragments are cut into segments no longer than the configured limit
 * (plus the search window), preferring paragraph breaks, then sentence ends,
 * then newlines, then spaces. A cut never lands inside a placeholder token.
 * All positions are counted in characters, not bytes.
 */

use log::trace;

use crate::placeholder::{self, TOKEN_CLOSE, TOKEN_OPEN};

/// Candidate boundary kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryKind {
    /// A blank line
    Paragraph,
    /// `.`, `!` or `?` followed by whitespace
    Sentence,
    /// A bare newline
    Newline,
    /// A space outside any placeholder token
    Space,
}

/// Context scanned before a space when checking for an open placeholder
const SPACE_LOOKBEHIND: usize = 50;
/// Context scanned after a space for the token terminator
const SPACE_LOOKAHEAD: usize = 5;

/// Splitter configuration
#[derive(Debug, Clone)]
pub struct ChunkSplitter {
    // @field: Max characters per chunk before splitting kicks in
    pub limit: usize,
    // @field: Characters searched on each side of the ideal cut
    pub window: usize,
    // @field: Smallest chunk the splitter will cut off
    pub min_chunk_size: usize,
    // @field: Tie-break order among equally distant candidates
    pub priority: [BoundaryKind; 4],
}

impl ChunkSplitter {
    pub fn new(limit: usize, window: usize, min_chunk_size: usize) -> Self {
        Self {
            limit,
            window,
            min_chunk_size,
            priority: [
                BoundaryKind::Paragraph,
                BoundaryKind::Sentence,
                BoundaryKind::Newline,
                BoundaryKind::Space,
            ],
        }
    }

    /// Override the tie-break order
    pub fn with_priority(mut self, priority: [BoundaryKind; 4]) -> Self {
        self.priority = priority;
        self
    }

    fn rank(&self, kind: BoundaryKind) -> usize {
        self.priority
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(self.priority.len())
    }

    /// Split `text` into chunks; a text within the limit comes back as-is
    pub fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        if len <= self.limit {
            return vec![text.to_string()];
        }

        let spans = token_char_spans(text);
        let target = self
            .min_chunk_size
            .max(self.limit.saturating_sub(self.window / 2));

        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < len {
            if len - start <= self.limit {
                chunks.push(chars[start..].iter().collect::<String>());
                break;
            }

            let ideal_end = (start + target).min(len);
            let search_start = (start + self.min_chunk_size).max(ideal_end.saturating_sub(self.window));
            let search_end = (ideal_end + self.window).min(len);

            let mut split = self
                .best_candidate(&chars, search_start, search_end, ideal_end)
                .filter(|pos| *pos > start + self.min_chunk_size)
                .unwrap_or_else(|| (start + self.limit).min(len));

            split = move_out_of_token(split, start, &spans);
            if split <= start {
                split = (start + self.limit).min(len);
                if split <= start {
                    split = len;
                }
            }

            trace!("Chunk cut at {} (ideal {}, window {}..{})", split, ideal_end, search_start, search_end);
            chunks.push(chars[start..split].iter().collect::<String>());
            start = split;
        }

        chunks.retain(|chunk| !chunk.trim().is_empty());
        chunks
    }

    fn best_candidate(
        &self,
        chars: &[char],
        search_start: usize,
        search_end: usize,
        ideal_end: usize,
    ) -> Option<usize> {
        if search_start >= search_end {
            return None;
        }

        let mut candidates: Vec<(usize, usize, usize)> = Vec::new();
        let mut push = |pos: usize, kind: BoundaryKind| {
            candidates.push((pos.abs_diff(ideal_end), self.rank(kind), pos));
        };

        let mut i = search_start;
        while i + 1 < search_end {
            if chars[i] == '\n' && chars[i + 1] == '\n' {
                push(i + 2, BoundaryKind::Paragraph);
                i += 2;
            } else {
                i += 1;
            }
        }

        let mut i = search_start;
        while i + 1 < search_end {
            if matches!(chars[i], '.' | '!' | '?') && chars[i + 1].is_whitespace() {
                let mut j = i + 1;
                while j < search_end && chars[j].is_whitespace() {
                    j += 1;
                }
                push(j, BoundaryKind::Sentence);
                i = j;
            } else {
                i += 1;
            }
        }

        for (i, c) in chars.iter().enumerate().take(search_end).skip(search_start) {
            match c {
                '\n' => push(i + 1, BoundaryKind::Newline),
                ' ' => {
                    let pos = i + 1;
                    if !space_inside_placeholder(chars, pos) {
                        push(pos, BoundaryKind::Space);
                    }
                }
                _ => {}
            }
        }

        candidates.sort_unstable();
        candidates.first().map(|(_, _, pos)| *pos)
    }
}

/// Placeholder spans converted from byte offsets to char offsets
fn token_char_spans(text: &str) -> Vec<(usize, usize)> {
    let matches = placeholder::find_all(text);
    if matches.is_empty() {
        return Vec::new();
    }
    let offsets: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
    let to_char = |byte: usize| offsets.partition_point(|&b| b < byte);
    matches
        .iter()
        .map(|m| (to_char(m.start), to_char(m.end)))
        .collect()
}

/// Push a cut that lands strictly inside a token to the token's edge
fn move_out_of_token(split: usize, chunk_start: usize, spans: &[(usize, usize)]) -> usize {
    for &(token_start, token_end) in spans {
        if split > token_start && split < token_end {
            return if token_start > chunk_start { token_start } else { token_end };
        }
    }
    split
}

fn space_inside_placeholder(chars: &[char], pos: usize) -> bool {
    let before: String = chars[pos.saturating_sub(SPACE_LOOKBEHIND)..pos].iter().collect();
    let after_end = (pos + SPACE_LOOKAHEAD).min(chars.len());
    let after: String = chars[pos..after_end].iter().collect();
    before.contains(TOKEN_OPEN) && !after.contains(TOKEN_CLOSE)
}

/// Convenience wrapper over `ChunkSplitter`
pub fn split(text: &str, limit: usize, window: usize, min_chunk_size: usize) -> Vec<String> {
    ChunkSplitter::new(limit, window, min_chunk_size).split(text)
}

//! Splits file content into overlapping line windows for embedding.

/// A contiguous line range of a file, the unit of semantic embedding.
/// Lines are 1-based inclusive, matching search result conventions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
}

/// Fixed-window line chunker with overlap between consecutive chunks.
pub struct Chunker {
    chunk_lines: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(chunk_lines: usize, overlap: usize) -> Self {
        // Overlap must leave forward progress
        let overlap = overlap.min(chunk_lines.saturating_sub(1));
        Self {
            chunk_lines: chunk_lines.max(1),
            overlap,
        }
    }

    /// Chunk content into overlapping line ranges. Whitespace-only chunks
    /// are dropped.
    pub fn chunk(&self, content: &str) -> Vec<ChunkSpan> {
        let lines: Vec<&str> = content.lines().collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let step = self.chunk_lines - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < lines.len() {
            let end = (start + self.chunk_lines).min(lines.len());
            let text = lines[start..end].join("\n");

            if !text.trim().is_empty() {
                chunks.push(ChunkSpan {
                    start_line: start + 1,
                    end_line: end,
                    text,
                });
            }

            if end == lines.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}

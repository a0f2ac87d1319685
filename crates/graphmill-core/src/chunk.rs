//! Content-aware document chunking.
//!
//! Splits a document into bounded, overlapping [`DocumentChunk`]s using a
//! strategy per content type:
//!
//! - **Markdown** — heading lines delimit sections; oversized sections are
//!   split at blank-line / heading / list-item boundaries.
//! - **Code** — line-boundary splits.
//! - **Plain text** — sentence-boundary splits (`.`, `!`, `?` runs followed
//!   by whitespace).
//! - **JSON** — array elements or top-level object keys are grouped until
//!   the serialized size would exceed the limit; invalid JSON falls back to
//!   plain-text chunking.
//! - **XML** — top-level balanced elements become blocks, text between
//!   elements becomes its own chunk; no balanced elements falls back to
//!   plain-text chunking.
//!
//! When a region exceeds `max_chunk_size`, the best break point is found by
//! scanning backward from the size limit minus `overlap_size`, and the next
//! chunk starts `overlap_size` bytes before the break (advanced to a word
//! boundary), so consecutive chunks share an overlap region.
//!
//! Chunk IDs are content hashes of `(document_id, index, text)`, so
//! re-chunking an unchanged document with the same config is idempotent.

use serde::Deserialize;

use crate::classify::ContentType;
use crate::models::{Document, DocumentChunk};

/// Size bounds for chunking, in bytes.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
    #[serde(default = "default_overlap_size")]
    pub overlap_size: usize,
}

fn default_max_chunk_size() -> usize {
    2000
}
fn default_min_chunk_size() -> usize {
    100
}
fn default_overlap_size() -> usize {
    200
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            min_chunk_size: default_min_chunk_size(),
            overlap_size: default_overlap_size(),
        }
    }
}

/// Aggregate size statistics over a document's kept chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkStats {
    pub count: usize,
    pub avg_size: usize,
    pub min_size: usize,
    pub max_size: usize,
}

/// Result of chunking one document.
#[derive(Debug, Clone)]
pub struct ChunkOutcome {
    pub chunks: Vec<DocumentChunk>,
    pub warnings: Vec<String>,
    pub stats: ChunkStats,
}

/// A chunk candidate before IDs and filtering are applied.
struct Piece {
    text: String,
    start: usize,
    end: usize,
    heading: Option<String>,
}

/// A half-open byte span into the source content.
#[derive(Clone)]
struct Span {
    start: usize,
    end: usize,
    heading: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum BreakStyle {
    /// Prefer blank lines, heading lines, and list-item lines.
    Markdown,
    /// Prefer line boundaries.
    Line,
    /// Prefer sentence boundaries, falling back to word boundaries.
    Sentence,
}

/// Chunk a document according to its content type.
pub fn chunk_document(
    doc: &Document,
    content_type: ContentType,
    config: &ChunkingConfig,
) -> ChunkOutcome {
    let content = doc.content.as_str();
    let mut warnings = Vec::new();

    let pieces = match content_type {
        ContentType::Markdown => spans_to_pieces(content, markdown_spans(content, config)),
        ContentType::Code => {
            spans_to_pieces(content, split_region(content, 0, content.len(), config, BreakStyle::Line, None))
        }
        ContentType::PlainText => spans_to_pieces(
            content,
            split_region(content, 0, content.len(), config, BreakStyle::Sentence, None),
        ),
        ContentType::Json => match json_pieces(content, config) {
            Some(pieces) => pieces,
            None => {
                warnings.push("invalid JSON content, falling back to plain-text chunking".to_string());
                spans_to_pieces(
                    content,
                    split_region(content, 0, content.len(), config, BreakStyle::Sentence, None),
                )
            }
        },
        ContentType::Xml => match xml_spans(content, config) {
            Some(spans) => spans_to_pieces(content, spans),
            None => {
                warnings.push(
                    "no balanced XML elements found, falling back to plain-text chunking".to_string(),
                );
                spans_to_pieces(
                    content,
                    split_region(content, 0, content.len(), config, BreakStyle::Sentence, None),
                )
            }
        },
    };

    materialize(&doc.id, pieces, config, warnings)
}

// ─── Markdown ───────────────────────────────────────────────────────────

/// Returns `Some(title)` when the line is an ATX heading (`#` × 1..=6 + space).
fn heading_title(line: &str) -> Option<&str> {
    let hashes = line.bytes().take_while(|&b| b == b'#').count();
    if (1..=6).contains(&hashes) {
        let rest = &line[hashes..];
        if rest.starts_with(' ') || rest.starts_with('\t') {
            return Some(rest.trim());
        }
    }
    None
}

fn is_list_item(line: &str) -> bool {
    let t = line.trim_start();
    if t.starts_with("- ") || t.starts_with("* ") || t.starts_with("+ ") {
        return true;
    }
    let digits = t.bytes().take_while(|b| b.is_ascii_digit()).count();
    digits > 0 && t[digits..].starts_with(". ")
}

/// Split markdown into heading-delimited sections, then bound each section.
fn markdown_spans(content: &str, config: &ChunkingConfig) -> Vec<Span> {
    let mut sections: Vec<Span> = Vec::new();
    let mut sec_start = 0usize;
    let mut sec_heading: Option<String> = None;
    let mut pos = 0usize;

    for line in content.split_inclusive('\n') {
        let line_start = pos;
        pos += line.len();
        let bare = line.trim_end_matches(['\r', '\n']);
        if let Some(title) = heading_title(bare) {
            if line_start > sec_start && !content[sec_start..line_start].trim().is_empty() {
                sections.push(Span {
                    start: sec_start,
                    end: line_start,
                    heading: sec_heading.clone(),
                });
            }
            sec_start = line_start;
            sec_heading = Some(title.to_string());
        }
    }
    if pos > sec_start && !content[sec_start..pos].trim().is_empty() {
        sections.push(Span {
            start: sec_start,
            end: pos,
            heading: sec_heading,
        });
    }

    let mut spans = Vec::new();
    for section in sections {
        if section.end - section.start <= config.max_chunk_size {
            spans.push(section);
        } else {
            spans.extend(split_region(
                content,
                section.start,
                section.end,
                config,
                BreakStyle::Markdown,
                section.heading.clone(),
            ));
        }
    }
    spans
}

// ─── Generic oversized-region splitting ─────────────────────────────────

/// Split `[start, end)` into spans of at most `max_chunk_size` bytes, each
/// subsequent span starting `overlap_size` bytes before the previous break.
fn split_region(
    content: &str,
    start: usize,
    end: usize,
    config: &ChunkingConfig,
    style: BreakStyle,
    heading: Option<String>,
) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut pos = start;

    while end - pos > config.max_chunk_size {
        let hard = snap_to_char_boundary(content, pos + config.max_chunk_size);
        let b = find_break(content, pos, hard, config.overlap_size, style);
        spans.push(Span {
            start: pos,
            end: b,
            heading: heading.clone(),
        });

        let mut next = b.saturating_sub(config.overlap_size).max(pos + 1);
        next = snap_to_char_boundary(content, next);
        next = advance_to_word_boundary(content, next, b);
        if next <= pos {
            next = b; // degenerate overlap config; never loop in place
        }
        pos = next;
    }

    if end > pos {
        spans.push(Span {
            start: pos,
            end,
            heading,
        });
    }
    spans
}

/// Find the best break point in `(pos, hard]`.
///
/// Preferred boundaries are searched scanning backward from `hard - overlap`,
/// but never in the first half of the window (avoids emitting a fragment and
/// re-reading nearly the whole window as overlap). Falls back to the last
/// word boundary, then to the hard limit.
fn find_break(content: &str, pos: usize, hard: usize, overlap: usize, style: BreakStyle) -> usize {
    let slice = &content[pos..hard];
    let lo = slice.len() / 2;
    let target = slice.len().saturating_sub(overlap).max(lo);

    let preferred = match style {
        BreakStyle::Markdown => last_markdown_boundary(slice, lo, target),
        BreakStyle::Line => last_line_boundary(slice, lo, target),
        BreakStyle::Sentence => last_sentence_boundary(slice, lo, target),
    };

    let rel = preferred
        .or_else(|| last_word_boundary(slice, lo, target))
        .or_else(|| last_word_boundary(slice, lo, slice.len()))
        .unwrap_or(slice.len());

    snap_to_char_boundary(content, pos + rel)
}

/// Last blank-line, heading-line, or list-item-line start in `[lo, hi]`.
fn last_markdown_boundary(slice: &str, lo: usize, hi: usize) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, _) in slice.match_indices('\n') {
        let line_start = i + 1;
        if line_start < lo || line_start > hi {
            continue;
        }
        let rest = &slice[line_start..];
        let line = rest.split(['\n']).next().unwrap_or("");
        let blank = line.trim().is_empty() && !rest.is_empty();
        if blank || heading_title(line).is_some() || is_list_item(line) {
            best = Some(line_start);
        }
    }
    best
}

/// Last position just after a newline in `[lo, hi]`.
fn last_line_boundary(slice: &str, lo: usize, hi: usize) -> Option<usize> {
    slice[..hi.min(slice.len())]
        .rfind('\n')
        .map(|i| i + 1)
        .filter(|&b| b >= lo && b > 0)
}

/// Last position just after a `[.!?]+\s` sentence terminator in `[lo, hi]`.
fn last_sentence_boundary(slice: &str, lo: usize, hi: usize) -> Option<usize> {
    let mut best: Option<usize> = None;
    let bytes = slice.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if matches!(bytes[i], b'.' | b'!' | b'?') {
            let mut j = i + 1;
            while j < bytes.len() && matches!(bytes[j], b'.' | b'!' | b'?') {
                j += 1;
            }
            if j < bytes.len() && bytes[j].is_ascii_whitespace() {
                let after = j + 1;
                if after >= lo && after <= hi {
                    best = Some(after);
                }
            }
            i = j;
        } else {
            i += 1;
        }
    }
    best
}

/// Last position just after a whitespace byte in `[lo, hi]`.
fn last_word_boundary(slice: &str, lo: usize, hi: usize) -> Option<usize> {
    let upto = &slice[..hi.min(slice.len())];
    upto.char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .filter(|&b| b >= lo)
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// If `from` lands mid-word, advance past the next whitespace run start
/// (bounded by `limit`), so overlap text begins at a word boundary.
fn advance_to_word_boundary(content: &str, from: usize, limit: usize) -> usize {
    if from == 0 || from >= limit {
        return from;
    }
    let prev_is_ws = content[..from]
        .chars()
        .next_back()
        .map(|c| c.is_whitespace())
        .unwrap_or(true);
    if prev_is_ws {
        return from;
    }
    match content[from..limit].find(char::is_whitespace) {
        Some(i) => {
            let ws_start = from + i;
            let ws_len = content[ws_start..]
                .chars()
                .next()
                .map(|c| c.len_utf8())
                .unwrap_or(1);
            ws_start + ws_len
        }
        None => from,
    }
}

// ─── JSON ───────────────────────────────────────────────────────────────

/// Group array elements (or top-level object keys) so each group's
/// serialization stays within the size limit. Returns `None` on invalid
/// JSON, which triggers the plain-text fallback.
fn json_pieces(content: &str, config: &ChunkingConfig) -> Option<Vec<Piece>> {
    let value: serde_json::Value = serde_json::from_str(content.trim()).ok()?;

    let texts: Vec<String> = match value {
        serde_json::Value::Array(items) => {
            let mut groups: Vec<Vec<serde_json::Value>> = Vec::new();
            let mut current: Vec<serde_json::Value> = Vec::new();
            let mut current_len = 2usize; // brackets
            for item in items {
                let item_len = item.to_string().len();
                if !current.is_empty() && current_len + item_len + 1 > config.max_chunk_size {
                    groups.push(std::mem::take(&mut current));
                    current_len = 2;
                }
                current_len += item_len + 1;
                current.push(item);
            }
            if !current.is_empty() {
                groups.push(current);
            }
            groups
                .into_iter()
                .map(|g| serde_json::Value::Array(g).to_string())
                .collect()
        }
        serde_json::Value::Object(map) => {
            let mut groups: Vec<serde_json::Map<String, serde_json::Value>> = Vec::new();
            let mut current = serde_json::Map::new();
            let mut current_len = 2usize;
            for (key, val) in map {
                let pair_len = key.len() + val.to_string().len() + 4;
                if !current.is_empty() && current_len + pair_len > config.max_chunk_size {
                    groups.push(std::mem::take(&mut current));
                    current_len = 2;
                }
                current_len += pair_len;
                current.insert(key, val);
            }
            if !current.is_empty() {
                groups.push(current);
            }
            groups
                .into_iter()
                .map(|m| serde_json::Value::Object(m).to_string())
                .collect()
        }
        other => vec![other.to_string()],
    };

    // Offsets are cumulative positions in the emitted chunk stream: the
    // text is re-serialized, so source spans do not exist for JSON.
    let mut pieces = Vec::new();
    let mut offset = 0usize;
    for text in texts {
        let end = offset + text.len();
        pieces.push(Piece {
            text,
            start: offset,
            end,
            heading: None,
        });
        offset = end;
    }
    Some(pieces)
}

// ─── XML ────────────────────────────────────────────────────────────────

/// Find top-level balanced element blocks (and top-level text runs) as
/// source spans. Oversized blocks are split at word boundaries with
/// overlap. Returns `None` when no balanced element exists or the input
/// is malformed, which triggers the plain-text fallback.
fn xml_spans(content: &str, config: &ChunkingConfig) -> Option<Vec<Span>> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(content);
    let mut depth = 0usize;
    let mut top_start = 0usize;
    let mut found_element = false;
    let mut regions: Vec<(usize, usize)> = Vec::new();

    loop {
        let before = reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(Event::Start(_)) => {
                if depth == 0 {
                    top_start = before;
                }
                depth += 1;
            }
            Ok(Event::End(_)) => {
                if depth == 0 {
                    return None; // unbalanced close
                }
                depth -= 1;
                if depth == 0 {
                    found_element = true;
                    regions.push((top_start, reader.buffer_position() as usize));
                }
            }
            Ok(Event::Empty(_)) => {
                if depth == 0 {
                    found_element = true;
                    regions.push((before, reader.buffer_position() as usize));
                }
            }
            Ok(Event::Text(_)) => {
                if depth == 0 {
                    let end = reader.buffer_position() as usize;
                    if !content[before..end].trim().is_empty() {
                        regions.push((before, end));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {} // declarations, comments, CDATA, PIs
            Err(_) => return None,
        }
    }

    if !found_element || depth != 0 {
        return None;
    }

    let mut spans = Vec::new();
    for (start, end) in regions {
        if end - start <= config.max_chunk_size {
            spans.push(Span {
                start,
                end,
                heading: None,
            });
        } else {
            spans.extend(split_region(content, start, end, config, BreakStyle::Sentence, None));
        }
    }
    Some(spans)
}

// ─── Materialization ────────────────────────────────────────────────────

/// Trim a span to non-whitespace boundaries, keeping offsets consistent
/// with the text (`text == content[start..end]`).
fn spans_to_pieces(content: &str, spans: Vec<Span>) -> Vec<Piece> {
    spans
        .into_iter()
        .filter_map(|span| {
            let slice = &content[span.start..span.end];
            let lead = slice.len() - slice.trim_start().len();
            let trail = slice.len() - slice.trim_end().len();
            let start = span.start + lead;
            let end = span.end - trail;
            if start >= end {
                return None;
            }
            Some(Piece {
                text: content[start..end].to_string(),
                start,
                end,
                heading: span.heading,
            })
        })
        .collect()
}

fn materialize(
    document_id: &str,
    pieces: Vec<Piece>,
    config: &ChunkingConfig,
    mut warnings: Vec<String>,
) -> ChunkOutcome {
    // Undersized chunks are dropped with a warning. Heading-delimited
    // sections are structural and kept even when short.
    let kept: Vec<Piece> = pieces
        .into_iter()
        .filter(|p| {
            if p.text.len() < config.min_chunk_size && p.heading.is_none() {
                warnings.push(format!(
                    "dropped undersized chunk ({} bytes < minimum {})",
                    p.text.len(),
                    config.min_chunk_size
                ));
                false
            } else {
                true
            }
        })
        .collect();

    let chunks: Vec<DocumentChunk> = kept
        .into_iter()
        .enumerate()
        .map(|(index, p)| {
            DocumentChunk::new(document_id, index, p.text, p.start, p.end, p.heading)
        })
        .collect();

    let stats = if chunks.is_empty() {
        ChunkStats::default()
    } else {
        let sizes: Vec<usize> = chunks.iter().map(|c| c.text.len()).collect();
        let total: usize = sizes.iter().sum();
        ChunkStats {
            count: chunks.len(),
            avg_size: total / chunks.len(),
            min_size: *sizes.iter().min().unwrap_or(&0),
            max_size: *sizes.iter().max().unwrap_or(&0),
        }
    };

    ChunkOutcome {
        chunks,
        warnings,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentMeta;

    fn doc(content: &str) -> Document {
        Document::new(content, DocumentMeta::default())
    }

    fn cfg(max: usize, min: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_chunk_size: max,
            min_chunk_size: min,
            overlap_size: overlap,
        }
    }

    #[test]
    fn test_markdown_sections_by_heading() {
        let d = doc("# One\nalpha text\n## Two\nbeta text\n");
        let out = chunk_document(&d, ContentType::Markdown, &cfg(1000, 1, 0));
        assert_eq!(out.chunks.len(), 2);
        assert_eq!(out.chunks[0].heading.as_deref(), Some("One"));
        assert_eq!(out.chunks[1].heading.as_deref(), Some("Two"));
        assert!(out.chunks[0].text.starts_with("# One"));
        assert!(out.chunks[1].text.starts_with("## Two"));
    }

    #[test]
    fn test_markdown_preamble_without_heading() {
        let d = doc("intro paragraph before any heading\n# First\nbody\n");
        let out = chunk_document(&d, ContentType::Markdown, &cfg(1000, 1, 0));
        assert_eq!(out.chunks.len(), 2);
        assert_eq!(out.chunks[0].heading, None);
        assert_eq!(out.chunks[1].heading.as_deref(), Some("First"));
    }

    #[test]
    fn test_oversized_markdown_section_split_with_overlap() {
        let content = format!("# Intro\nHello world.\n# Details\n{}", "x".repeat(9000));
        let d = doc(&content);
        let out = chunk_document(&d, ContentType::Markdown, &cfg(8000, 100, 200));

        assert_eq!(out.chunks.len(), 3);
        assert_eq!(out.chunks[0].heading.as_deref(), Some("Intro"));
        assert_eq!(out.chunks[1].heading.as_deref(), Some("Details"));
        assert_eq!(out.chunks[2].heading.as_deref(), Some("Details"));

        // Short structural section is kept.
        assert!(out.chunks[0].text.len() < 100);
        // Split lands at the size limit; continuation starts 200 bytes back.
        assert!(out.chunks[1].text.len() <= 8000);
        assert_eq!(out.chunks[1].end_offset - out.chunks[2].start_offset, 200);
    }

    #[test]
    fn test_chunking_idempotent() {
        let content = format!("# A\n{}\n# B\n{}", "lorem ipsum ".repeat(300), "y".repeat(500));
        let d = doc(&content);
        let c = cfg(1000, 50, 100);
        let first = chunk_document(&d, ContentType::Markdown, &c);
        let second = chunk_document(&d, ContentType::Markdown, &c);
        assert_eq!(first.chunks.len(), second.chunks.len());
        for (a, b) in first.chunks.iter().zip(second.chunks.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.text, b.text);
            assert_eq!(a.start_offset, b.start_offset);
            assert_eq!(a.end_offset, b.end_offset);
        }
    }

    #[test]
    fn test_offsets_monotonic_and_anchored() {
        let content = "The first sentence is here. Another one follows! Is this a question? "
            .repeat(40);
        let d = doc(&content);
        let out = chunk_document(&d, ContentType::PlainText, &cfg(400, 50, 60));
        assert!(out.chunks.len() > 1);
        let mut prev_start = 0;
        let mut prev_end = 0;
        for c in &out.chunks {
            assert!(c.end_offset > c.start_offset);
            assert!(c.start_offset >= prev_start);
            assert!(c.end_offset > prev_end);
            assert_eq!(c.text, &d.content[c.start_offset..c.end_offset]);
            assert!(c.text.len() <= 400);
            prev_start = c.start_offset;
            prev_end = c.end_offset;
        }
    }

    #[test]
    fn test_plain_text_overlap_region_shared() {
        let content = "alpha beta gamma delta. ".repeat(60);
        let d = doc(&content);
        let out = chunk_document(&d, ContentType::PlainText, &cfg(300, 20, 50));
        assert!(out.chunks.len() > 1);
        for pair in out.chunks.windows(2) {
            // Overlapping or contiguous, never a gap.
            assert!(pair[1].start_offset <= pair[0].end_offset);
        }
    }

    #[test]
    fn test_code_breaks_on_lines() {
        let content = "fn one() {}\n".repeat(200);
        let d = doc(&content);
        let out = chunk_document(&d, ContentType::Code, &cfg(500, 20, 40));
        assert!(out.chunks.len() > 1);
        for c in &out.chunks {
            // Breaks land after newlines, so a chunk always ends on a
            // complete line (trailing whitespace trimmed).
            assert!(c.text.ends_with('}'), "chunk ends mid-line: {:?}", &c.text[c.text.len().saturating_sub(12)..]);
            assert!(c.text.len() <= 500);
        }
    }

    #[test]
    fn test_json_array_grouped() {
        let items: Vec<String> = (0..40)
            .map(|i| format!(r#"{{"id":{},"name":"item-{}"}}"#, i, i))
            .collect();
        let content = format!("[{}]", items.join(","));
        let d = doc(&content);
        let out = chunk_document(&d, ContentType::Json, &cfg(300, 1, 0));
        assert!(out.chunks.len() > 1);
        let mut total = 0;
        for c in &out.chunks {
            let v: serde_json::Value = serde_json::from_str(&c.text).unwrap();
            total += v.as_array().unwrap().len();
            assert!(c.end_offset > c.start_offset);
        }
        assert_eq!(total, 40);
    }

    #[test]
    fn test_json_object_grouped_by_keys() {
        let pairs: Vec<String> = (0..30)
            .map(|i| format!(r#""key_{}":"{}""#, i, "v".repeat(20)))
            .collect();
        let content = format!("{{{}}}", pairs.join(","));
        let d = doc(&content);
        let out = chunk_document(&d, ContentType::Json, &cfg(200, 1, 0));
        assert!(out.chunks.len() > 1);
        let mut keys = 0;
        for c in &out.chunks {
            let v: serde_json::Value = serde_json::from_str(&c.text).unwrap();
            keys += v.as_object().unwrap().len();
        }
        assert_eq!(keys, 30);
    }

    #[test]
    fn test_invalid_json_falls_back() {
        let d = doc("this is { not valid json at all");
        let out = chunk_document(&d, ContentType::Json, &cfg(1000, 1, 0));
        assert_eq!(out.chunks.len(), 1);
        assert!(out.warnings.iter().any(|w| w.contains("invalid JSON")));
    }

    #[test]
    fn test_xml_top_level_elements() {
        let d = doc("<a>first element body</a>\nbetween text\n<b>second element body</b>");
        let out = chunk_document(&d, ContentType::Xml, &cfg(1000, 1, 0));
        assert_eq!(out.chunks.len(), 3);
        assert_eq!(out.chunks[0].text, "<a>first element body</a>");
        assert_eq!(out.chunks[1].text, "between text");
        assert_eq!(out.chunks[2].text, "<b>second element body</b>");
    }

    #[test]
    fn test_xml_oversized_element_split() {
        let content = format!("<doc>{}</doc>", "word ".repeat(200));
        let d = doc(&content);
        let out = chunk_document(&d, ContentType::Xml, &cfg(300, 20, 40));
        assert!(out.chunks.len() > 1);
        for c in &out.chunks {
            assert!(c.text.len() <= 300);
        }
    }

    #[test]
    fn test_xml_without_elements_falls_back() {
        let d = doc("no angle brackets in sight, just prose");
        let out = chunk_document(&d, ContentType::Xml, &cfg(1000, 1, 0));
        assert_eq!(out.chunks.len(), 1);
        assert!(out.warnings.iter().any(|w| w.contains("falling back")));
    }

    #[test]
    fn test_undersized_trailing_chunk_dropped() {
        let content = "word ".repeat(21); // 105 bytes; tail fragment < min
        let d = doc(&content);
        let out = chunk_document(&d, ContentType::PlainText, &cfg(100, 40, 10));
        assert_eq!(out.chunks.len(), 1);
        assert!(out.warnings.iter().any(|w| w.contains("undersized")));
    }

    #[test]
    fn test_stats_computed() {
        let d = doc("# A\nalpha body text\n# B\nbeta body text here\n");
        let out = chunk_document(&d, ContentType::Markdown, &cfg(1000, 1, 0));
        assert_eq!(out.stats.count, 2);
        assert!(out.stats.min_size <= out.stats.avg_size);
        assert!(out.stats.avg_size <= out.stats.max_size);
    }

    #[test]
    fn test_empty_document_yields_no_chunks() {
        let d = doc("   \n  ");
        let out = chunk_document(&d, ContentType::PlainText, &cfg(100, 10, 0));
        assert!(out.chunks.is_empty());
        assert_eq!(out.stats.count, 0);
    }
}

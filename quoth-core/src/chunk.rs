//! Splits a document into ordered, self-contained chunks.
//!
//! Code files (recognized by extension) are split on top-level declaration
//! boundaries using a line-level heuristic — indentation-zero lines that
//! open a function/class/struct/etc after stripping modifier keywords
//! (`pub`, `export`, `async`, ...). Prose is split on level-2 markdown
//! headers (`## `), with any YAML frontmatter preserved on the first
//! chunk. Chunks under 50 trimmed characters are discarded; if that
//! leaves nothing, the whole document becomes a single chunk.
//!
//! The chunker is pure — no I/O, no knowledge of the document's id or
//! embedding model.

use std::collections::HashMap;

const DECL_PREFIXES: &[&str] = &[
    "fn ", "func ", "function ", "def ", "class ", "struct ", "impl ", "interface ", "trait ",
    "enum ", "type ", "const ", "module ",
];

const MODIFIER_PREFIXES: &[&str] = &[
    "pub(crate) ",
    "pub ",
    "export default ",
    "export ",
    "async ",
    "public ",
    "private ",
    "protected ",
    "static ",
    "abstract ",
    "override ",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkMeta {
    pub chunk_index: i64,
    pub language: Option<String>,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    pub parent_context: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawChunk {
    pub content: String,
    pub meta: ChunkMeta,
}

impl RawChunk {
    /// `chunk_hash = md5(trimmed content)`, per §3's DocumentChunk invariant.
    pub fn hash(&self) -> String {
        format!("{:x}", md5::compute(self.content.trim().as_bytes()))
    }
}

/// Split `content` (the body of `file_path`) into chunks.
pub fn chunk(file_path: &str, content: &str) -> Vec<RawChunk> {
    let language = detect_language(file_path);
    let mut raw = match &language {
        Some(lang) => chunk_code(lang, content),
        None => chunk_prose(content),
    };

    raw.retain(|c| c.content.trim().chars().count() >= 50);

    if raw.is_empty() {
        let trimmed = content.trim();
        raw = vec![RawChunk {
            content: trimmed.to_string(),
            meta: ChunkMeta::default(),
        }];
    }

    for (i, c) in raw.iter_mut().enumerate() {
        c.meta.chunk_index = i as i64;
    }

    raw
}

fn detect_language(file_path: &str) -> Option<String> {
    let ext = file_path.rsplit('.').next()?.to_ascii_lowercase();
    let map: HashMap<&str, &str> = [
        ("rs", "rust"),
        ("py", "python"),
        ("js", "javascript"),
        ("jsx", "javascript"),
        ("mjs", "javascript"),
        ("ts", "typescript"),
        ("tsx", "typescript"),
        ("go", "go"),
        ("java", "java"),
        ("rb", "ruby"),
        ("c", "c"),
        ("h", "c"),
        ("cpp", "cpp"),
        ("cc", "cpp"),
        ("hpp", "cpp"),
        ("cs", "csharp"),
        ("php", "php"),
        ("swift", "swift"),
        ("kt", "kotlin"),
    ]
    .into_iter()
    .collect();
    map.get(ext.as_str()).map(|s| s.to_string())
}

fn strip_modifiers(line: &str) -> &str {
    let mut s = line;
    loop {
        let mut changed = false;
        for modifier in MODIFIER_PREFIXES {
            if let Some(rest) = s.strip_prefix(modifier) {
                s = rest;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    s
}

fn is_decl_start(line: &str) -> bool {
    if line.is_empty() || line.starts_with(char::is_whitespace) {
        return false;
    }
    let stripped = strip_modifiers(line);
    DECL_PREFIXES.iter().any(|p| stripped.starts_with(p))
}

fn extract_decl_name(line: &str) -> Option<String> {
    let stripped = strip_modifiers(line);
    for prefix in DECL_PREFIXES {
        if let Some(rest) = stripped.strip_prefix(prefix) {
            let name: String = rest
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if !name.is_empty() {
                return Some(name);
            }
        }
    }
    None
}

fn chunk_code(language: &str, content: &str) -> Vec<RawChunk> {
    let lines: Vec<&str> = content.lines().collect();
    let starts: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| is_decl_start(line))
        .map(|(i, _)| i)
        .collect();

    if starts.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    for (idx, &start) in starts.iter().enumerate() {
        let end = starts.get(idx + 1).copied().unwrap_or(lines.len());
        let body = lines[start..end].join("\n");
        let trimmed = body.trim();
        if trimmed.is_empty() {
            continue;
        }
        chunks.push(RawChunk {
            content: trimmed.to_string(),
            meta: ChunkMeta {
                chunk_index: 0,
                language: Some(language.to_string()),
                start_line: Some((start + 1) as u32),
                end_line: Some(end as u32),
                parent_context: extract_decl_name(lines[start]),
            },
        });
    }
    chunks
}

/// Returns `(frontmatter_block, remaining_body)`. `frontmatter_block`
/// includes the `---` delimiters verbatim so it can be reattached as-is.
fn extract_frontmatter(content: &str) -> (Option<String>, &str) {
    if let Some(rest) = content.strip_prefix("---\n") {
        if let Some(end) = rest.find("\n---") {
            let fm_body = &rest[..end];
            let after = &rest[end + 4..];
            let after = after.strip_prefix('\n').unwrap_or(after);
            return (Some(format!("---\n{}\n---", fm_body)), after);
        }
    }
    (None, content)
}

fn chunk_prose(content: &str) -> Vec<RawChunk> {
    let (frontmatter, body) = extract_frontmatter(content);
    let lines: Vec<&str> = body.lines().collect();
    let header_positions: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.starts_with("## "))
        .map(|(i, _)| i)
        .collect();

    if header_positions.is_empty() {
        let mut full = String::new();
        if let Some(fm) = &frontmatter {
            full.push_str(fm);
            full.push_str("\n\n");
        }
        full.push_str(body);
        return vec![RawChunk {
            content: full.trim().to_string(),
            meta: ChunkMeta::default(),
        }];
    }

    let mut chunks = Vec::new();

    if header_positions[0] > 0 {
        let mut pre = String::new();
        if let Some(fm) = &frontmatter {
            pre.push_str(fm);
            pre.push_str("\n\n");
        }
        pre.push_str(&lines[0..header_positions[0]].join("\n"));
        let trimmed = pre.trim();
        if !trimmed.is_empty() {
            chunks.push(RawChunk {
                content: trimmed.to_string(),
                meta: ChunkMeta::default(),
            });
        }
    }

    for (idx, &start) in header_positions.iter().enumerate() {
        let end = header_positions.get(idx + 1).copied().unwrap_or(lines.len());
        let mut section = lines[start..end].join("\n");
        if idx == 0 && header_positions[0] == 0 {
            if let Some(fm) = &frontmatter {
                section = format!("{}\n\n{}", fm, section);
            }
        }
        let trimmed = section.trim();
        if !trimmed.is_empty() {
            chunks.push(RawChunk {
                content: trimmed.to_string(),
                meta: ChunkMeta::default(),
            });
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_splits_on_top_level_declarations() {
        let content = "use std::fmt;\n\npub fn one() -> i32 {\n    let value = 1;\n    value + 1\n}\n\nfn two() -> i32 {\n    let value = 2;\n    value + 2\n}\n";
        let chunks = chunk("src/lib.rs", content);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].meta.parent_context.as_deref(), Some("one"));
        assert_eq!(chunks[1].meta.parent_context.as_deref(), Some("two"));
        assert_eq!(chunks[0].meta.language.as_deref(), Some("rust"));
    }

    #[test]
    fn prose_splits_on_h2_headers() {
        let content = "# Title\n\nIntro text that is long enough to survive the fifty character minimum easily.\n\n## Section A\n\nBody of section A padded out so it clears the fifty character floor.\n\n## Section B\n\nBody of section B padded out so it clears the fifty character floor.\n";
        let chunks = chunk("docs/arch.md", content);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[1].content.starts_with("## Section A"));
        assert!(chunks[2].content.starts_with("## Section B"));
    }

    #[test]
    fn frontmatter_is_preserved_on_first_chunk() {
        let content = "---\ndoc_type: architecture\n---\n## Section A\n\nBody of section A padded out so it clears the fifty character floor.\n";
        let chunks = chunk("docs/arch.md", content);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.starts_with("---\ndoc_type: architecture\n---"));
    }

    #[test]
    fn no_headers_yields_single_chunk_of_whole_document() {
        let content = "Just a plain document with no headers at all, long enough to clear the floor easily.";
        let chunks = chunk("docs/notes.md", content);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, content);
    }

    #[test]
    fn short_chunks_are_discarded_unless_all_are() {
        let content = "## A\n\nshort\n\n## B\n\nshort\n";
        let chunks = chunk("docs/arch.md", content);
        // Both sections are under 50 chars after trimming; since everything
        // was discarded, the whole document becomes one chunk.
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, content.trim());
    }

    #[test]
    fn chunk_indices_are_contiguous() {
        let content = "## A\n\nBody of section A padded out so it clears the fifty character floor.\n\n## B\n\nBody of section B padded out so it clears the fifty character floor.\n\n## C\n\nBody of section C padded out so it clears the fifty character floor.\n";
        let chunks = chunk("docs/arch.md", content);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.meta.chunk_index, i as i64);
        }
    }

    #[test]
    fn hash_is_md5_of_trimmed_content() {
        let chunks = chunk(
            "docs/notes.md",
            "A plain document with no headers, long enough to clear the fifty char floor.",
        );
        let expected = format!(
            "{:x}",
            md5::compute(chunks[0].content.trim().as_bytes())
        );
        assert_eq!(chunks[0].hash(), expected);
    }

    #[test]
    fn exactly_fifty_chars_is_kept_forty_nine_is_dropped() {
        // "## A\n\n" is 6 chars; a 44-char body makes a 50-char trimmed chunk.
        let kept_body = "a".repeat(44);
        let dropped_body = "a".repeat(43);
        let content = format!("## A\n\n{}\n\n## B\n\n{}\n", kept_body, dropped_body);
        let chunks = chunk("docs/arch.md", &content);
        assert_eq!(chunks[0].content.trim().chars().count(), 50);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains(&kept_body));
        assert!(!chunks[0].content.contains(&dropped_body));
    }
}

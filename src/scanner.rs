//! Per-line document context scanning.
//!
//! Everything the entity parsers know about document structure comes from
//! this module: code-fence toggles, quote/callout nesting depth, and
//! fenced-math delimiters. The scanner is a pure function of the previous
//! line's context plus the current line's text; there is no lookahead, so
//! `quote_depth` and `in_code_block` depend only on prior lines.
//!
//! These are deliberately hand-written character scanners rather than
//! regexes: the classifications are trivial prefix checks and run on every
//! line of every parse pass.

/// Carry-over state between lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineContext {
    pub in_code_block: bool,
    pub quote_depth: u32,
    pub in_equation_block: bool,
}

/// A heading classification: marker count and trimmed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: usize,
    pub text: String,
}

/// One line's classification plus the context that now applies.
#[derive(Debug, Clone, Default)]
pub struct ScannedLine {
    /// State after this line has been consumed.
    pub context: LineContext,
    /// Line content with quote markers stripped; what entity parsers see.
    pub cleaned: String,
    /// Quote nesting depth of this line.
    pub quote_depth: u32,
    /// The line opened or closed a fenced code block.
    pub fence_toggle: bool,
    pub heading: Option<Heading>,
    /// The line opens a multi-line equation block.
    pub equation_start: bool,
    /// The line closes a multi-line equation block.
    pub equation_end: bool,
    /// Inline `$$ ... $$` body, delimiters excluded.
    pub single_line_equation: Option<String>,
    /// The cleaned line begins an image reference.
    pub image_line: bool,
}

impl ScannedLine {
    /// True when entity syntax may be recognized on this line: not inside a
    /// code fence and not the fence delimiter itself.
    pub fn is_live(&self) -> bool {
        !self.fence_toggle && !self.context.in_code_block
    }
}

/// Stateful scanner over a document's lines, front to back.
#[derive(Debug, Default)]
pub struct LineScanner {
    context: LineContext,
}

impl LineScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// State after the most recently scanned line.
    pub fn context(&self) -> &LineContext {
        &self.context
    }

    pub fn advance(&mut self, line: &str) -> ScannedLine {
        let scanned = scan_line(&self.context, line);
        self.context = scanned.context.clone();
        scanned
    }
}

/// Counts leading `>` markers (each optionally followed by one space) and
/// returns the remaining content. Whitespace is allowed before each marker.
pub fn strip_quote_markers(line: &str) -> (u32, &str) {
    let mut depth = 0;
    let mut rest = line;
    loop {
        let trimmed = rest.trim_start_matches([' ', '\t']);
        match trimmed.strip_prefix('>') {
            Some(after) => {
                depth += 1;
                rest = after.strip_prefix(' ').unwrap_or(after);
            }
            None => {
                if depth > 0 {
                    rest = trimmed;
                }
                break;
            }
        }
    }
    (depth, rest)
}

fn is_fence_delimiter(cleaned: &str) -> bool {
    let trimmed = cleaned.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// `$$ ... $$` fully on one line. The body may be empty.
fn single_line_equation(trimmed: &str) -> Option<String> {
    if trimmed.len() >= 4 && trimmed.starts_with("$$") && trimmed.ends_with("$$") {
        Some(trimmed[2..trimmed.len() - 2].trim().to_string())
    } else {
        None
    }
}

fn heading(cleaned: &str) -> Option<Heading> {
    let level = cleaned.bytes().take_while(|&b| b == b'#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &cleaned[level..];
    if !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    Some(Heading {
        level,
        text: rest.trim().to_string(),
    })
}

/// Classifies one line given the context established by its predecessors.
pub fn scan_line(prev: &LineContext, line: &str) -> ScannedLine {
    let (quote_depth, cleaned) = strip_quote_markers(line);
    let mut out = ScannedLine {
        cleaned: cleaned.to_string(),
        quote_depth,
        context: LineContext {
            in_code_block: prev.in_code_block,
            quote_depth,
            in_equation_block: prev.in_equation_block,
        },
        ..Default::default()
    };

    // Fence toggles come before every other classification: a line can
    // close a fence and be otherwise ignorable. Equation-block bodies are
    // math text, so a backtick run inside one does not toggle.
    if !prev.in_equation_block && is_fence_delimiter(cleaned) {
        out.fence_toggle = true;
        out.context.in_code_block = !prev.in_code_block;
        return out;
    }
    if prev.in_code_block {
        return out;
    }

    let trimmed = cleaned.trim();

    if prev.in_equation_block {
        if trimmed.ends_with("$$") {
            out.equation_end = true;
            out.context.in_equation_block = false;
        }
        return out;
    }

    if let Some(body) = single_line_equation(trimmed) {
        out.single_line_equation = Some(body);
        return out;
    }
    if trimmed.starts_with("$$") {
        out.equation_start = true;
        out.context.in_equation_block = true;
        return out;
    }

    if quote_depth == 0 {
        out.heading = heading(cleaned);
    }
    out.image_line = trimmed.starts_with("![");

    out
}

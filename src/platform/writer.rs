//! Indentation-aware text builder used by every generator.

/// Accumulates source text line by line at the current indentation.
#[derive(Debug, Clone)]
pub struct CodeWriter {
    out: String,
    depth: usize,
    unit: &'static str,
}

impl CodeWriter {
    pub fn new(unit: &'static str) -> Self {
        Self {
            out: String::new(),
            depth: 0,
            unit,
        }
    }

    /// Write one line; an empty line carries no indentation.
    pub fn line(&mut self, text: impl AsRef<str>) -> &mut Self {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.out.push_str(self.unit);
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
        self
    }

    /// Write each line of a multi-line snippet at the current indentation.
    pub fn lines(&mut self, text: &str) -> &mut Self {
        for line in text.lines() {
            self.line(line);
        }
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
        self
    }

    pub fn indent(&mut self) -> &mut Self {
        self.depth += 1;
        self
    }

    pub fn dedent(&mut self) -> &mut Self {
        self.depth = self.depth.saturating_sub(1);
        self
    }

    /// Write `header` and indent what follows.
    pub fn open(&mut self, header: impl AsRef<str>) -> &mut Self {
        self.line(header);
        self.indent()
    }

    /// Dedent and write `footer`.
    pub fn close(&mut self, footer: impl AsRef<str>) -> &mut Self {
        self.dedent();
        self.line(footer)
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_blocks_indent() {
        let mut w = CodeWriter::new("    ");
        w.open("class A {").open("void f() {").line("x();").close("}").close("}");
        assert_eq!(w.finish(), "class A {\n    void f() {\n        x();\n    }\n}\n");
    }

    #[test]
    fn blank_lines_do_not_stack() {
        let mut w = CodeWriter::new("  ");
        w.line("a").blank().blank().line("b");
        assert_eq!(w.finish(), "a\n\nb\n");
    }

    #[test]
    fn dedent_saturates() {
        let mut w = CodeWriter::new("\t");
        w.dedent().line("x");
        assert_eq!(w.finish(), "x\n");
    }
}

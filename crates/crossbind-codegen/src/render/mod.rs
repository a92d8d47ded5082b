//! Renderers turn a [`BindingPlan`] into source text.
//!
//! Each target implements [`Renderer`] and reads nothing but the plan, so a
//! new target never touches the scan or lowering logic. Both built-in
//! targets share [`CodeWriter`] for indentation.
//!
//! # Example
//!
//! ```
//! use crossbind_codegen::render::{CodeWriter, RenderOptions};
//!
//! let mut w = CodeWriter::new();
//! w.line("fn main() {");
//! w.indent(|w| w.line("println!(\"hi\");"));
//! w.line("}");
//! assert_eq!(w.finish(), "fn main() {\n    println!(\"hi\");\n}\n");
//!
//! let options = RenderOptions::default();
//! assert_eq!(options.native_module, "bindings");
//! ```

mod managed;
mod native;

pub use managed::ManagedRenderer;
pub use native::NativeRenderer;

use std::fmt::Write as _;

use crate::ir::BindingPlan;

/// A code emission target.
pub trait Renderer {
    /// Suggested file name of the output.
    fn file_name(&self) -> String;

    /// Render the whole plan.
    fn render(&self, plan: &BindingPlan) -> String;
}

/// Settings shared by the renderers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Namespace of the generated managed code.
    pub managed_namespace: String,
    /// Module name of the generated native code.
    pub native_module: String,
    /// Library name the managed side imports native exports from.
    pub library_name: String,
    /// Emit signature comments above each trampoline.
    pub emit_comments: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            managed_namespace: "Crossbind".to_string(),
            native_module: "bindings".to_string(),
            library_name: "NativeScript".to_string(),
            emit_comments: true,
        }
    }
}

/// Indentation-aware string builder.
#[derive(Debug, Default)]
pub struct CodeWriter {
    out: String,
    depth: usize,
}

impl CodeWriter {
    const INDENT: &'static str = "    ";

    pub fn new() -> Self {
        Self::default()
    }

    /// Write one line at the current depth. Empty lines carry no indentation.
    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.out.push_str(Self::INDENT);
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Write formatted text as one line.
    pub fn fmt_line(&mut self, args: std::fmt::Arguments<'_>) {
        let mut text = String::new();
        let _ = text.write_fmt(args);
        self.line(text);
    }

    /// Run `f` one level deeper.
    pub fn indent(&mut self, f: impl FnOnce(&mut Self)) {
        self.depth += 1;
        f(self);
        self.depth -= 1;
    }

    /// `open` / indented body / `close`.
    pub fn block(&mut self, open: impl AsRef<str>, close: &str, f: impl FnOnce(&mut Self)) {
        self.line(open);
        self.indent(f);
        self.line(close);
    }

    /// Allman-style block: `open`, then `{` and `}` on their own lines.
    pub fn braced(&mut self, open: impl AsRef<str>, f: impl FnOnce(&mut Self)) {
        self.line(open);
        self.block("{", "}", f);
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_blocks() {
        let mut w = CodeWriter::new();
        w.block("a {", "}", |w| {
            w.block("b {", "}", |w| w.line("c"));
            w.blank();
        });
        assert_eq!(w.finish(), "a {\n    b {\n        c\n    }\n\n}\n");
    }
}

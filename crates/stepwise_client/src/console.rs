use std::io::{self, Write};

use stepwise::{RenderInstruction, Renderer, TextRenderer};

const STATUS_WIDTH: usize = 72;
const CLEAR_LINE: &str = "\r\x1b[2K";
const SEPARATOR: &str = "----------------------------------------";

/// Line-oriented terminal view over a [`TextRenderer`].
///
/// Finalized blocks are printed once, in order. The streaming placeholder is a
/// single status line that is rewritten in place and erased when it settles.
pub struct ConsoleView<W: Write> {
    renderer: TextRenderer,
    printed: usize,
    status_visible: bool,
    out: W,
}

impl<W: Write> ConsoleView<W> {
    pub fn new(out: W) -> Self {
        Self {
            renderer: TextRenderer::new(),
            printed: 0,
            status_visible: false,
            out,
        }
    }

    pub fn renderer(&self) -> &TextRenderer {
        &self.renderer
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn present(&mut self, instructions: &[RenderInstruction]) -> io::Result<()> {
        if instructions.is_empty() {
            return Ok(());
        }

        for instruction in instructions {
            if matches!(instruction, RenderInstruction::ClearTranscript) {
                self.clear_status()?;
                writeln!(self.out, "{SEPARATOR}")?;
                self.printed = 0;
            }
            self.renderer.apply(instruction);
        }

        let blocks = self.renderer.blocks();
        if blocks.len() > self.printed {
            if self.status_visible {
                write!(self.out, "{CLEAR_LINE}")?;
                self.status_visible = false;
            }
            for block in &blocks[self.printed..] {
                writeln!(self.out, "{block}\n")?;
            }
            self.printed = blocks.len();
        }

        match self.renderer.placeholder().map(status_line) {
            Some(line) => {
                write!(self.out, "{CLEAR_LINE}{line}")?;
                self.status_visible = true;
            }
            None => self.clear_status()?,
        }

        self.out.flush()
    }

    pub fn notice(&mut self, text: &str) -> io::Result<()> {
        self.clear_status()?;
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }

    fn clear_status(&mut self) -> io::Result<()> {
        if self.status_visible {
            write!(self.out, "{CLEAR_LINE}")?;
            self.status_visible = false;
        }
        Ok(())
    }
}

/// Last non-empty line of the streaming text, cut to the status width.
fn status_line(text: &str) -> String {
    let last = text
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("");
    let count = last.chars().count();
    if count <= STATUS_WIDTH {
        return last.to_string();
    }

    let tail: String = last.chars().skip(count - (STATUS_WIDTH - 3)).collect();
    format!("...{tail}")
}

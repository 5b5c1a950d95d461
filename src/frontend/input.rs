use std::collections::VecDeque;
use std::io::{self, BufRead};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    /// Marks the end of the tokens read from one line.
    EndOfLine,
    EndOfInput,
}

/// Line-buffered whitespace tokenizer over a text stream.
///
/// A new line is only read once every token of the previous one, including
/// its end-of-line marker, has been taken.
pub struct LineInput<R> {
    reader: R,
    buffer: VecDeque<Token>,
    line: usize,
}

impl<R: BufRead> LineInput<R> {
    pub fn new(reader: R) -> Self {
        LineInput {
            reader,
            buffer: VecDeque::new(),
            line: 0,
        }
    }

    /// True when the next token will come from a fresh line.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of lines read so far.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn next_token(&mut self) -> io::Result<Token> {
        if self.buffer.is_empty() && !self.fill()? {
            return Ok(Token::EndOfInput);
        }
        Ok(self.buffer.pop_front().unwrap_or(Token::EndOfLine))
    }

    /// Drops the rest of the current line, keeping its end-of-line marker so
    /// that the token loop for this line still terminates.
    pub fn discard_line(&mut self) {
        if !self.buffer.is_empty() {
            self.buffer.clear();
            self.buffer.push_back(Token::EndOfLine);
        }
    }

    fn fill(&mut self) -> io::Result<bool> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(false);
        }
        self.line += 1;

        self.buffer
            .extend(line.split_whitespace().map(|w| Token::Word(w.to_string())));
        self.buffer.push_back(Token::EndOfLine);
        Ok(true)
    }
}

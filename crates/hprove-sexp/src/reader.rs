//! Incremental S-expression reader over a line source.
//!
//! The reader is a pull machine: callers feed it lines (`feed_line`) and an
//! end-of-input marker (`feed_eof`), then poll it for complete top-level
//! S-expressions. A quoted atom may span lines, in which case the line break
//! is preserved as a literal newline in the atom text. `;` starts a comment
//! that extends to end of line.
//!
//! Parse errors are reported through the error handler; the reader then
//! discards the remainder of the current line and resynchronizes, so one bad
//! reply cannot desynchronize the whole stream.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedReceiver;

use crate::{SExpr, SexpError};

/// Callback invoked with a message for every parse error.
pub type ErrorHandler = Box<dyn FnMut(String) + Send>;

/// Result of polling the reader.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The buffered input is exhausted and end-of-input has not been seen.
    NeedLine,
    /// One complete top-level S-expression.
    Sexpr(SExpr),
    /// A parse error was reported; the current reply is lost.
    Null,
    /// End of input.
    End,
}

struct Frame {
    name: Option<String>,
    args: Vec<SExpr>,
}

struct Quote {
    delim: char,
    text: String,
}

/// Restartable S-expression reader. Each poll yields at most one top-level
/// S-expression; state (open parentheses, partial quoted atoms) carries over
/// between polls and between lines.
pub struct SExprReader {
    pending: VecDeque<String>,
    current: Vec<char>,
    pos: usize,
    have_line: bool,
    closed: bool,
    stack: Vec<Frame>,
    quote: Option<Quote>,
    on_error: ErrorHandler,
}

impl SExprReader {
    /// A reader whose parse errors go to `tracing::error!`.
    pub fn new() -> Self {
        Self::with_handler(Box::new(|msg| tracing::error!("{msg}")))
    }

    /// A reader with a custom parse-error handler.
    pub fn with_handler(on_error: ErrorHandler) -> Self {
        SExprReader {
            pending: VecDeque::new(),
            current: Vec::new(),
            pos: 0,
            have_line: false,
            closed: false,
            stack: Vec::new(),
            quote: None,
            on_error,
        }
    }

    /// Buffers one input line.
    pub fn feed_line(&mut self, line: String) {
        self.pending.push_back(line);
    }

    /// Marks the line source as exhausted.
    pub fn feed_eof(&mut self) {
        self.closed = true;
    }

    /// True when everything fed so far has been consumed and end-of-input
    /// was seen.
    pub fn exhausted(&self) -> bool {
        self.closed
            && self.pending.is_empty()
            && (!self.have_line || self.pos >= self.current.len())
    }

    /// Reads one S-expression from an async line channel. Returns `None` on
    /// end of input and on parse errors (after reporting them).
    pub async fn read_from(&mut self, lines: &mut UnboundedReceiver<String>) -> Option<SExpr> {
        loop {
            match self.poll_read() {
                ReadOutcome::Sexpr(e) => return Some(e),
                ReadOutcome::Null | ReadOutcome::End => return None,
                ReadOutcome::NeedLine => match lines.recv().await {
                    Some(line) => self.feed_line(line),
                    None => self.feed_eof(),
                },
            }
        }
    }

    /// Advances the machine until a top-level S-expression completes, input
    /// runs out, or a parse error is hit.
    pub fn poll_read(&mut self) -> ReadOutcome {
        loop {
            if !self.ensure_line() {
                if self.closed {
                    return self.finish_at_eof();
                }
                return ReadOutcome::NeedLine;
            }

            if self.quote.is_some() {
                if let Some(atom) = self.scan_quote() {
                    if let Some(out) = self.emit_atom(atom) {
                        return out;
                    }
                }
                continue;
            }

            let c = self.current[self.pos];
            if c.is_whitespace() {
                self.pos += 1;
            } else if c == ';' {
                self.pos = self.current.len();
            } else if c == '(' {
                self.pos += 1;
                // A list head that is itself a list leaves the name empty.
                if let Some(top) = self.stack.last_mut() {
                    if top.name.is_none() {
                        top.name = Some(String::new());
                    }
                }
                self.stack.push(Frame {
                    name: None,
                    args: Vec::new(),
                });
            } else if c == ')' {
                self.pos += 1;
                match self.stack.pop() {
                    Some(frame) => {
                        let e = SExpr::app(frame.name.unwrap_or_default(), frame.args);
                        if let Some(top) = self.stack.last_mut() {
                            top.args.push(e);
                        } else {
                            return ReadOutcome::Sexpr(e);
                        }
                    }
                    None => {
                        self.report("unexpected `)`".to_string());
                        self.pos = self.current.len();
                        return ReadOutcome::Null;
                    }
                }
            } else if c == '"' || c == '|' {
                self.pos += 1;
                self.quote = Some(Quote {
                    delim: c,
                    text: String::new(),
                });
            } else {
                let atom = self.scan_bare();
                if let Some(out) = self.emit_atom(atom) {
                    return out;
                }
            }
        }
    }

    /// Makes the current line usable, pulling buffered lines as needed.
    /// Returns false when no input is left.
    fn ensure_line(&mut self) -> bool {
        loop {
            if self.have_line && self.pos < self.current.len() {
                return true;
            }
            match self.pending.pop_front() {
                Some(line) => {
                    // A line break inside a quoted atom is part of the atom.
                    if let Some(q) = &mut self.quote {
                        q.text.push('\n');
                    }
                    self.current = line.chars().collect();
                    self.pos = 0;
                    self.have_line = true;
                }
                None => return false,
            }
        }
    }

    fn finish_at_eof(&mut self) -> ReadOutcome {
        if self.quote.take().is_some() {
            self.report("unexpected end of input inside quoted atom".to_string());
            self.stack.clear();
            return ReadOutcome::End;
        }
        if let Some(frame) = self.stack.last() {
            let head = frame.name.clone().unwrap_or_default();
            self.report(format!("missing `)` for `({head}`"));
            self.stack.clear();
            return ReadOutcome::End;
        }
        ReadOutcome::End
    }

    /// Consumes a bare atom from the current line.
    fn scan_bare(&mut self) -> String {
        let start = self.pos;
        while self.pos < self.current.len() {
            let c = self.current[self.pos];
            if c.is_whitespace() || matches!(c, '(' | ')' | ';') {
                break;
            }
            self.pos += 1;
        }
        self.current[start..self.pos].iter().collect()
    }

    /// Continues the open quoted atom. Returns the completed text when the
    /// closing delimiter is found on the current line.
    fn scan_quote(&mut self) -> Option<String> {
        let delim = self.quote.as_ref().map(|q| q.delim).unwrap_or('"');
        while self.pos < self.current.len() {
            let c = self.current[self.pos];
            if delim == '"'
                && c == '\\'
                && self.pos + 1 < self.current.len()
                && self.current[self.pos + 1] == '"'
            {
                if let Some(q) = &mut self.quote {
                    q.text.push('"');
                }
                self.pos += 2;
                continue;
            }
            if c == delim {
                self.pos += 1;
                return self.quote.take().map(|q| q.text);
            }
            if let Some(q) = &mut self.quote {
                q.text.push(c);
            }
            self.pos += 1;
        }
        None
    }

    /// Routes a completed atom: list-head name, argument, or top-level value.
    fn emit_atom(&mut self, text: String) -> Option<ReadOutcome> {
        match self.stack.last_mut() {
            Some(top) => {
                if top.name.is_none() {
                    top.name = Some(text);
                } else {
                    top.args.push(SExpr::atom(text));
                }
                None
            }
            None => Some(ReadOutcome::Sexpr(SExpr::atom(text))),
        }
    }

    fn report(&mut self, msg: String) {
        (self.on_error)(msg);
    }
}

impl Default for SExprReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a complete string into its top-level S-expressions.
///
/// Used for already-assembled reply bodies (models) and in tests; the
/// session path uses [`SExprReader`] incrementally instead.
pub fn parse_sexprs(input: &str) -> Result<Vec<SExpr>, SexpError> {
    let errors = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&errors);
    let mut reader = SExprReader::with_handler(Box::new(move |msg| {
        if let Ok(mut errs) = sink.lock() {
            errs.push(msg);
        }
    }));
    for line in input.lines() {
        reader.feed_line(line.to_string());
    }
    reader.feed_eof();

    let mut out = Vec::new();
    loop {
        match reader.poll_read() {
            ReadOutcome::Sexpr(e) => out.push(e),
            ReadOutcome::Null => {
                if reader.exhausted() {
                    break;
                }
            }
            ReadOutcome::End => break,
            ReadOutcome::NeedLine => break,
        }
    }

    let errs = errors.lock().map_err(|_| {
        SexpError::Parse("error sink poisoned".to_string())
    })?;
    match errs.first() {
        Some(first) => Err(SexpError::Parse(first.clone())),
        None => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> Vec<SExpr> {
        parse_sexprs(input).expect("parse failed")
    }

    #[test]
    fn atoms_and_nesting() {
        let out = parse_ok("unsat");
        assert_eq!(out, vec![SExpr::atom("unsat")]);

        let out = parse_ok("(a (b c) d)");
        assert_eq!(
            out,
            vec![SExpr::app(
                "a",
                vec![
                    SExpr::app("b", vec![SExpr::atom("c")]),
                    SExpr::atom("d")
                ]
            )]
        );
    }

    #[test]
    fn comments_and_multiple_toplevel() {
        // The exact shape the batch driver sees from a chatty solver.
        let out = parse_ok("(foo (bar \"a b\") | q |)\n;comment\n(baz)");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].to_string(), "(foo (bar \"a b\") \" q \")");
        assert_eq!(out[1], SExpr::app("baz", vec![]));
    }

    #[test]
    fn quoted_atom_with_escape() {
        let out = parse_ok(r#"(error "a \"b\" c")"#);
        assert_eq!(out[0].arg(0).map(SExpr::name), Some("a \"b\" c"));
    }

    #[test]
    fn quoted_atom_spans_lines() {
        let out = parse_ok("(msg \"first\n\nthird\")");
        assert_eq!(out[0].arg(0).map(SExpr::name), Some("first\n\nthird"));
    }

    #[test]
    fn bar_quoted_atom_keeps_spaces() {
        let out = parse_ok("(f | spaced name |)");
        assert_eq!(out[0].arg(0).map(SExpr::name), Some(" spaced name "));
    }

    #[test]
    fn headless_list_gets_empty_name() {
        let out = parse_ok("((a 1) (b 2))");
        assert_eq!(out[0].name(), "");
        assert_eq!(out[0].args().len(), 2);
        assert_eq!(out[0].arg(0).map(SExpr::name), Some("a"));
    }

    #[test]
    fn stray_close_paren_is_an_error() {
        let err = parse_sexprs(") (ok)").unwrap_err();
        assert!(matches!(err, SexpError::Parse(msg) if msg.contains(")")));
    }

    #[test]
    fn unclosed_paren_names_the_head() {
        let err = parse_sexprs("(model (define-fun f").unwrap_err();
        let SexpError::Parse(msg) = err;
        assert!(msg.contains("define-fun"), "got: {msg}");
    }

    #[test]
    fn reader_is_restartable_across_polls() {
        let mut reader = SExprReader::new();
        reader.feed_line("(a)".to_string());
        assert_eq!(
            reader.poll_read(),
            ReadOutcome::Sexpr(SExpr::app("a", vec![]))
        );
        assert_eq!(reader.poll_read(), ReadOutcome::NeedLine);
        reader.feed_line("(b".to_string());
        assert_eq!(reader.poll_read(), ReadOutcome::NeedLine);
        reader.feed_line(")".to_string());
        assert_eq!(
            reader.poll_read(),
            ReadOutcome::Sexpr(SExpr::app("b", vec![]))
        );
        reader.feed_eof();
        assert_eq!(reader.poll_read(), ReadOutcome::End);
    }

    #[test]
    fn error_resynchronizes_to_next_line() {
        let out = parse_sexprs(") junk after\n(fine)");
        // The stray paren is reported, but the next line still parses.
        assert!(out.is_err());
    }

    #[tokio::test]
    async fn read_from_channel() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.send("(get-info".to_string()).unwrap();
        tx.send(" :rlimit 500)".to_string()).unwrap();
        drop(tx);

        let mut reader = SExprReader::new();
        let e = reader.read_from(&mut rx).await.expect("one sexpr");
        assert_eq!(e.name(), "get-info");
        assert_eq!(e.args().len(), 2);
        assert_eq!(reader.read_from(&mut rx).await, None);
    }
}

#[cfg(test)]
mod roundtrip {
    use super::*;
    use proptest::prelude::*;

    fn arb_atom() -> impl Strategy<Value = String> {
        // Printable text without backslashes; the printer quotes and escapes
        // as needed, so spaces, parens, and quotes are all fair game.
        "[a-zA-Z0-9 ();|:=<>._\"-]{0,16}"
    }

    fn arb_sexpr() -> impl Strategy<Value = SExpr> {
        let leaf = arb_atom().prop_map(SExpr::atom);
        leaf.prop_recursive(3, 24, 4, |inner| {
            ("[a-zA-Z0-9_.-]{1,8}", prop::collection::vec(inner, 1..4))
                .prop_map(|(name, args)| SExpr::app(name, args))
        })
    }

    proptest! {
        #[test]
        fn print_then_parse_is_identity(e in arb_sexpr()) {
            let text = e.to_string();
            let parsed = parse_sexprs(&text).expect("round-trip parse");
            prop_assert_eq!(parsed, vec![e]);
        }
    }
}

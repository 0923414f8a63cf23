//! Free-text query parsing.
//!
//! Accepted syntax, clause by clause:
//!
//! ```text
//! cat dog            any of the terms (default operator OR)
//! +cat -dog          required / prohibited
//! cat AND dog        also `&&`; `OR` / `||`; `NOT dog`
//! (cat OR dog) bird  grouping
//! "black cat"~2      phrase, optional slop
//! path:cat           field qualifier
//! ```
//!
//! Words are passed through the [`Analyzer`]; a word that analyzes to several
//! terms becomes a phrase, one that analyzes to nothing is dropped.

use crate::error::{QuarryError, Result};
use crate::tokenizer::Analyzer;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    Should,
    Must,
    MustNot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub occur: Occur,
    pub query: Query,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Term { field: String, term: String },
    /// Terms with their positions relative to the first term.
    Phrase { field: String, terms: Vec<(String, u32)>, slop: u32 },
    Boolean(Vec<Clause>),
}

impl Query {
    /// Render the query the way it was understood, omitting `default_field` prefixes.
    pub fn display<'a>(&'a self, default_field: &'a str) -> QueryDisplay<'a> {
        QueryDisplay { query: self, default_field, nested: false }
    }
}

pub struct QueryDisplay<'a> {
    query: &'a Query,
    default_field: &'a str,
    nested: bool,
}

impl fmt::Display for QueryDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field_prefix = |f: &mut fmt::Formatter<'_>, field: &str| {
            if field != self.default_field { write!(f, "{field}:") } else { Ok(()) }
        };
        match self.query {
            Query::Term { field, term } => {
                field_prefix(f, field)?;
                write!(f, "{term}")
            }
            Query::Phrase { field, terms, slop } => {
                field_prefix(f, field)?;
                f.write_str("\"")?;
                let mut next = 0;
                for (i, (term, pos)) in terms.iter().enumerate() {
                    if i > 0 { f.write_str(" ")?; }
                    // Gaps left by dropped stop words.
                    while next < *pos {
                        f.write_str("? ")?;
                        next += 1;
                    }
                    f.write_str(term)?;
                    next = pos + 1;
                }
                f.write_str("\"")?;
                if *slop > 0 { write!(f, "~{slop}")?; }
                Ok(())
            }
            Query::Boolean(clauses) => {
                if self.nested { f.write_str("(")?; }
                for (i, clause) in clauses.iter().enumerate() {
                    if i > 0 { f.write_str(" ")?; }
                    match clause.occur {
                        Occur::Must => f.write_str("+")?,
                        Occur::MustNot => f.write_str("-")?,
                        Occur::Should => {}
                    }
                    let inner = QueryDisplay { query: &clause.query, default_field: self.default_field, nested: true };
                    write!(f, "{inner}")?;
                }
                if self.nested { f.write_str(")")?; }
                Ok(())
            }
        }
    }
}

/// Operator implied between clauses that have no explicit `AND`/`OR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operator {
    #[default]
    Or,
    And,
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Word(String),
    Quoted(String),
    LParen,
    RParen,
    Plus,
    Minus,
    Not,
    And,
    Or,
    Colon,
    Slop(Option<u32>),
}

fn malformed(line: &str, message: impl Into<String>, column: usize) -> QuarryError {
    QuarryError::MalformedQuery { query: line.to_string(), message: message.into(), column }
}

fn lex(line: &str) -> Result<Vec<(Tok, usize)>> {
    let chars: Vec<char> = line.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let start = i;
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let tok = match c {
            '(' => { i += 1; Tok::LParen }
            ')' => { i += 1; Tok::RParen }
            ':' => { i += 1; Tok::Colon }
            '+' => { i += 1; Tok::Plus }
            '-' => { i += 1; Tok::Minus }
            '&' if chars.get(i + 1) == Some(&'&') => { i += 2; Tok::And }
            '|' if chars.get(i + 1) == Some(&'|') => { i += 2; Tok::Or }
            '"' => {
                i += 1;
                let mut text = String::new();
                let mut closed = false;
                while i < chars.len() {
                    match chars[i] {
                        '\\' if i + 1 < chars.len() => { text.push(chars[i + 1]); i += 2; }
                        '"' => { closed = true; i += 1; break; }
                        ch => { text.push(ch); i += 1; }
                    }
                }
                if !closed {
                    return Err(malformed(line, "unterminated phrase", start));
                }
                Tok::Quoted(text)
            }
            '~' => {
                i += 1;
                let digits_start = i;
                while i < chars.len() && chars[i].is_ascii_digit() { i += 1; }
                if i == digits_start {
                    Tok::Slop(None)
                } else {
                    let digits: String = chars[digits_start..i].iter().collect();
                    let slop = digits.parse().map_err(|_| malformed(line, "slop out of range", start))?;
                    Tok::Slop(Some(slop))
                }
            }
            _ => {
                let mut word = String::new();
                while i < chars.len() {
                    let ch = chars[i];
                    if ch.is_whitespace() || matches!(ch, '(' | ')' | ':' | '"' | '~') { break; }
                    if ch == '\\' && i + 1 < chars.len() {
                        word.push(chars[i + 1]);
                        i += 2;
                        continue;
                    }
                    word.push(ch);
                    i += 1;
                }
                match word.as_str() {
                    "AND" => Tok::And,
                    "OR" => Tok::Or,
                    "NOT" => Tok::Not,
                    _ => Tok::Word(word),
                }
            }
        };
        toks.push((tok, start));
    }
    Ok(toks)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    None,
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conj {
    None,
    And,
    Or,
}

/// Parses one query line at a time. Holds no state between lines.
#[derive(Debug, Clone)]
pub struct QueryParser {
    analyzer: Analyzer,
    default_field: String,
    default_operator: Operator,
}

impl QueryParser {
    pub fn new(default_field: impl Into<String>, analyzer: Analyzer) -> Self {
        Self { analyzer, default_field: default_field.into(), default_operator: Operator::Or }
    }

    pub fn with_default_operator(mut self, op: Operator) -> Self {
        self.default_operator = op;
        self
    }

    pub fn parse(&self, line: &str) -> Result<Query> {
        let toks = lex(line)?;
        if toks.is_empty() {
            return Err(malformed(line, "empty query", 0));
        }
        let mut state = ParseState { toks, pos: 0, line, parser: self };
        let clauses = state.clauses(&self.default_field)?;
        if let Some((_, col)) = state.peek() {
            return Err(malformed(line, "unbalanced ')'", col));
        }
        Ok(collapse(clauses))
    }
}

/// Parse with the default analyzer and OR semantics.
pub fn parse(line: &str, default_field: &str) -> Result<Query> {
    QueryParser::new(default_field, Analyzer::default()).parse(line)
}

/// A lone optional clause stands for itself.
fn collapse(mut clauses: Vec<Clause>) -> Query {
    if clauses.len() == 1 && clauses[0].occur == Occur::Should {
        return clauses.remove(0).query;
    }
    Query::Boolean(clauses)
}

struct ParseState<'a> {
    toks: Vec<(Tok, usize)>,
    pos: usize,
    line: &'a str,
    parser: &'a QueryParser,
}

impl ParseState<'_> {
    fn peek(&self) -> Option<(&Tok, usize)> {
        self.toks.get(self.pos).map(|(t, c)| (t, *c))
    }

    fn end_column(&self) -> usize { self.line.chars().count() }

    fn err(&self, message: &str, column: usize) -> QuarryError { malformed(self.line, message, column) }

    fn clauses(&mut self, field: &str) -> Result<Vec<Clause>> {
        let mut clauses: Vec<Clause> = Vec::new();
        let mut seen = 0usize;
        loop {
            match self.peek() {
                None | Some((Tok::RParen, _)) => break,
                _ => {}
            }
            let mut conj = Conj::None;
            if let Some((tok @ (Tok::And | Tok::Or), col)) = self.peek() {
                if seen == 0 {
                    return Err(self.err("query cannot start with an operator", col));
                }
                conj = if *tok == Tok::And { Conj::And } else { Conj::Or };
                self.pos += 1;
            }
            let modifier = match self.peek() {
                Some((Tok::Plus, _)) => { self.pos += 1; Modifier::Plus }
                Some((Tok::Minus | Tok::Not, _)) => { self.pos += 1; Modifier::Minus }
                _ => Modifier::None,
            };
            let query = self.primary(field, true)?;
            seen += 1;
            self.add_clause(&mut clauses, conj, modifier, query);
        }
        Ok(clauses)
    }

    fn add_clause(&self, clauses: &mut Vec<Clause>, conj: Conj, modifier: Modifier, query: Option<Query>) {
        let default_and = self.parser.default_operator == Operator::And;
        if let Some(last) = clauses.last_mut() {
            if conj == Conj::And && last.occur != Occur::MustNot {
                last.occur = Occur::Must;
            }
            if default_and && conj == Conj::Or && last.occur != Occur::MustNot {
                last.occur = Occur::Should;
            }
        }
        let Some(query) = query else { return };
        let prohibited = modifier == Modifier::Minus;
        let required = if default_and {
            !prohibited && conj != Conj::Or
        } else {
            modifier == Modifier::Plus || (conj == Conj::And && !prohibited)
        };
        let occur = if prohibited {
            Occur::MustNot
        } else if required {
            Occur::Must
        } else {
            Occur::Should
        };
        clauses.push(Clause { occur, query });
    }

    /// `None` when the clause analyzed away to nothing.
    fn primary(&mut self, field: &str, allow_field: bool) -> Result<Option<Query>> {
        let Some((tok, col)) = self.peek() else {
            return Err(self.err("expected a term after operator", self.end_column()));
        };
        let tok = tok.clone();
        self.pos += 1;
        match tok {
            Tok::LParen => {
                if let Some((Tok::RParen, c)) = self.peek() {
                    return Err(self.err("empty group", c));
                }
                let inner = self.clauses(field)?;
                match self.peek() {
                    Some((Tok::RParen, _)) => self.pos += 1,
                    _ => return Err(self.err("unbalanced '(': missing ')'", col)),
                }
                Ok(if inner.is_empty() { None } else { Some(collapse(inner)) })
            }
            Tok::Quoted(text) => {
                let slop = match self.peek() {
                    Some((Tok::Slop(Some(n)), _)) => { let n = *n; self.pos += 1; n }
                    Some((Tok::Slop(None), c)) => return Err(self.err("phrase slop needs a number", c)),
                    _ => 0,
                };
                Ok(self.analyzed(field, &text, slop))
            }
            Tok::Word(word) => {
                if let Some((Tok::Colon, c)) = self.peek() {
                    if !allow_field {
                        return Err(self.err("nested field qualifier", c));
                    }
                    self.pos += 1;
                    return self.primary(&word, false);
                }
                if let Some((Tok::Slop(_), c)) = self.peek() {
                    return Err(self.err("fuzzy term queries are not supported", c));
                }
                Ok(self.analyzed(field, &word, 0))
            }
            Tok::RParen => Err(self.err("unbalanced ')'", col)),
            Tok::And | Tok::Or => Err(self.err("operator without a left-hand term", col)),
            Tok::Plus | Tok::Minus | Tok::Not => Err(self.err("repeated modifier", col)),
            Tok::Colon => Err(self.err("field qualifier without a field name", col)),
            Tok::Slop(_) => Err(self.err("slop without a phrase", col)),
        }
    }

    fn analyzed(&self, field: &str, text: &str, slop: u32) -> Option<Query> {
        let stream = self.parser.analyzer.analyze(text);
        let toks: Vec<(String, u32)> = stream.iter().map(|t| (t.term.into_owned(), t.position)).collect();
        match toks.len() {
            0 => None,
            1 => Some(Query::Term { field: field.to_string(), term: toks[0].0.clone() }),
            _ => {
                let base = toks[0].1;
                let terms = toks.into_iter().map(|(t, p)| (t, p - base)).collect();
                Some(Query::Phrase { field: field.to_string(), terms, slop })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::AnalyzerConfig;

    fn term(t: &str) -> Query {
        Query::Term { field: "contents".into(), term: t.into() }
    }

    fn rendered(line: &str) -> String {
        parse(line, "contents").unwrap().display("contents").to_string()
    }

    fn assert_malformed(line: &str) {
        match parse(line, "contents") {
            Err(QuarryError::MalformedQuery { .. }) => {}
            other => panic!("expected MalformedQuery for {line:?}, got {other:?}"),
        }
    }

    #[test]
    fn bare_terms_are_optional_clauses() {
        let q = parse("Cat DOG", "contents").unwrap();
        assert_eq!(
            q,
            Query::Boolean(vec![
                Clause { occur: Occur::Should, query: term("cat") },
                Clause { occur: Occur::Should, query: term("dog") },
            ])
        );
        assert_eq!(q.display("contents").to_string(), "cat dog");
    }

    #[test]
    fn single_term_collapses() {
        assert_eq!(parse("cat", "contents").unwrap(), term("cat"));
    }

    #[test]
    fn modifiers_and_conjunctions() {
        assert_eq!(rendered("+cat -dog bird"), "+cat -dog bird");
        assert_eq!(rendered("cat AND dog"), "+cat +dog");
        assert_eq!(rendered("cat && dog || bird"), "+cat +dog bird");
        assert_eq!(rendered("cat NOT dog"), "cat -dog");
        assert_eq!(rendered("cat AND NOT dog"), "+cat -dog");
    }

    #[test]
    fn default_and_operator() {
        let parser = QueryParser::new("contents", Analyzer::default()).with_default_operator(Operator::And);
        let q = parser.parse("cat dog OR bird").unwrap();
        assert_eq!(q.display("contents").to_string(), "+cat dog bird");
    }

    #[test]
    fn groups_and_fields() {
        assert_eq!(rendered("(cat OR dog) +bird"), "(cat dog) +bird");
        assert_eq!(rendered("path:cat dog"), "path:cat dog");
        assert_eq!(rendered("path:(cat dog)"), "path:cat path:dog");
        assert_eq!(rendered("bird path:(cat dog)"), "bird (path:cat path:dog)");
    }

    #[test]
    fn phrases_and_slop() {
        assert_eq!(rendered("\"black cat\"~2"), "\"black cat\"~2");
        assert_eq!(rendered("e-mail"), "\"e mail\"");
        let q = parse("\"black cat\"", "contents").unwrap();
        assert_eq!(
            q,
            Query::Phrase { field: "contents".into(), terms: vec![("black".into(), 0), ("cat".into(), 1)], slop: 0 }
        );
    }

    #[test]
    fn stopword_gaps_are_marked() {
        let analyzer = Analyzer::new(AnalyzerConfig { stopwords: true, stem: false });
        let q = QueryParser::new("contents", analyzer).parse("\"cat in the hat\"").unwrap();
        assert_eq!(q.display("contents").to_string(), "\"cat ? ? hat\"");
    }

    #[test]
    fn words_that_analyze_away_are_dropped() {
        assert_eq!(parse("cat ...", "contents").unwrap(), term("cat"));
        assert_eq!(parse("...", "contents").unwrap(), Query::Boolean(vec![]));
    }

    #[test]
    fn malformed_lines() {
        assert_malformed("(cat dog");
        assert_malformed("cat dog)");
        assert_malformed("\"black cat");
        assert_malformed("cat AND");
        assert_malformed("AND cat");
        assert_malformed("cat +");
        assert_malformed("()");
        assert_malformed("cat~");
        assert_malformed("\"cat dog\"~");
        assert_malformed("   ");
    }

    #[test]
    fn error_reports_column() {
        match parse("cat (dog", "contents") {
            Err(QuarryError::MalformedQuery { column, .. }) => assert_eq!(column, 4),
            other => panic!("unexpected {other:?}"),
        }
    }
}

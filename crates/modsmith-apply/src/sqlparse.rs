//! Minimal lexer and parser for literal `INSERT`/`REPLACE` statements.
//!
//! Only the shape the compiler and hand-written mod scripts produce is
//! understood: a verb, a table, an optional column list, and one or more
//! tuples of literals. Anything else parses to `None` and is executed as
//! opaque text.

use std::iter::Peekable;
use std::str::Chars;

use modsmith_core::{SqlValue, StatementRecord, normalize_value, render_value};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Word(String),
    Quoted { quote: char, text: String },
    Number(String),
    LParen,
    RParen,
    Comma,
    Semicolon,
    Dot,
    Minus,
    Plus,
    Other(char),
    Eof,
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    current_char: Option<char>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut chars = input.chars().peekable();
        let current_char = chars.next();
        Self {
            chars,
            current_char,
        }
    }

    fn advance(&mut self) {
        self.current_char = self.chars.next();
    }

    fn peek(&mut self) -> Option<&char> {
        self.chars.peek()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.current_char {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.current_char {
            self.advance();
            if c == '\n' {
                break;
            }
        }
    }

    fn skip_block_comment(&mut self) {
        // current_char is the '*' after '/'
        self.advance();
        while let Some(c) = self.current_char {
            if c == '*' && self.peek() == Some(&'/') {
                self.advance();
                self.advance();
                break;
            }
            self.advance();
        }
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.current_char {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                word.push(c);
                self.advance();
            } else {
                break;
            }
        }
        word
    }

    /// Quoted text with doubled-quote escapes. `[` closes on `]`.
    fn read_quoted(&mut self, open: char) -> String {
        let close = if open == '[' { ']' } else { open };
        self.advance();
        let mut text = String::new();
        while let Some(c) = self.current_char {
            if c == close {
                if close != ']' && self.peek() == Some(&close) {
                    text.push(c);
                    self.advance();
                    self.advance();
                } else {
                    self.advance();
                    break;
                }
            } else {
                text.push(c);
                self.advance();
            }
        }
        text
    }

    fn read_number(&mut self) -> String {
        let mut num = String::new();
        while let Some(c) = self.current_char {
            let exponent_sign = (c == '-' || c == '+')
                && num.ends_with(['e', 'E'])
                && !num.starts_with("0x");
            if c.is_ascii_alphanumeric() || c == '.' || exponent_sign {
                num.push(c);
                self.advance();
            } else {
                break;
            }
        }
        num
    }

    pub fn next_token(&mut self) -> Token {
        loop {
            self.skip_whitespace();
            let Some(c) = self.current_char else {
                return Token::Eof;
            };
            match c {
                '-' if self.peek() == Some(&'-') => {
                    self.skip_line_comment();
                    continue;
                }
                '/' if self.peek() == Some(&'*') => {
                    self.advance();
                    self.skip_block_comment();
                    continue;
                }
                '\'' | '"' | '`' | '[' => {
                    let text = self.read_quoted(c);
                    return Token::Quoted { quote: c, text };
                }
                '(' => {
                    self.advance();
                    return Token::LParen;
                }
                ')' => {
                    self.advance();
                    return Token::RParen;
                }
                ',' => {
                    self.advance();
                    return Token::Comma;
                }
                ';' => {
                    self.advance();
                    return Token::Semicolon;
                }
                '.' if !self.peek().is_some_and(|next| next.is_ascii_digit()) => {
                    self.advance();
                    return Token::Dot;
                }
                '-' => {
                    self.advance();
                    return Token::Minus;
                }
                '+' => {
                    self.advance();
                    return Token::Plus;
                }
                c if c.is_ascii_digit() || c == '.' => return Token::Number(self.read_number()),
                c if c.is_alphabetic() || c == '_' => return Token::Word(self.read_word()),
                other => {
                    self.advance();
                    return Token::Other(other);
                }
            }
        }
    }

    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            if token == Token::Eof {
                tokens.push(token);
                break;
            }
            tokens.push(token);
        }
        tokens
    }
}

/// Conflict verb of an insert-family statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Insert,
    Replace,
    InsertOrIgnore,
    InsertOr(String),
}

impl Verb {
    pub fn as_sql(&self) -> String {
        match self {
            Verb::Insert => "INSERT".to_string(),
            Verb::Replace => "REPLACE".to_string(),
            Verb::InsertOrIgnore => "INSERT OR IGNORE".to_string(),
            Verb::InsertOr(action) => format!("INSERT OR {action}"),
        }
    }
}

/// A literal as written plus its normalised value.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub raw: String,
    pub value: SqlValue,
}

impl Literal {
    pub fn integer(value: i64) -> Self {
        Self {
            raw: value.to_string(),
            value: SqlValue::Integer(value),
        }
    }

    fn from_value(value: &SqlValue) -> Self {
        Self {
            raw: render_value(value),
            value: normalize_value(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedInsert {
    pub verb: Verb,
    /// Table name used for lookups.
    pub table: String,
    /// Table reference as it appears in the statement.
    pub table_raw: String,
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Vec<Literal>>,
}

impl ParsedInsert {
    /// Insert-family records convert directly; other kinds yield `None`.
    pub fn from_record(record: &StatementRecord) -> Option<Self> {
        let verb = match record {
            StatementRecord::Insert { .. } => Verb::Insert,
            StatementRecord::Replace { .. } => Verb::Replace,
            StatementRecord::InsertIgnore { .. } => Verb::InsertOrIgnore,
            _ => return None,
        };
        let pairs = record.pairs()?;
        let table = record.table()?.to_string();
        Some(Self {
            verb,
            table_raw: table.clone(),
            table,
            columns: Some(pairs.iter().map(|(column, _)| column.to_string()).collect()),
            rows: vec![pairs.iter().map(|(_, value)| Literal::from_value(value)).collect()],
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// The statement restricted to row `index`.
    pub fn single_row(&self, index: usize) -> Option<Self> {
        let row = self.rows.get(index)?.clone();
        Some(Self {
            rows: vec![row],
            ..self.clone()
        })
    }

    pub fn with_verb(&self, verb: Verb) -> Self {
        Self {
            verb,
            ..self.clone()
        }
    }

    /// Named values of row `index`; `None` without a column list.
    pub fn pairs(&self, index: usize) -> Option<Vec<(String, SqlValue)>> {
        let columns = self.columns.as_ref()?;
        let row = self.rows.get(index)?;
        if columns.len() != row.len() {
            return None;
        }
        Some(
            columns
                .iter()
                .cloned()
                .zip(row.iter().map(|literal| literal.value.clone()))
                .collect(),
        )
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns
            .as_ref()
            .is_some_and(|columns| columns.iter().any(|name| name.eq_ignore_ascii_case(column)))
    }

    pub fn to_sql(&self) -> String {
        let mut sql = format!("{} INTO {}", self.verb.as_sql(), self.table_raw);
        if let Some(columns) = &self.columns {
            sql.push_str(&format!(" ({})", columns.join(", ")));
        }
        let tuples = self
            .rows
            .iter()
            .map(|row| {
                let raws: Vec<&str> = row.iter().map(|literal| literal.raw.as_str()).collect();
                format!("({})", raws.join(", "))
            })
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(" VALUES ");
        sql.push_str(&tuples);
        sql.push(';');
        sql
    }
}

/// Parse `sql` when it is a literal insert; `None` for anything else.
pub fn parse_insert(sql: &str) -> Option<ParsedInsert> {
    let tokens = Lexer::new(sql).tokenize();
    Parser { tokens, pos: 0 }.parse()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn keyword(&self) -> Option<String> {
        match self.current() {
            Token::Word(word) => Some(word.to_ascii_uppercase()),
            _ => None,
        }
    }

    fn expect_keyword(&mut self, expected: &str) -> Option<()> {
        if self.keyword().as_deref() == Some(expected) {
            self.advance();
            Some(())
        } else {
            None
        }
    }

    fn expect(&mut self, expected: &Token) -> Option<()> {
        if self.current() == expected {
            self.advance();
            Some(())
        } else {
            None
        }
    }

    fn parse(&mut self) -> Option<ParsedInsert> {
        let verb = self.parse_verb()?;
        self.expect_keyword("INTO")?;
        let (table, table_raw) = self.parse_table()?;

        let columns = if self.current() == &Token::LParen {
            self.advance();
            let mut columns = Vec::new();
            loop {
                columns.push(self.parse_identifier()?.0);
                match self.current() {
                    Token::Comma => self.advance(),
                    Token::RParen => {
                        self.advance();
                        break;
                    }
                    _ => return None,
                }
            }
            Some(columns)
        } else {
            None
        };

        self.expect_keyword("VALUES")?;
        let mut rows = Vec::new();
        loop {
            self.expect(&Token::LParen)?;
            let mut row = Vec::new();
            loop {
                row.push(self.parse_literal()?);
                match self.current() {
                    Token::Comma => self.advance(),
                    Token::RParen => {
                        self.advance();
                        break;
                    }
                    _ => return None,
                }
            }
            rows.push(row);
            if self.current() == &Token::Comma {
                self.advance();
            } else {
                break;
            }
        }

        while self.current() == &Token::Semicolon {
            self.advance();
        }
        if self.current() != &Token::Eof {
            return None;
        }
        if let Some(columns) = &columns {
            if rows.iter().any(|row| row.len() != columns.len()) {
                return None;
            }
        }

        Some(ParsedInsert {
            verb,
            table,
            table_raw,
            columns,
            rows,
        })
    }

    fn parse_verb(&mut self) -> Option<Verb> {
        match self.keyword()?.as_str() {
            "REPLACE" => {
                self.advance();
                Some(Verb::Replace)
            }
            "INSERT" => {
                self.advance();
                if self.keyword().as_deref() != Some("OR") {
                    return Some(Verb::Insert);
                }
                self.advance();
                let action = self.keyword()?;
                self.advance();
                Some(match action.as_str() {
                    "REPLACE" => Verb::Replace,
                    "IGNORE" => Verb::InsertOrIgnore,
                    _ => Verb::InsertOr(action),
                })
            }
            _ => None,
        }
    }

    fn parse_identifier(&mut self) -> Option<(String, String)> {
        let parsed = match self.current() {
            Token::Word(word) => (word.clone(), word.clone()),
            Token::Quoted { quote, text } if *quote != '\'' => {
                let raw = match quote {
                    '[' => format!("[{text}]"),
                    q => format!("{q}{}{q}", text.replace(*q, &format!("{q}{q}"))),
                };
                (text.clone(), raw)
            }
            _ => return None,
        };
        self.advance();
        Some(parsed)
    }

    fn parse_table(&mut self) -> Option<(String, String)> {
        let (mut name, mut raw) = self.parse_identifier()?;
        if self.current() == &Token::Dot {
            self.advance();
            let (table, table_raw) = self.parse_identifier()?;
            raw = format!("{raw}.{table_raw}");
            name = table;
        }
        Some((name, raw))
    }

    fn parse_literal(&mut self) -> Option<Literal> {
        let negative = match self.current() {
            Token::Minus => {
                self.advance();
                true
            }
            Token::Plus => {
                self.advance();
                false
            }
            _ => false,
        };
        let literal = match self.current().clone() {
            Token::Number(number) => {
                let raw = if negative { format!("-{number}") } else { number };
                let value = parse_number(&raw)?;
                Literal { raw, value }
            }
            _ if negative => return None,
            Token::Quoted { quote, text } if quote == '\'' || quote == '"' => Literal {
                raw: format!("{quote}{}{quote}", text.replace(quote, &format!("{quote}{quote}"))),
                value: SqlValue::Text(text),
            },
            Token::Word(word) => {
                let value = match word.to_ascii_uppercase().as_str() {
                    "NULL" => SqlValue::Null,
                    "TRUE" => SqlValue::Integer(1),
                    "FALSE" => SqlValue::Integer(0),
                    _ => return None,
                };
                Literal { raw: word, value }
            }
            _ => return None,
        };
        self.advance();
        Some(literal)
    }
}

fn parse_number(raw: &str) -> Option<SqlValue> {
    if let Ok(value) = raw.parse::<i64>() {
        return Some(SqlValue::Integer(value));
    }
    raw.parse::<f64>().ok().map(SqlValue::Real)
}

#[cfg(test)]
mod tests {
    use modsmith_core::StatementKind;

    use super::*;

    #[test]
    fn parses_multi_row_insert() {
        let parsed = parse_insert(
            "INSERT INTO Units (UnitType, Cost, Name) VALUES ('UNIT_A', 10, \"It''s\"), ('UNIT_B', -2.5, NULL);",
        )
        .unwrap();
        assert_eq!(parsed.verb, Verb::Insert);
        assert_eq!(parsed.table, "Units");
        assert_eq!(parsed.row_count(), 2);
        assert_eq!(
            parsed.pairs(0).unwrap(),
            vec![
                ("UnitType".to_string(), SqlValue::text("UNIT_A")),
                ("Cost".to_string(), SqlValue::Integer(10)),
                ("Name".to_string(), SqlValue::text("It''s")),
            ]
        );
        assert_eq!(parsed.rows[1][1].value, SqlValue::Real(-2.5));
        assert_eq!(parsed.rows[1][2].value, SqlValue::Null);
    }

    #[test]
    fn single_row_rendering_keeps_raw_literals() {
        let parsed = parse_insert(
            "-- leading comment\ninsert or ignore into [Types] (Type, Kind) values ('A', 'KIND_X'), ('B', 'KIND_Y')",
        )
        .unwrap();
        assert_eq!(parsed.verb, Verb::InsertOrIgnore);
        assert_eq!(
            parsed.single_row(1).unwrap().to_sql(),
            "INSERT OR IGNORE INTO [Types] (Type, Kind) VALUES ('B', 'KIND_Y');"
        );
    }

    #[test]
    fn insert_or_replace_is_replace() {
        let parsed = parse_insert("INSERT OR REPLACE INTO main.Types VALUES ('A', 'K');").unwrap();
        assert_eq!(parsed.verb, Verb::Replace);
        assert_eq!(parsed.table, "Types");
        assert_eq!(parsed.table_raw, "main.Types");
        assert!(parsed.columns.is_none());
        assert!(parsed.pairs(0).is_none());
    }

    #[test]
    fn non_literal_statements_are_opaque() {
        assert!(parse_insert("INSERT INTO T (a) SELECT a FROM U;").is_none());
        assert!(parse_insert("INSERT INTO T (a) VALUES (lower('X'));").is_none());
        assert!(parse_insert("UPDATE T SET a = 1;").is_none());
        assert!(parse_insert("INSERT INTO T (a, b) VALUES (1);").is_none());
        assert!(parse_insert("INSERT INTO T (a) VALUES (1) ON CONFLICT DO NOTHING;").is_none());
    }

    #[test]
    fn records_convert_with_rendered_literals() {
        let record = StatementRecord::from_pairs(
            StatementKind::Insert,
            "Modifiers",
            vec![
                ("ModifierId".to_string(), SqlValue::text("MOD_X")),
                ("Permanent".to_string(), SqlValue::text("true")),
            ],
        )
        .unwrap();
        let parsed = ParsedInsert::from_record(&record).unwrap();
        assert_eq!(
            parsed.with_verb(Verb::Replace).to_sql(),
            "REPLACE INTO Modifiers (ModifierId, Permanent) VALUES (\"MOD_X\", 1);"
        );
        assert_eq!(parsed.rows[0][1].value, SqlValue::Integer(1));
    }
}

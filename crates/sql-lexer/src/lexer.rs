use std::iter::Peekable;
use std::str::Chars;

use crate::error::LexError;
use crate::keyword::Keyword;
use crate::token::{Position, SpannedToken, Token};

/// Tokenizes a SQL string per §4.3's lexical grammar.
pub struct Lexer<'a> {
    iter: Peekable<Chars<'a>>,
    position: Position,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { iter: input.chars().peekable(), position: Position { line: 1, column: 1 } }
    }

    /// Tokenizes the whole input, stopping at EOF. Whitespace is consumed
    /// but never emitted as a token (the grammar only cares about
    /// token boundaries, not layout).
    pub fn tokenize(mut self) -> Result<Vec<SpannedToken>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let start = self.position;
            match self.next_token(start)? {
                Some(token) => {
                    let is_eof = matches!(token, Token::Eof);
                    tokens.push(SpannedToken { token, position: start });
                    if is_eof {
                        break;
                    }
                }
                None => {
                    tokens.push(SpannedToken { token: Token::Eof, position: start });
                    break;
                }
            }
        }
        Ok(tokens)
    }

    fn skip_whitespace(&mut self) {
        while let Some(&ch) = self.iter.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.iter.next()?;
        self.position.advance(ch);
        Some(ch)
    }

    fn next_token(&mut self, start: Position) -> Result<Option<Token>, LexError> {
        let Some(&ch) = self.iter.peek() else {
            return Ok(Some(Token::Eof));
        };
        match ch {
            '`' => self.tokenize_quoted_ident(start),
            '\'' | '"' => self.tokenize_string(start),
            c if is_ident_start(c) => Ok(Some(self.tokenize_ident_or_keyword())),
            c if c.is_ascii_digit() => Ok(Some(self.tokenize_number())),
            '.' => {
                self.advance();
                if self.iter.peek().is_some_and(|c| c.is_ascii_digit()) {
                    Ok(Some(self.tokenize_number_tail(String::from("."))))
                } else {
                    Ok(Some(Token::Period))
                }
            }
            '(' => self.single(Token::LeftParen),
            ')' => self.single(Token::RightParen),
            ',' => self.single(Token::Comma),
            ';' => self.single(Token::SemiColon),
            '*' => self.single(Token::Star),
            '?' => self.single(Token::Placeholder),
            '+' => self.single(Token::Plus),
            '%' => self.single(Token::Percent),
            '-' => {
                self.advance();
                if self.eat_if('>') {
                    if self.eat_if('>') {
                        Ok(Some(Token::ArrowArrow))
                    } else {
                        Ok(Some(Token::Arrow))
                    }
                } else {
                    Ok(Some(Token::Minus))
                }
            }
            '/' => self.single(Token::Slash),
            '=' => self.single(Token::Eq),
            '!' => {
                self.advance();
                if self.eat_if('=') {
                    Ok(Some(Token::NotEq))
                } else {
                    Err(LexError::at(start, format!("unexpected character '{ch}'")))
                }
            }
            '<' => {
                self.advance();
                if self.eat_if('>') {
                    Ok(Some(Token::NotEq))
                } else if self.eat_if('=') {
                    Ok(Some(Token::Le))
                } else {
                    Ok(Some(Token::Lt))
                }
            }
            '>' => {
                self.advance();
                if self.eat_if('=') {
                    Ok(Some(Token::Ge))
                } else {
                    Ok(Some(Token::Gt))
                }
            }
            '@' => {
                self.advance();
                if self.eat_if('>') {
                    Ok(Some(Token::AtArrow))
                } else {
                    Err(LexError::at(start, "unexpected character '@'"))
                }
            }
            other => Err(LexError::at(start, format!("unexpected character '{other}'"))),
        }
    }

    fn single(&mut self, token: Token) -> Result<Option<Token>, LexError> {
        self.advance();
        Ok(Some(token))
    }

    fn eat_if(&mut self, ch: char) -> bool {
        if self.iter.peek() == Some(&ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn tokenize_ident_or_keyword(&mut self) -> Token {
        let mut s = String::new();
        while let Some(&ch) = self.iter.peek() {
            if is_ident_part(ch) {
                s.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        match Keyword::lookup(&s) {
            Some(kw) => Token::Keyword(kw),
            None => Token::Ident { name: s, quoted: false },
        }
    }

    fn tokenize_quoted_ident(&mut self, start: Position) -> Result<Option<Token>, LexError> {
        self.advance(); // opening backtick
        let mut s = String::new();
        loop {
            match self.advance() {
                Some('`') => break,
                Some(ch) => s.push(ch),
                None => return Err(LexError::at(start, "unterminated backtick-quoted identifier")),
            }
        }
        Ok(Some(Token::Ident { name: s, quoted: true }))
    }

    fn tokenize_string(&mut self, start: Position) -> Result<Option<Token>, LexError> {
        let quote = self.advance().expect("peeked");
        let mut s = String::new();
        loop {
            match self.advance() {
                Some('\\') => {
                    // Backslash escapes are consumed but preserved verbatim
                    // in the literal (§4.3).
                    s.push('\\');
                    if let Some(next) = self.advance() {
                        s.push(next);
                    }
                }
                Some(ch) if ch == quote => break,
                Some(ch) => s.push(ch),
                None => return Err(LexError::at(start, "unterminated string literal")),
            }
        }
        Ok(Some(Token::Str(s)))
    }

    fn tokenize_number(&mut self) -> Token {
        self.tokenize_number_tail(String::new())
    }

    fn tokenize_number_tail(&mut self, mut s: String) -> Token {
        while let Some(&ch) = self.iter.peek() {
            if ch.is_ascii_digit() {
                s.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        if self.iter.peek() == Some(&'.') && !s.contains('.') {
            s.push('.');
            self.advance();
            while let Some(&ch) = self.iter.peek() {
                if ch.is_ascii_digit() {
                    s.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }
        }
        if matches!(self.iter.peek(), Some('e') | Some('E')) {
            let mut lookahead = self.iter.clone();
            lookahead.next();
            let has_sign = matches!(lookahead.peek(), Some('+') | Some('-'));
            if has_sign {
                lookahead.next();
            }
            if lookahead.peek().is_some_and(|c| c.is_ascii_digit()) {
                s.push(self.advance().unwrap()); // e/E
                if matches!(self.iter.peek(), Some('+') | Some('-')) {
                    s.push(self.advance().unwrap());
                }
                while let Some(&ch) = self.iter.peek() {
                    if ch.is_ascii_digit() {
                        s.push(ch);
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
        }
        Token::Number(s)
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_part(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(input: &str) -> Vec<Token> {
        Lexer::new(input).tokenize().unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn tokenizes_simple_select() {
        let t = toks("SELECT * FROM customer WHERE id = 1");
        assert_eq!(
            t,
            vec![
                Token::Keyword(Keyword::Select),
                Token::Star,
                Token::Keyword(Keyword::From),
                Token::ident("customer"),
                Token::Keyword(Keyword::Where),
                Token::ident("id"),
                Token::Eq,
                Token::Number("1".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let t = toks("select");
        assert_eq!(t, vec![Token::Keyword(Keyword::Select), Token::Eof]);
    }

    #[test]
    fn backtick_identifier_accepts_any_characters() {
        let t = toks("`weird col!`");
        assert_eq!(t, vec![Token::Ident { name: "weird col!".into(), quoted: true }, Token::Eof]);
    }

    #[test]
    fn numeric_literal_with_fraction_and_exponent() {
        let t = toks("1.5e-3");
        assert_eq!(t, vec![Token::Number("1.5e-3".into()), Token::Eof]);
    }

    #[test]
    fn string_literal_preserves_backslash_escapes_verbatim() {
        let t = toks(r"'a\nb'");
        assert_eq!(t, vec![Token::Str("a\\nb".into()), Token::Eof]);
    }

    #[test]
    fn json_operators() {
        let t = toks("a -> b ->> c");
        assert_eq!(
            t,
            vec![
                Token::ident("a"),
                Token::Arrow,
                Token::ident("b"),
                Token::ArrowArrow,
                Token::ident("c"),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_string_is_a_position_tagged_error() {
        let err = Lexer::new("select 'foo").tokenize().unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn illegal_character_fails_tokenization() {
        let err = Lexer::new("select # 1").tokenize().unwrap_err();
        assert!(err.message.contains('#'));
    }
}

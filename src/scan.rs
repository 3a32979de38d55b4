/// Hand-rolled scanner.
///
/// Numbers honor the configured input base and produce finished `Value`
/// literals: machine ints, big ints, rationals written `p/q`, floats with a
/// point or exponent, and `j`-joined complex forms. Quoted text becomes a
/// string token; the parser turns it into a char or char vector.
use crate::conf::Config;
use crate::core::value::{self, Value};
use crate::errors::{EvalError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(Value),
    Str(String),
    Ident(String),
    Op(String),
    Dot,
    Assign,
    Colon,
    Semicolon,
    Newline,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Eof,
}

pub struct Scanner<'a> {
    conf: &'a Config,
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(conf: &'a Config, src: &str) -> Self {
        Scanner {
            conf,
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn is_digit_start(&self, c: char) -> bool {
        c.is_ascii_digit()
    }

    fn is_number_char(&self, c: char) -> bool {
        match self.conf.input_base() {
            16 => c.is_ascii_hexdigit(),
            8 => ('0'..='7').contains(&c),
            2 => c == '0' || c == '1',
            _ => c.is_ascii_digit(),
        }
    }

    /// Tokens paired with the 1-based source line each one starts on.
    pub fn tokenize(&mut self) -> Result<Vec<(Token, usize)>> {
        let mut out = Vec::new();
        loop {
            let line = self.line;
            let tok = self.next_token()?;
            let done = tok == Token::Eof;
            out.push((tok, line));
            if done {
                return Ok(out);
            }
        }
    }

    /// The line the scanner has reached; the last-set position for errors.
    pub fn line(&self) -> usize {
        self.line
    }

    fn next_token(&mut self) -> Result<Token> {
        loop {
            match self.peek() {
                None => return Ok(Token::Eof),
                Some(' ') | Some('\t') | Some('\r') => {
                    self.pos += 1;
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                Some('\n') => {
                    self.pos += 1;
                    self.line += 1;
                    return Ok(Token::Newline);
                }
                Some(c) if self.is_digit_start(c) => return self.scan_number(),
                Some('\'') | Some('"') => return self.scan_string(),
                Some(c) if c.is_alphabetic() || c == '_' => return Ok(self.scan_ident()),
                Some(_) => return self.scan_operator(),
            }
        }
    }

    /// One numeric component: digits in the current base, with point and
    /// exponent in decimal bases, and a `/q` rational tail.
    fn scan_number_text(&mut self) -> String {
        let mut s = String::new();
        let decimal = matches!(self.conf.input_base(), 0 | 10);
        if decimal && self.peek() == Some('0') {
            if let Some(marker) = self.peek_at(1) {
                if "xXoObB".contains(marker) && self.peek_at(2).is_some() {
                    s.push(self.bump().unwrap());
                    s.push(self.bump().unwrap());
                    while let Some(c) = self.peek() {
                        if c.is_ascii_hexdigit() {
                            s.push(self.bump().unwrap());
                        } else {
                            break;
                        }
                    }
                    return s;
                }
            }
        }
        while let Some(c) = self.peek() {
            if self.is_number_char(c) {
                s.push(self.bump().unwrap());
            } else if decimal && c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
                s.push(self.bump().unwrap());
            } else if decimal
                && (c == 'e' || c == 'E')
                && self
                    .peek_at(1)
                    .is_some_and(|d| d.is_ascii_digit() || d == '+' || d == '-')
                && (self.peek_at(1).is_some_and(|d| d.is_ascii_digit())
                    || self.peek_at(2).is_some_and(|d| d.is_ascii_digit()))
            {
                s.push(self.bump().unwrap());
                if matches!(self.peek(), Some('+') | Some('-')) {
                    s.push(self.bump().unwrap());
                }
            } else {
                break;
            }
        }
        // Rational tail: `p/q` written without spaces.
        if self.peek() == Some('/')
            && !s.contains(['.', 'e', 'E'])
            && self.peek_at(1).is_some_and(|d| self.is_number_char(d))
        {
            s.push(self.bump().unwrap());
            while let Some(c) = self.peek() {
                if self.is_number_char(c) {
                    s.push(self.bump().unwrap());
                } else {
                    break;
                }
            }
        }
        s
    }

    fn scan_number(&mut self) -> Result<Token> {
        let first = self.scan_number_text();
        let re = value::parse_number(self.conf, &first)?;
        // `j` glues two components into a complex literal.
        if self.peek() == Some('j') && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
            self.pos += 1;
            let second = self.scan_number_text();
            let im = value::parse_number(self.conf, &second)?;
            return Ok(Token::Number(Value::complex(re, im)));
        }
        Ok(Token::Number(re))
    }

    fn scan_string(&mut self) -> Result<Token> {
        let quote = self.bump().unwrap_or('\'');
        let mut s = String::new();
        loop {
            match self.bump() {
                None => return Err(EvalError::Parse("unterminated string".into())),
                Some(c) if c == quote => return Ok(Token::Str(s)),
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('\\') => s.push('\\'),
                    Some('\'') => s.push('\''),
                    Some('"') => s.push('"'),
                    Some(other) => {
                        return Err(EvalError::Parse(format!("bad escape \\{}", other)))
                    }
                    None => return Err(EvalError::Parse("unterminated string".into())),
                },
                Some(c) => s.push(c),
            }
        }
    }

    fn scan_ident(&mut self) -> Token {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                s.push(self.bump().unwrap());
            } else {
                break;
            }
        }
        Token::Ident(s)
    }

    fn scan_operator(&mut self) -> Result<Token> {
        let c = self.bump().unwrap_or(' ');
        let two = |this: &mut Self, next: char, long: &str, short: &str| -> Token {
            if this.peek() == Some(next) {
                this.pos += 1;
                Token::Op(long.to_string())
            } else {
                Token::Op(short.to_string())
            }
        };
        Ok(match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ';' => Token::Semicolon,
            ':' => Token::Colon,
            '.' => Token::Dot,
            '=' => {
                if self.peek() == Some('=') {
                    self.pos += 1;
                    Token::Op("==".into())
                } else {
                    Token::Assign
                }
            }
            '!' => two(self, '=', "!=", "!"),
            '<' => {
                if self.peek() == Some('<') {
                    self.pos += 1;
                    Token::Op("<<".into())
                } else {
                    two(self, '=', "<=", "<")
                }
            }
            '>' => {
                if self.peek() == Some('>') {
                    self.pos += 1;
                    Token::Op(">>".into())
                } else {
                    two(self, '=', ">=", ">")
                }
            }
            '*' => two(self, '*', "**", "*"),
            '+' | '-' | '/' | '\\' | '&' | '|' | '^' | ',' | '?' => Token::Op(c.to_string()),
            other => {
                return Err(EvalError::Parse(format!(
                    "unexpected character {:?}",
                    other
                )))
            }
        })
    }
}

/// Scan a whole source unit; a failure carries the line it occurred on.
pub fn scan(
    conf: &Config,
    src: &str,
) -> std::result::Result<Vec<(Token, usize)>, (usize, EvalError)> {
    let mut scanner = Scanner::new(conf, src);
    scanner.tokenize().map_err(|e| (scanner.line(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_rational::BigRational;

    fn toks(src: &str) -> Vec<Token> {
        scan(&Config::new(), src)
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }

    #[test]
    fn numbers() {
        assert_eq!(toks("42")[0], Token::Number(Value::Int(42)));
        assert_eq!(
            toks("1/3")[0],
            Token::Number(Value::Rat(BigRational::new(1.into(), 3.into())))
        );
        assert!(matches!(&toks("1.5")[0], Token::Number(Value::Float(_))));
        assert_eq!(toks("1e3")[0], Token::Number(Value::Int(1000)));
        assert_eq!(toks("0x1f")[0], Token::Number(Value::Int(31)));
        assert_eq!(
            toks("1j2")[0],
            Token::Number(Value::complex(Value::Int(1), Value::Int(2)))
        );
    }

    #[test]
    fn spaced_slash_is_division() {
        let t = toks("6 / 3");
        assert_eq!(t[0], Token::Number(Value::Int(6)));
        assert_eq!(t[1], Token::Op("/".into()));
        assert_eq!(t[2], Token::Number(Value::Int(3)));
        // Adjacent digits form a rational literal instead.
        assert_eq!(toks("6/3")[0], Token::Number(Value::Int(2)));
    }

    #[test]
    fn operators_and_brackets() {
        let t = toks("a[1;2] = b ** 2 <= c != d");
        assert_eq!(t[0], Token::Ident("a".into()));
        assert_eq!(t[1], Token::LBracket);
        assert_eq!(t[3], Token::Semicolon);
        assert_eq!(t[5], Token::RBracket);
        assert_eq!(t[6], Token::Assign);
        assert_eq!(t[8], Token::Op("**".into()));
        assert_eq!(t[10], Token::Op("<=".into()));
        assert_eq!(t[12], Token::Op("!=".into()));
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(toks("'abc'")[0], Token::Str("abc".into()));
        assert_eq!(toks("\"a\\nb\"")[0], Token::Str("a\nb".into()));
        assert!(scan(&Config::new(), "'open").is_err());
    }

    #[test]
    fn comments_and_newlines() {
        let t = toks("1 # ignored\n2");
        assert_eq!(t[0], Token::Number(Value::Int(1)));
        assert_eq!(t[1], Token::Newline);
        assert_eq!(t[2], Token::Number(Value::Int(2)));
    }

    #[test]
    fn tokens_carry_their_line() {
        let t = scan(&Config::new(), "1\n2 3\n\n4").unwrap();
        let lines: Vec<(Token, usize)> = t
            .into_iter()
            .filter(|(t, _)| matches!(t, Token::Number(_)))
            .collect();
        assert_eq!(lines[0].1, 1);
        assert_eq!(lines[1].1, 2);
        assert_eq!(lines[2].1, 2);
        assert_eq!(lines[3].1, 4);
    }

    #[test]
    fn scan_errors_report_the_line() {
        let err = scan(&Config::new(), "1\n2\n'open").unwrap_err();
        assert_eq!(err.0, 3);
    }

    #[test]
    fn hex_input_base() {
        // A number token must open with a digit, so hex values with a
        // leading letter take a zero prefix; identifiers stay unambiguous.
        let mut conf = Config::new();
        conf.set_base(16, 0).unwrap();
        let t = scan(&conf, "0ff 10").unwrap();
        assert_eq!(t[0].0, Token::Number(Value::Int(255)));
        assert_eq!(t[1].0, Token::Number(Value::Int(16)));
    }
}

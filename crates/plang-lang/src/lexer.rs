//! Tokenizer for PLang source.
//!
//! Whitespace, `#` comments and `//` comments are skipped. Every token
//! carries the 1-based line it started on so parse errors can point at the
//! offending line.

use plang_contracts::error::{PlangError, PlangResult};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),

    // Keywords
    Policy,
    Priority,
    When,
    Then,
    Else,
    Allow,
    Deny,
    Route,
    To,
    Escalate,
    And,
    Or,
    Not,
    True,
    False,
    Null,

    // Punctuation
    Colon,
    Semicolon,
    Comma,
    Dot,
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,

    Eof,
}

impl TokenKind {
    /// Human-readable rendering for error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(s) => format!("identifier '{}'", s),
            TokenKind::Str(s) => format!("string {:?}", s),
            TokenKind::Int(i) => format!("integer {}", i),
            TokenKind::Float(f) => format!("number {}", f),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    pub(crate) fn symbol(&self) -> &'static str {
        match self {
            TokenKind::Policy => "policy",
            TokenKind::Priority => "priority",
            TokenKind::When => "when",
            TokenKind::Then => "then",
            TokenKind::Else => "else",
            TokenKind::Allow => "allow",
            TokenKind::Deny => "deny",
            TokenKind::Route => "route",
            TokenKind::To => "to",
            TokenKind::Escalate => "escalate",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::Not => "not",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Null => "null",
            TokenKind::Colon => ":",
            TokenKind::Semicolon => ";",
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::Ident(_)
            | TokenKind::Str(_)
            | TokenKind::Int(_)
            | TokenKind::Float(_)
            | TokenKind::Eof => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

fn keyword(word: &str) -> Option<TokenKind> {
    let kind = match word {
        "policy" => TokenKind::Policy,
        "priority" => TokenKind::Priority,
        "when" => TokenKind::When,
        "then" => TokenKind::Then,
        "else" => TokenKind::Else,
        "allow" => TokenKind::Allow,
        "deny" => TokenKind::Deny,
        "route" => TokenKind::Route,
        "to" => TokenKind::To,
        "escalate" => TokenKind::Escalate,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        _ => return None,
    };
    Some(kind)
}

/// Split `source` into tokens, ending with a single `Eof`.
pub fn tokenize(source: &str) -> PlangResult<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;
    let mut line = 1;

    let error = |line: usize, message: String| PlangError::Parse { line, message };

    while pos < chars.len() {
        let c = chars[pos];

        match c {
            '\n' => {
                line += 1;
                pos += 1;
            }
            c if c.is_whitespace() => pos += 1,
            '#' => {
                while pos < chars.len() && chars[pos] != '\n' {
                    pos += 1;
                }
            }
            '/' if chars.get(pos + 1) == Some(&'/') => {
                while pos < chars.len() && chars[pos] != '\n' {
                    pos += 1;
                }
            }
            '"' => {
                let start_line = line;
                pos += 1;
                let mut text = String::new();
                loop {
                    match chars.get(pos) {
                        None => return Err(error(start_line, "unterminated string literal".into())),
                        Some('"') => {
                            pos += 1;
                            break;
                        }
                        Some('\\') => {
                            let escaped = match chars.get(pos + 1) {
                                Some('n') => '\n',
                                Some('t') => '\t',
                                Some('"') => '"',
                                Some('\\') => '\\',
                                Some(other) => {
                                    return Err(error(
                                        line,
                                        format!("unknown escape sequence '\\{}'", other),
                                    ))
                                }
                                None => {
                                    return Err(error(start_line, "unterminated string literal".into()))
                                }
                            };
                            text.push(escaped);
                            pos += 2;
                        }
                        Some('\n') => {
                            line += 1;
                            text.push('\n');
                            pos += 1;
                        }
                        Some(ch) => {
                            text.push(*ch);
                            pos += 1;
                        }
                    }
                }
                tokens.push(Token { kind: TokenKind::Str(text), line: start_line });
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(pos + 1).is_some_and(|d| d.is_ascii_digit())) =>
            {
                let start = pos;
                pos += 1;
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
                let mut is_float = false;
                if chars.get(pos) == Some(&'.') && chars.get(pos + 1).is_some_and(|d| d.is_ascii_digit()) {
                    is_float = true;
                    pos += 1;
                    while pos < chars.len() && chars[pos].is_ascii_digit() {
                        pos += 1;
                    }
                }
                let text: String = chars[start..pos].iter().collect();
                let kind = if is_float {
                    text.parse::<f64>()
                        .map(TokenKind::Float)
                        .map_err(|e| error(line, format!("invalid number '{}': {}", text, e)))?
                } else {
                    text.parse::<i64>()
                        .map(TokenKind::Int)
                        .map_err(|e| error(line, format!("invalid integer '{}': {}", text, e)))?
                };
                tokens.push(Token { kind, line });
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = pos;
                while pos < chars.len()
                    && (chars[pos].is_alphanumeric() || chars[pos] == '_' || chars[pos] == '-')
                {
                    pos += 1;
                }
                let word: String = chars[start..pos].iter().collect();
                let kind = keyword(&word).unwrap_or(TokenKind::Ident(word));
                tokens.push(Token { kind, line });
            }
            _ => {
                let next = chars.get(pos + 1).copied();
                let (kind, width) = match (c, next) {
                    ('=', Some('=')) => (TokenKind::EqEq, 2),
                    ('!', Some('=')) => (TokenKind::NotEq, 2),
                    ('<', Some('=')) => (TokenKind::Le, 2),
                    ('>', Some('=')) => (TokenKind::Ge, 2),
                    ('<', _) => (TokenKind::Lt, 1),
                    ('>', _) => (TokenKind::Gt, 1),
                    (':', _) => (TokenKind::Colon, 1),
                    (';', _) => (TokenKind::Semicolon, 1),
                    (',', _) => (TokenKind::Comma, 1),
                    ('.', _) => (TokenKind::Dot, 1),
                    ('{', _) => (TokenKind::LBrace, 1),
                    ('}', _) => (TokenKind::RBrace, 1),
                    ('(', _) => (TokenKind::LParen, 1),
                    (')', _) => (TokenKind::RParen, 1),
                    ('[', _) => (TokenKind::LBracket, 1),
                    (']', _) => (TokenKind::RBracket, 1),
                    _ => return Err(error(line, format!("unexpected character '{}'", c))),
                };
                tokens.push(Token { kind, line });
                pos += width;
            }
        }
    }

    tokens.push(Token { kind: TokenKind::Eof, line });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("policy block-pii: SAFETY"),
            vec![
                TokenKind::Policy,
                TokenKind::Ident("block-pii".into()),
                TokenKind::Colon,
                TokenKind::Ident("SAFETY".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped_and_lines_counted() {
        let tokens = tokenize("# header\n// another\n  allow").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Allow);
        assert_eq!(tokens[0].line, 3);
    }

    #[test]
    fn numbers_and_operators() {
        assert_eq!(
            kinds("x >= -3 and y != 2.5"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Ge,
                TokenKind::Int(-3),
                TokenKind::And,
                TokenKind::Ident("y".into()),
                TokenKind::NotEq,
                TokenKind::Float(2.5),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#""say \"hi\"""#),
            vec![TokenKind::Str("say \"hi\"".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn unterminated_string_reports_start_line() {
        match tokenize("\n\n\"open") {
            Err(PlangError::Parse { line, message }) => {
                assert_eq!(line, 3);
                assert!(message.contains("unterminated"));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn stray_character_is_rejected() {
        assert!(matches!(tokenize("allow @"), Err(PlangError::Parse { line: 1, .. })));
    }
}

//! Hand-written tokenizer (spec §1: the lexer is an external collaborator
//! whose interface — a token stream with kinds and source positions — is
//! specified but whose implementation is not; grounded in
//! `original_source/muni2wasm/parser.py`'s token-kind vocabulary, since no
//! standalone `lexer.py` survived in the retrieved source).

use std::fmt;

use thiserror::Error;

use crate::ast::Position;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    StringLit,
    True,
    False,
    Null,
    Int,
    Bool,
    Void,
    Structure,
    Static,
    Return,
    Break,
    Continue,
    If,
    Else,
    While,
    Until,
    For,
    Do,
    Import,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Semi,
    Assign,
    Arrow,
    Op(&'static str),
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Op(s) => write!(f, "{s}"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: Position,
}

#[derive(Debug, Error)]
pub enum LexError {
    #[error("{pos}: unexpected character '{ch}'")]
    UnexpectedChar { ch: char, pos: Position },
    #[error("{pos}: unterminated string literal")]
    UnterminatedString { pos: Position },
}

impl LexError {
    pub fn position(&self) -> Position {
        match self {
            LexError::UnexpectedChar { pos, .. } => *pos,
            LexError::UnterminatedString { pos, .. } => *pos,
        }
    }
}

fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        "int" => TokenKind::Int,
        "boolean" => TokenKind::Bool,
        "void" => TokenKind::Void,
        "structure" => TokenKind::Structure,
        "static" => TokenKind::Static,
        "return" => TokenKind::Return,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "until" => TokenKind::Until,
        "for" => TokenKind::For,
        "do" => TokenKind::Do,
        "import" => TokenKind::Import,
        _ => return None,
    })
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0usize;
    let mut line = 1usize;
    let mut col = 1usize;
    let mut tokens = Vec::new();

    macro_rules! advance {
        () => {{
            let c = chars[i];
            i += 1;
            if c == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
            c
        }};
    }

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            advance!();
            continue;
        }

        if c == '/' && i + 1 < chars.len() && chars[i + 1] == '/' {
            while i < chars.len() && chars[i] != '\n' {
                advance!();
            }
            continue;
        }

        let start_pos = Position { line, col };

        if c.is_ascii_digit() {
            let mut text = String::new();
            while i < chars.len() && chars[i].is_ascii_digit() {
                text.push(advance!());
            }
            tokens.push(Token {
                kind: TokenKind::Number,
                text,
                pos: start_pos,
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let mut text = String::new();
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                text.push(advance!());
            }
            let kind = keyword(&text).unwrap_or(TokenKind::Ident);
            tokens.push(Token {
                kind,
                text,
                pos: start_pos,
            });
            continue;
        }

        if c == '"' {
            advance!();
            let mut text = String::new();
            loop {
                if i >= chars.len() {
                    return Err(LexError::UnterminatedString { pos: start_pos });
                }
                let ch = chars[i];
                if ch == '"' {
                    advance!();
                    break;
                }
                if ch == '\\' && i + 1 < chars.len() {
                    advance!();
                    let esc = advance!();
                    text.push(match esc {
                        'n' => '\n',
                        't' => '\t',
                        '"' => '"',
                        '\\' => '\\',
                        other => other,
                    });
                    continue;
                }
                text.push(advance!());
            }
            tokens.push(Token {
                kind: TokenKind::StringLit,
                text,
                pos: start_pos,
            });
            continue;
        }

        macro_rules! single {
            ($kind:expr) => {{
                advance!();
                tokens.push(Token {
                    kind: $kind,
                    text: c.to_string(),
                    pos: start_pos,
                });
            }};
        }

        match c {
            '(' => single!(TokenKind::LParen),
            ')' => single!(TokenKind::RParen),
            '{' => single!(TokenKind::LBrace),
            '}' => single!(TokenKind::RBrace),
            '[' => single!(TokenKind::LBracket),
            ']' => single!(TokenKind::RBracket),
            ',' => single!(TokenKind::Comma),
            '.' => single!(TokenKind::Dot),
            ';' => single!(TokenKind::Semi),
            '=' => {
                advance!();
                if i < chars.len() && chars[i] == '=' {
                    advance!();
                    tokens.push(Token {
                        kind: TokenKind::Op("=="),
                        text: "==".into(),
                        pos: start_pos,
                    });
                } else {
                    tokens.push(Token {
                        kind: TokenKind::Assign,
                        text: "=".into(),
                        pos: start_pos,
                    });
                }
            }
            '!' => {
                advance!();
                if i < chars.len() && chars[i] == '=' {
                    advance!();
                    tokens.push(Token {
                        kind: TokenKind::Op("!="),
                        text: "!=".into(),
                        pos: start_pos,
                    });
                } else {
                    tokens.push(Token {
                        kind: TokenKind::Op("!"),
                        text: "!".into(),
                        pos: start_pos,
                    });
                }
            }
            '<' => {
                advance!();
                if i < chars.len() && chars[i] == '=' {
                    advance!();
                    tokens.push(Token {
                        kind: TokenKind::Op("<="),
                        text: "<=".into(),
                        pos: start_pos,
                    });
                } else {
                    tokens.push(Token {
                        kind: TokenKind::Op("<"),
                        text: "<".into(),
                        pos: start_pos,
                    });
                }
            }
            '>' => {
                advance!();
                if i < chars.len() && chars[i] == '=' {
                    advance!();
                    tokens.push(Token {
                        kind: TokenKind::Op(">="),
                        text: ">=".into(),
                        pos: start_pos,
                    });
                } else {
                    tokens.push(Token {
                        kind: TokenKind::Op(">"),
                        text: ">".into(),
                        pos: start_pos,
                    });
                }
            }
            '&' if i + 1 < chars.len() && chars[i + 1] == '&' => {
                advance!();
                advance!();
                tokens.push(Token {
                    kind: TokenKind::Op("&&"),
                    text: "&&".into(),
                    pos: start_pos,
                });
            }
            '|' if i + 1 < chars.len() && chars[i + 1] == '|' => {
                advance!();
                advance!();
                tokens.push(Token {
                    kind: TokenKind::Op("||"),
                    text: "||".into(),
                    pos: start_pos,
                });
            }
            '+' if i + 1 < chars.len() && chars[i + 1] == '+' => {
                advance!();
                advance!();
                tokens.push(Token {
                    kind: TokenKind::Op("++"),
                    text: "++".into(),
                    pos: start_pos,
                });
            }
            '-' if i + 1 < chars.len() && chars[i + 1] == '-' => {
                advance!();
                advance!();
                tokens.push(Token {
                    kind: TokenKind::Op("--"),
                    text: "--".into(),
                    pos: start_pos,
                });
            }
            '-' if i + 1 < chars.len() && chars[i + 1] == '>' => {
                advance!();
                advance!();
                tokens.push(Token {
                    kind: TokenKind::Arrow,
                    text: "->".into(),
                    pos: start_pos,
                });
            }
            '+' | '-' | '*' | '/' | '%' if i + 1 < chars.len() && chars[i + 1] == '=' => {
                advance!();
                advance!();
                let text = format!("{c}=");
                let kind = match c {
                    '+' => TokenKind::Op("+="),
                    '-' => TokenKind::Op("-="),
                    '*' => TokenKind::Op("*="),
                    '/' => TokenKind::Op("/="),
                    '%' => TokenKind::Op("%="),
                    _ => unreachable!(),
                };
                tokens.push(Token {
                    kind,
                    text,
                    pos: start_pos,
                });
            }
            '+' => single!(TokenKind::Op("+")),
            '-' => single!(TokenKind::Op("-")),
            '*' => single!(TokenKind::Op("*")),
            '/' => single!(TokenKind::Op("/")),
            '%' => single!(TokenKind::Op("%")),
            other => return Err(LexError::UnexpectedChar { ch: other, pos: start_pos }),
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        text: String::new(),
        pos: Position { line, col },
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_a_function_signature() {
        let toks = tokenize("int add(int a, int b) { return a + b; }").unwrap();
        let kinds: Vec<&TokenKind> = toks.iter().map(|t| &t.kind).collect();
        assert_eq!(kinds[0], &TokenKind::Int);
        assert_eq!(kinds[1], &TokenKind::Ident);
        assert_eq!(kinds[2], &TokenKind::LParen);
        assert_eq!(*kinds.last().unwrap(), &TokenKind::Eof);
    }

    #[test]
    fn tracks_line_and_column() {
        let toks = tokenize("int a;\nint b;").unwrap();
        let second_int = toks.iter().find(|t| t.pos.line == 2).unwrap();
        assert_eq!(second_int.pos, Position { line: 2, col: 1 });
    }

    #[test]
    fn compound_assignment_operators_lex_as_single_tokens() {
        let toks = tokenize("x += 1; y++;").unwrap();
        assert_eq!(toks[1].kind, TokenKind::Op("+="));
        assert!(toks.iter().any(|t| t.kind == TokenKind::Op("++")));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = tokenize("\"abc").unwrap_err();
        assert!(matches!(err, LexError::UnterminatedString { .. }));
    }
}

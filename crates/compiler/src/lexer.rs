//! Lexer for Cb source text
//!
//! Produces a flat token vector with source positions. Comments are
//! skipped, adjacent string literals are concatenated, and integer /
//! character literals arrive with their values already decoded. Lexical
//! errors (unterminated string or comment, stray bytes) are reported
//! through the shared [`Diagnostics`] sink as syntax errors.

use crate::error::{Diagnostics, Location};
use std::iter::Peekable;
use std::path::PathBuf;
use std::rc::Rc;
use std::str::Chars;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    Void,
    Char,
    Short,
    Int,
    Long,
    Unsigned,
    Signed,
    Struct,
    Union,
    Enum,
    Static,
    Extern,
    Const,
    Typedef,
    If,
    Else,
    While,
    Do,
    For,
    Return,
    Break,
    Continue,
    Goto,
    Switch,
    Case,
    Default,
    Sizeof,
    Import,

    Ident,
    IntLiteral,
    CharLiteral,
    StringLiteral,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,
    Dot,
    Arrow,
    Ellipsis,
    Question,
    Colon,
    Tilde,
    Bang,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Lt,
    Gt,
    LtEq,
    GtEq,
    EqEq,
    BangEq,
    Shl,
    Shr,
    AmpAmp,
    PipePipe,
    PlusPlus,
    MinusMinus,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    ShlAssign,
    ShrAssign,

    Eof,
}

impl TokenKind {
    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            TokenKind::Void
                | TokenKind::Char
                | TokenKind::Short
                | TokenKind::Int
                | TokenKind::Long
                | TokenKind::Unsigned
                | TokenKind::Signed
                | TokenKind::Struct
                | TokenKind::Union
                | TokenKind::Enum
                | TokenKind::Static
                | TokenKind::Extern
                | TokenKind::Const
                | TokenKind::Typedef
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::While
                | TokenKind::Do
                | TokenKind::For
                | TokenKind::Return
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Goto
                | TokenKind::Switch
                | TokenKind::Case
                | TokenKind::Default
                | TokenKind::Sizeof
                | TokenKind::Import
        )
    }
}

fn keyword_kind(ident: &str) -> Option<TokenKind> {
    let kind = match ident {
        "void" => TokenKind::Void,
        "char" => TokenKind::Char,
        "short" => TokenKind::Short,
        "int" => TokenKind::Int,
        "long" => TokenKind::Long,
        "unsigned" => TokenKind::Unsigned,
        "signed" => TokenKind::Signed,
        "struct" => TokenKind::Struct,
        "union" => TokenKind::Union,
        "enum" => TokenKind::Enum,
        "static" => TokenKind::Static,
        "extern" => TokenKind::Extern,
        "const" => TokenKind::Const,
        "typedef" => TokenKind::Typedef,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "do" => TokenKind::Do,
        "for" => TokenKind::For,
        "return" => TokenKind::Return,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "goto" => TokenKind::Goto,
        "switch" => TokenKind::Switch,
        "case" => TokenKind::Case,
        "default" => TokenKind::Default,
        "sizeof" => TokenKind::Sizeof,
        "import" => TokenKind::Import,
        _ => return None,
    };
    Some(kind)
}

/// Decoded payload for literal tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenValue {
    None,
    /// Integer literal with its suffix flags; the value is kept unsigned
    /// and wide, the type resolver decides the final type.
    Int {
        value: u64,
        unsigned: bool,
        long: bool,
    },
    Char(u8),
    /// Decoded bytes, without the terminating NUL.
    Str(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub value: TokenValue,
    pub location: Location,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, location: Location) -> Self {
        Token {
            kind,
            text: text.into(),
            value: TokenValue::None,
            location,
        }
    }

    pub fn int_value(&self) -> u64 {
        match self.value {
            TokenValue::Int { value, .. } => value,
            TokenValue::Char(c) => c as u64,
            _ => 0,
        }
    }
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    file: Rc<PathBuf>,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(file: Rc<PathBuf>, source: &'a str) -> Self {
        Lexer {
            chars: source.chars().peekable(),
            file,
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    /// Tokenize the whole input. Always returns a token vector ending in
    /// `Eof`; lexical errors land in `diags`.
    pub fn lex(mut self, diags: &mut Diagnostics) -> Vec<Token> {
        loop {
            self.skip_whitespace_and_comments(diags);
            let location = self.location();
            let Some(&c) = self.chars.peek() else {
                self.tokens.push(Token::new(TokenKind::Eof, "", location));
                break;
            };
            match c {
                'a'..='z' | 'A'..='Z' | '_' => self.lex_ident(location),
                '0'..='9' => self.lex_number(location, diags),
                '\'' => self.lex_char(location, diags),
                '"' => self.lex_string(location, diags),
                _ => self.lex_punctuation(location, diags),
            }
        }
        self.concat_adjacent_strings();
        self.tokens
    }

    fn location(&self) -> Location {
        Location::new(self.file.clone(), self.line, self.column)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        match c {
            Some('\n') => {
                self.line += 1;
                self.column = 1;
            }
            Some(_) => self.column += 1,
            None => {}
        }
        c
    }

    fn bump_if(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_whitespace_and_comments(&mut self, diags: &mut Diagnostics) {
        loop {
            while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
                self.bump();
            }
            if self.chars.peek() != Some(&'/') {
                return;
            }
            let mut lookahead = self.chars.clone();
            lookahead.next();
            match lookahead.peek() {
                Some(&'/') => {
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(&'*') => {
                    let start = self.location();
                    self.bump();
                    self.bump();
                    let mut closed = false;
                    while let Some(c) = self.bump() {
                        if c == '*' && self.bump_if('/') {
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        diags.error(start, "unterminated block comment");
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    fn lex_ident(&mut self, location: Location) {
        let mut text = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let kind = keyword_kind(&text).unwrap_or(TokenKind::Ident);
        self.tokens.push(Token::new(kind, text, location));
    }

    fn lex_number(&mut self, location: Location, diags: &mut Diagnostics) {
        let mut text = String::new();
        let mut value: u64 = 0;
        let mut overflow = false;

        let radix = if self.chars.peek() == Some(&'0') {
            text.push('0');
            self.bump();
            if self.bump_if('x') || self.bump_if('X') {
                text.push('x');
                16
            } else {
                8
            }
        } else {
            10
        };
        while let Some(&c) = self.chars.peek() {
            let Some(digit) = c.to_digit(radix) else { break };
            text.push(c);
            self.bump();
            let (v, o1) = value.overflowing_mul(radix as u64);
            let (v, o2) = v.overflowing_add(digit as u64);
            value = v;
            overflow |= o1 || o2;
        }

        let mut unsigned = false;
        let mut long = false;
        while let Some(&c) = self.chars.peek() {
            match c {
                'u' | 'U' if !unsigned => unsigned = true,
                'l' | 'L' if !long => long = true,
                _ => break,
            }
            text.push(c);
            self.bump();
        }

        if overflow {
            diags.warn(location.clone(), "integer literal overflows, value wraps");
        }

        let mut token = Token::new(TokenKind::IntLiteral, text, location);
        token.value = TokenValue::Int {
            value,
            unsigned,
            long,
        };
        self.tokens.push(token);
    }

    /// Decode one character after a backslash. Returns None at EOF.
    fn lex_escape(&mut self, location: &Location, diags: &mut Diagnostics) -> Option<u8> {
        let c = self.bump()?;
        let decoded = match c {
            'n' => b'\n',
            't' => b'\t',
            'r' => b'\r',
            'a' => 0x07,
            'b' => 0x08,
            'f' => 0x0c,
            'v' => 0x0b,
            '0'..='7' => {
                let mut v = c.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match self.chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            v = v * 8 + d;
                            self.bump();
                        }
                        None => break,
                    }
                }
                v as u8
            }
            'x' => {
                let mut v: u32 = 0;
                let mut seen = false;
                while let Some(d) = self.chars.peek().and_then(|c| c.to_digit(16)) {
                    v = (v << 4) | d;
                    seen = true;
                    self.bump();
                }
                if !seen {
                    diags.error(location.clone(), "empty hex escape in literal");
                }
                v as u8
            }
            '\\' => b'\\',
            '\'' => b'\'',
            '"' => b'"',
            other => {
                diags.error(
                    location.clone(),
                    format!("unknown escape sequence '\\{}'", other),
                );
                other as u8
            }
        };
        Some(decoded)
    }

    fn lex_char(&mut self, location: Location, diags: &mut Diagnostics) {
        self.bump(); // opening quote
        let value = match self.chars.peek() {
            Some(&'\\') => {
                self.bump();
                self.lex_escape(&location, diags).unwrap_or(0)
            }
            Some(&c) if c != '\'' && c != '\n' => {
                self.bump();
                c as u8
            }
            _ => {
                diags.error(location.clone(), "empty character literal");
                0
            }
        };
        if !self.bump_if('\'') {
            diags.error(location.clone(), "unterminated character literal");
        }
        let mut token = Token::new(TokenKind::CharLiteral, "", location);
        token.value = TokenValue::Char(value);
        self.tokens.push(token);
    }

    fn lex_string(&mut self, location: Location, diags: &mut Diagnostics) {
        self.bump(); // opening quote
        let mut bytes = Vec::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => {
                    if let Some(b) = self.lex_escape(&location, diags) {
                        bytes.push(b);
                    }
                }
                Some('\n') | None => {
                    diags.error(location.clone(), "unterminated string literal");
                    break;
                }
                Some(c) => {
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
        let mut token = Token::new(TokenKind::StringLiteral, "", location);
        token.value = TokenValue::Str(bytes);
        self.tokens.push(token);
    }

    fn lex_punctuation(&mut self, location: Location, diags: &mut Diagnostics) {
        use TokenKind::*;
        let c = self.bump().unwrap_or('\0');
        let kind = match c {
            '(' => LParen,
            ')' => RParen,
            '{' => LBrace,
            '}' => RBrace,
            '[' => LBracket,
            ']' => RBracket,
            ';' => Semicolon,
            ',' => Comma,
            '?' => Question,
            ':' => Colon,
            '~' => Tilde,
            '.' => {
                if self.chars.peek() == Some(&'.') {
                    let mut lookahead = self.chars.clone();
                    lookahead.next();
                    if lookahead.peek() == Some(&'.') {
                        self.bump();
                        self.bump();
                        Ellipsis
                    } else {
                        Dot
                    }
                } else {
                    Dot
                }
            }
            '!' => {
                if self.bump_if('=') {
                    BangEq
                } else {
                    Bang
                }
            }
            '+' => {
                if self.bump_if('+') {
                    PlusPlus
                } else if self.bump_if('=') {
                    PlusAssign
                } else {
                    Plus
                }
            }
            '-' => {
                if self.bump_if('-') {
                    MinusMinus
                } else if self.bump_if('=') {
                    MinusAssign
                } else if self.bump_if('>') {
                    Arrow
                } else {
                    Minus
                }
            }
            '*' => {
                if self.bump_if('=') {
                    StarAssign
                } else {
                    Star
                }
            }
            '/' => {
                if self.bump_if('=') {
                    SlashAssign
                } else {
                    Slash
                }
            }
            '%' => {
                if self.bump_if('=') {
                    PercentAssign
                } else {
                    Percent
                }
            }
            '&' => {
                if self.bump_if('&') {
                    AmpAmp
                } else if self.bump_if('=') {
                    AmpAssign
                } else {
                    Amp
                }
            }
            '|' => {
                if self.bump_if('|') {
                    PipePipe
                } else if self.bump_if('=') {
                    PipeAssign
                } else {
                    Pipe
                }
            }
            '^' => {
                if self.bump_if('=') {
                    CaretAssign
                } else {
                    Caret
                }
            }
            '<' => {
                if self.bump_if('<') {
                    if self.bump_if('=') { ShlAssign } else { Shl }
                } else if self.bump_if('=') {
                    LtEq
                } else {
                    Lt
                }
            }
            '>' => {
                if self.bump_if('>') {
                    if self.bump_if('=') { ShrAssign } else { Shr }
                } else if self.bump_if('=') {
                    GtEq
                } else {
                    Gt
                }
            }
            '=' => {
                if self.bump_if('=') {
                    EqEq
                } else {
                    Assign
                }
            }
            other => {
                diags.error(location, format!("unexpected character '{}'", other));
                return;
            }
        };
        self.tokens.push(Token::new(kind, punct_text(kind), location));
    }

    /// `"a" "b"` lexes as one string literal, C style.
    fn concat_adjacent_strings(&mut self) {
        let mut merged: Vec<Token> = Vec::with_capacity(self.tokens.len());
        for token in self.tokens.drain(..) {
            if token.kind == TokenKind::StringLiteral
                && let Some(last) = merged.last_mut()
                && last.kind == TokenKind::StringLiteral
            {
                if let (TokenValue::Str(dst), TokenValue::Str(src)) =
                    (&mut last.value, &token.value)
                {
                    dst.extend_from_slice(src);
                }
                continue;
            }
            merged.push(token);
        }
        self.tokens = merged;
    }
}

fn punct_text(kind: TokenKind) -> &'static str {
    use TokenKind::*;
    match kind {
        LParen => "(",
        RParen => ")",
        LBrace => "{",
        RBrace => "}",
        LBracket => "[",
        RBracket => "]",
        Semicolon => ";",
        Comma => ",",
        Dot => ".",
        Arrow => "->",
        Ellipsis => "...",
        Question => "?",
        Colon => ":",
        Tilde => "~",
        Bang => "!",
        Plus => "+",
        Minus => "-",
        Star => "*",
        Slash => "/",
        Percent => "%",
        Amp => "&",
        Pipe => "|",
        Caret => "^",
        Lt => "<",
        Gt => ">",
        LtEq => "<=",
        GtEq => ">=",
        EqEq => "==",
        BangEq => "!=",
        Shl => "<<",
        Shr => ">>",
        AmpAmp => "&&",
        PipePipe => "||",
        PlusPlus => "++",
        MinusMinus => "--",
        Assign => "=",
        PlusAssign => "+=",
        MinusAssign => "-=",
        StarAssign => "*=",
        SlashAssign => "/=",
        PercentAssign => "%=",
        AmpAssign => "&=",
        PipeAssign => "|=",
        CaretAssign => "^=",
        ShlAssign => "<<=",
        ShrAssign => ">>=",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_ok(source: &str) -> Vec<Token> {
        let mut diags = Diagnostics::new();
        let tokens = Lexer::new(Rc::new(PathBuf::from("t.cb")), source).lex(&mut diags);
        assert!(!diags.has_errors(), "unexpected lex errors");
        tokens
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_keywords_and_idents() {
        let tokens = lex_ok("int main unsigned foo_1");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Int,
                TokenKind::Ident,
                TokenKind::Unsigned,
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
        assert_eq!(tokens[1].text, "main");
        assert_eq!(tokens[3].text, "foo_1");
    }

    #[test]
    fn test_integer_literals() {
        let tokens = lex_ok("42 0x2a 052 7U 7L 7UL");
        let values: Vec<u64> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::IntLiteral)
            .map(|t| t.int_value())
            .collect();
        assert_eq!(values, vec![42, 42, 42, 7, 7, 7]);
        assert_eq!(
            tokens[3].value,
            TokenValue::Int {
                value: 7,
                unsigned: true,
                long: false
            }
        );
        assert_eq!(
            tokens[5].value,
            TokenValue::Int {
                value: 7,
                unsigned: true,
                long: true
            }
        );
    }

    #[test]
    fn test_char_and_string_escapes() {
        let tokens = lex_ok(r#"'\n' 'a' "hi\tthere" "oct\101""#);
        assert_eq!(tokens[0].value, TokenValue::Char(b'\n'));
        assert_eq!(tokens[1].value, TokenValue::Char(b'a'));
        assert_eq!(tokens[2].value, TokenValue::Str(b"hi\tthere".to_vec()));
        assert_eq!(tokens[3].value, TokenValue::Str(b"octA".to_vec()));
    }

    #[test]
    fn test_adjacent_strings_concatenate() {
        let tokens = lex_ok(r#""foo" "bar""#);
        assert_eq!(tokens[0].value, TokenValue::Str(b"foobar".to_vec()));
        assert_eq!(tokens[1].kind, TokenKind::Eof);
    }

    #[test]
    fn test_punctuation_longest_match() {
        let tokens = lex_ok("<<= >>= ... -> ++ <= >> <");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::ShlAssign,
                TokenKind::ShrAssign,
                TokenKind::Ellipsis,
                TokenKind::Arrow,
                TokenKind::PlusPlus,
                TokenKind::LtEq,
                TokenKind::Shr,
                TokenKind::Lt,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = lex_ok("a // line\n /* block\n comment */ b");
        assert_eq!(tokens[0].text, "a");
        assert_eq!(tokens[1].text, "b");
        assert_eq!(tokens[1].location.line, 3);
    }

    #[test]
    fn test_positions() {
        let tokens = lex_ok("int\n  x;");
        assert_eq!((tokens[0].location.line, tokens[0].location.column), (1, 1));
        assert_eq!((tokens[1].location.line, tokens[1].location.column), (2, 3));
        assert_eq!((tokens[2].location.line, tokens[2].location.column), (2, 4));
    }

    #[test]
    fn test_unterminated_string_is_error() {
        let mut diags = Diagnostics::new();
        Lexer::new(Rc::new(PathBuf::from("t.cb")), "\"abc").lex(&mut diags);
        assert!(diags.has_errors());
    }

    #[test]
    fn test_unterminated_comment_is_error() {
        let mut diags = Diagnostics::new();
        Lexer::new(Rc::new(PathBuf::from("t.cb")), "/* never closed").lex(&mut diags);
        assert!(diags.has_errors());
    }

    #[test]
    fn test_unknown_character_is_error() {
        let mut diags = Diagnostics::new();
        let tokens = Lexer::new(Rc::new(PathBuf::from("t.cb")), "a $ b").lex(&mut diags);
        assert!(diags.has_errors());
        // lexing continues past the bad byte
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn test_literal_overflow_warns_and_wraps() {
        let mut diags = Diagnostics::new();
        let tokens =
            Lexer::new(Rc::new(PathBuf::from("t.cb")), "99999999999999999999999").lex(&mut diags);
        assert!(!diags.has_errors());
        assert_eq!(diags.iter().count(), 1);
        assert_eq!(tokens[0].kind, TokenKind::IntLiteral);
    }
}

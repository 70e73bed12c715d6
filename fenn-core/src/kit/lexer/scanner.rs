//! Fenn 扫描器
//!
//! 一个前向游标加当前词素起点。空白与注释（行注释、可嵌套
//! 块注释）直接跳过，换行推进行计数。未终止的字符串或块注释
//! 产出 Error token 并吞掉剩余输入。

use tracing::trace;

use super::token::{keyword_kind, Token, TokenKind};

/// 扫描器
pub struct Scanner<'src> {
    source: &'src [u8],
    /// 当前词素起点
    start: usize,
    /// 前向游标
    current: usize,
    line: u32,
}

fn is_digit(c: u8) -> bool {
    c.is_ascii_digit()
}

fn is_alpha(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_alphanumeric(c: u8) -> bool {
    is_alpha(c) || is_digit(c)
}

impl<'src> Scanner<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source: source.as_bytes(),
            start: 0,
            current: 0,
            line: 1,
        }
    }

    /// 当前行号
    pub fn line(&self) -> u32 {
        self.line
    }

    // ==================== 游标 ====================

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn peek(&self) -> u8 {
        self.source.get(self.current).copied().unwrap_or(0)
    }

    fn peek_next(&self) -> u8 {
        self.source.get(self.current + 1).copied().unwrap_or(0)
    }

    fn advance(&mut self) -> u8 {
        let c = self.peek();
        self.current += 1;
        c
    }

    fn matches(&mut self, expected: u8) -> bool {
        if self.is_at_end() || self.peek() != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn lexeme(&self) -> &str {
        // 源码为合法 UTF-8，词素边界落在 ASCII 字符上
        std::str::from_utf8(&self.source[self.start..self.current]).unwrap_or("")
    }

    fn make(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.lexeme(), self.line)
    }

    fn error_token(&self, message: &str) -> Token {
        Token::new(TokenKind::Error, message, self.line)
    }

    // ==================== 扫描 ====================

    /// 扫描下一个 token
    pub fn scan_token(&mut self) -> Token {
        if let Some(err) = self.skip_whitespace() {
            return err;
        }
        self.start = self.current;

        if self.is_at_end() {
            return Token::new(TokenKind::Eof, "", self.line);
        }

        let c = self.advance();

        if is_digit(c) {
            return self.number();
        }
        if is_alpha(c) {
            return self.identifier();
        }

        let token = match c {
            b'(' => self.make(TokenKind::LeftParen),
            b')' => self.make(TokenKind::RightParen),
            b'{' => self.make(TokenKind::LeftBrace),
            b'}' => self.make(TokenKind::RightBrace),
            b'[' => self.make(TokenKind::LeftBracket),
            b']' => self.make(TokenKind::RightBracket),
            b',' => self.make(TokenKind::Comma),
            b'.' => self.make(TokenKind::Dot),
            b';' => self.make(TokenKind::Semicolon),
            b':' => self.make(TokenKind::Colon),
            b'^' => self.make(TokenKind::Caret),
            b'%' => self.make(TokenKind::Percent),
            b'+' => {
                if self.matches(b'+') {
                    self.make(TokenKind::PlusPlus)
                } else if self.matches(b'=') {
                    self.make(TokenKind::PlusEqual)
                } else {
                    self.make(TokenKind::Plus)
                }
            }
            b'-' => {
                if self.matches(b'-') {
                    self.make(TokenKind::MinusMinus)
                } else if self.matches(b'=') {
                    self.make(TokenKind::MinusEqual)
                } else {
                    self.make(TokenKind::Minus)
                }
            }
            b'*' => {
                if self.matches(b'=') {
                    self.make(TokenKind::StarEqual)
                } else {
                    self.make(TokenKind::Star)
                }
            }
            b'/' => {
                if self.matches(b'=') {
                    self.make(TokenKind::SlashEqual)
                } else {
                    self.make(TokenKind::Slash)
                }
            }
            b'!' => {
                if self.matches(b'=') {
                    self.make(TokenKind::BangEqual)
                } else {
                    self.make(TokenKind::Bang)
                }
            }
            b'=' => {
                if self.matches(b'=') {
                    self.make(TokenKind::EqualEqual)
                } else {
                    self.make(TokenKind::Equal)
                }
            }
            b'<' => {
                if self.matches(b'=') {
                    self.make(TokenKind::LessEqual)
                } else {
                    self.make(TokenKind::Less)
                }
            }
            b'>' => {
                if self.matches(b'=') {
                    self.make(TokenKind::GreaterEqual)
                } else {
                    self.make(TokenKind::Greater)
                }
            }
            b'"' => self.string(),
            _ => self.error_token("Unexpected character"),
        };

        trace!(target: "fenn::lexer", kind = ?token.kind, line = token.line, "token");
        token
    }

    /// 字符串字面量，无转义处理，词素为去引号内容
    fn string(&mut self) -> Token {
        while self.peek() != b'"' && !self.is_at_end() {
            if self.peek() == b'\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_at_end() {
            return self.error_token("Unterminated string");
        }

        self.advance(); // 收尾引号

        let inner = std::str::from_utf8(&self.source[self.start + 1..self.current - 1])
            .unwrap_or("")
            .to_string();
        Token::new(TokenKind::String, inner, self.line)
    }

    /// 十进制数字，可带小数部分
    fn number(&mut self) -> Token {
        while is_digit(self.peek()) {
            self.advance();
        }
        if self.peek() == b'.' && is_digit(self.peek_next()) {
            self.advance();
            while is_digit(self.peek()) {
                self.advance();
            }
        }
        self.make(TokenKind::Number)
    }

    /// 标识符或关键字，折叠为小写
    fn identifier(&mut self) -> Token {
        while is_alphanumeric(self.peek()) {
            self.advance();
        }
        let folded = self.lexeme().to_ascii_lowercase();
        match keyword_kind(&folded) {
            Some(kind) => Token::new(kind, folded, self.line),
            None => Token::new(TokenKind::Identifier, folded, self.line),
        }
    }

    /// 跳过空白与注释
    ///
    /// 未闭合的块注释返回 Error token。
    fn skip_whitespace(&mut self) -> Option<Token> {
        loop {
            match self.peek() {
                b' ' | b'\r' | b'\t' => {
                    self.advance();
                }
                b'\n' => {
                    self.line += 1;
                    self.advance();
                }
                b'/' => {
                    if self.peek_next() == b'/' {
                        while self.peek() != b'\n' && !self.is_at_end() {
                            self.advance();
                        }
                    } else if self.peek_next() == b'*' {
                        if let Some(err) = self.skip_block_comment() {
                            return Some(err);
                        }
                    } else {
                        return None;
                    }
                }
                _ => return None,
            }
        }
    }

    /// 块注释，支持嵌套
    fn skip_block_comment(&mut self) -> Option<Token> {
        self.advance(); // '/'
        self.advance(); // '*'
        let mut depth = 1usize;

        while depth > 0 {
            if self.is_at_end() {
                return Some(self.error_token("Unterminated comment"));
            }
            if self.peek() == b'/' && self.peek_next() == b'*' {
                self.advance();
                self.advance();
                depth += 1;
            } else if self.peek() == b'*' && self.peek_next() == b'/' {
                self.advance();
                self.advance();
                depth -= 1;
            } else {
                if self.peek() == b'\n' {
                    self.line += 1;
                }
                self.advance();
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(source: &str) -> Vec<Token> {
        let mut scanner = Scanner::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = scanner.scan_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        scan_all(source).iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            kinds("var x = 1;"),
            vec![
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Equal,
                TokenKind::Number,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_compound_operators() {
        assert_eq!(
            kinds("+= -= *= /= ++ -- == != <= >="),
            vec![
                TokenKind::PlusEqual,
                TokenKind::MinusEqual,
                TokenKind::StarEqual,
                TokenKind::SlashEqual,
                TokenKind::PlusPlus,
                TokenKind::MinusMinus,
                TokenKind::EqualEqual,
                TokenKind::BangEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_line_tracking() {
        let tokens = scan_all("var x;\nvar y;");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[3].line, 2);
    }

    #[test]
    fn test_string_literal() {
        let tokens = scan_all("\"hello world\"");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].lexeme, "hello world");
    }

    #[test]
    fn test_unterminated_string() {
        let tokens = scan_all("\"abc");
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert_eq!(tokens[0].lexeme, "Unterminated string");
    }

    #[test]
    fn test_number_with_fraction() {
        let tokens = scan_all("12.5 7");
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].lexeme, "12.5");
        assert_eq!(tokens[1].lexeme, "7");
    }

    #[test]
    fn test_identifier_case_folded() {
        let tokens = scan_all("Speed WHILE");
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].lexeme, "speed");
        // 关键字同样不分大小写
        assert_eq!(tokens[1].kind, TokenKind::While);
    }

    #[test]
    fn test_line_comment_skipped() {
        assert_eq!(
            kinds("1 // comment\n2"),
            vec![TokenKind::Number, TokenKind::Number, TokenKind::Eof]
        );
    }

    #[test]
    fn test_nested_block_comment() {
        assert_eq!(
            kinds("1 /* outer /* inner */ still */ 2"),
            vec![TokenKind::Number, TokenKind::Number, TokenKind::Eof]
        );
    }

    #[test]
    fn test_unterminated_block_comment() {
        let tokens = scan_all("1 /* never closed");
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[1].kind, TokenKind::Error);
        assert_eq!(tokens[1].lexeme, "Unterminated comment");
    }

    #[test]
    fn test_comment_advances_line() {
        let tokens = scan_all("/* a\nb\nc */ x");
        assert_eq!(tokens[0].line, 3);
    }
}

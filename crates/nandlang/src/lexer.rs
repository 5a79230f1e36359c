//! The Nandlang lexer.
//!
//! Reads a byte stream into a recursive token tree: balanced `{ }` and
//! `( )` form nested `Block`/`Parenthesis` tokens. Grounded directly on
//! `original_source/src/parse.cpp`'s `_parseTokens`/`parseChar`/
//! `parseIndex`/`appendIdentifier` - the control flow below follows that
//! function closely, but position bookkeeping is simpler: every byte is
//! consumed through [`Lexer::bump`], which folds line/column advancement
//! into one place instead of the original's three parallel `DebugInfo`
//! variables.

use std::rc::Rc;

use crate::debug::DebugInfo;
use crate::error::{Error, Result};
use crate::token::{Token, TokenKind};

/// Size in bits of the implementation's pointer width. The `ptr` literal
/// expands to this; programs that use `ptr` as a static array size are
/// host-dependent by design.
pub const POINTER_SIZE: u64 = 8 * std::mem::size_of::<usize>() as u64;

const ESCAPE_TABLE: &[(u8, u8)] = &[
    (b'0', 0x00),
    (b't', 0x09),
    (b'n', 0x0A),
    (b'v', 0x0B),
    (b'f', 0x0C),
    // `\r` maps to form-feed, not carriage return. Matches
    // `original_source/src/parse.cpp`'s escape table.
    (b'r', 0x0C),
];

fn escape_lookup(c: u8) -> Option<u8> {
    ESCAPE_TABLE.iter().find(|(k, _)| *k == c).map(|(_, v)| *v)
}

fn is_identifier_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

fn is_string_identifier(s: &str) -> bool {
    !s.is_empty()
        && !s.as_bytes()[0].is_ascii_digit()
        && s.bytes().all(|c| c.is_ascii_alphanumeric() || c == b'_')
}

fn keyword(s: &str) -> Option<TokenKind> {
    Some(match s {
        "function" => TokenKind::Function,
        "while" => TokenKind::While,
        "if" => TokenKind::If,
        "var" => TokenKind::Var,
        "else" => TokenKind::Else,
        "for" => TokenKind::For,
        _ => return None,
    })
}

/// Tokenize an entire source string into a top-level token tree.
pub fn lex(source: &str, filename: &str) -> Result<Vec<Token>> {
    let mut lexer = Lexer {
        bytes: source.as_bytes(),
        pos: 0,
        info: DebugInfo::start(Rc::from(filename)),
    };
    lexer.parse_tokens(None)
}

struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
    info: DebugInfo,
}

impl<'a> Lexer<'a> {
    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Consume and return the next byte along with the `DebugInfo` that
    /// pointed at it (i.e. *before* advancing).
    fn bump(&mut self) -> Option<(u8, DebugInfo)> {
        let c = self.peek_byte()?;
        let info = self.info.clone();
        self.pos += 1;
        self.info.advance(c);
        Some((c, info))
    }

    fn number(s: &str, err: &str, info: &DebugInfo) -> Result<u64> {
        if s == "ptr" {
            return Ok(POINTER_SIZE);
        }
        s.parse::<u64>()
            .map_err(|_| Error::located(info.clone(), format!("{err} {s}")))
    }

    fn append_identifier(
        &self,
        block: &mut Vec<Token>,
        identifier: &mut String,
        id_info: &Option<DebugInfo>,
    ) -> Result<()> {
        if identifier.is_empty() {
            return Ok(());
        }
        let info = id_info.clone().unwrap_or_else(|| self.info.clone());
        if let Some(kw) = keyword(identifier) {
            block.push(Token::new(kw, info));
        } else if is_string_identifier(identifier) {
            block.push(Token::new(
                TokenKind::Identifier(Rc::from(identifier.as_str())),
                info,
            ));
        } else {
            let value = Self::number(identifier, "Bad identifier", &info)?;
            block.push(Token::new(TokenKind::Literal(value), info));
        }
        identifier.clear();
        Ok(())
    }

    fn parse_index(&mut self, block: &mut Vec<Token>, start: DebugInfo) -> Result<()> {
        let mut buf = String::new();
        loop {
            match self.bump() {
                None => break,
                Some((b']', _)) => break,
                Some((c, info)) => {
                    if c.is_ascii_whitespace() {
                        continue;
                    } else if c.is_ascii_graphic() {
                        buf.push(c as char);
                    } else {
                        return Err(Error::located(
                            info,
                            format!("Unexpected character 0x{c:02X} in index"),
                        ));
                    }
                }
            }
        }
        let value = Self::number(&buf, "Invalid index", &start)?;
        block.push(Token::new(TokenKind::Index(value), start));
        Ok(())
    }

    fn parse_char(&mut self, block: &mut Vec<Token>, start: DebugInfo) -> Result<()> {
        let mut buf = String::new();
        let mut last_info = start.clone();
        loop {
            match self.bump() {
                None => break,
                Some((b'\'', _)) => break,
                Some((c, info)) => {
                    last_info = info.clone();
                    if c.is_ascii_graphic() || c == b' ' {
                        buf.push(c as char);
                    } else {
                        return Err(Error::located(
                            info,
                            format!("Unexpected character 0x{c:02X} in character literal"),
                        ));
                    }
                }
            }
        }
        let value = char_literal_value(&buf)
            .ok_or_else(|| Error::located(last_info, format!("Invalid character literal {buf}")))?;
        for i in 0..8 {
            if i != 0 {
                block.push(Token::new(TokenKind::Comma, start.clone()));
            }
            // Most significant bit first - this language is big-endian.
            let bit = (value & (0x80 >> i)) != 0;
            block.push(Token::new(TokenKind::Literal(bit as u64), start.clone()));
        }
        Ok(())
    }

    /// Parse tokens until `endc` is met (or EOF, if `endc` is `None`).
    fn parse_tokens(&mut self, endc: Option<u8>) -> Result<Vec<Token>> {
        let mut block = Vec::new();
        let mut identifier = String::new();
        let mut id_info: Option<DebugInfo> = None;

        loop {
            let Some((c, info)) = self.bump() else {
                if let Some(endc) = endc {
                    return Err(Error::located(
                        self.info.clone(),
                        format!("Expected {} before end of file.", endc as char),
                    ));
                }
                self.append_identifier(&mut block, &mut identifier, &id_info)?;
                return Ok(block);
            };

            if c == b'/' && self.peek_byte() == Some(b'/') {
                while let Some((c2, _)) = self.bump() {
                    if c2 == b'\n' {
                        break;
                    }
                }
            } else if endc == Some(c) {
                self.append_identifier(&mut block, &mut identifier, &id_info)?;
                return Ok(block);
            } else if c == b'\'' {
                self.append_identifier(&mut block, &mut identifier, &id_info)?;
                self.parse_char(&mut block, info)?;
            } else if c == b'[' {
                self.append_identifier(&mut block, &mut identifier, &id_info)?;
                self.parse_index(&mut block, info)?;
            } else if c.is_ascii_whitespace() {
                self.append_identifier(&mut block, &mut identifier, &id_info)?;
            } else if let Some((kind, closer)) = single_char_symbol(c) {
                self.append_identifier(&mut block, &mut identifier, &id_info)?;
                match closer {
                    Some(closer) => {
                        let inner = self.parse_tokens(Some(closer))?;
                        let wrapped = match kind {
                            TokenKind::Block(_) => TokenKind::Block(inner),
                            TokenKind::Parenthesis(_) => TokenKind::Parenthesis(inner),
                            _ => unreachable!(),
                        };
                        block.push(Token::new(wrapped, info));
                    }
                    None => block.push(Token::new(kind, info)),
                }
            } else if is_identifier_byte(c) {
                if identifier.is_empty() {
                    id_info = Some(info);
                }
                identifier.push(c as char);
            } else {
                return Err(Error::located(info, format!("Unknown character '{}'", c as char)));
            }
        }
    }
}

/// Map a single punctuation byte to its token kind, and - for the two
/// bracket kinds - the byte that closes its nested block.
fn single_char_symbol(c: u8) -> Option<(TokenKind, Option<u8>)> {
    Some(match c {
        b',' => (TokenKind::Comma, None),
        b'{' => (TokenKind::Block(Vec::new()), Some(b'}')),
        b':' => (TokenKind::IoSep, None),
        b'(' => (TokenKind::Parenthesis(Vec::new()), Some(b')')),
        b'=' => (TokenKind::Assign, None),
        b';' => (TokenKind::LineSep, None),
        b'!' => (TokenKind::Nand, None),
        _ => return None,
    })
}

/// Decode a character literal's inner text (without the surrounding quotes)
/// into its byte value, following `getCharLiteralFromString`.
fn char_literal_value(s: &str) -> Option<u8> {
    let bytes = s.as_bytes();
    if bytes.is_empty() {
        return None;
    }
    if bytes[0] == b'\\' {
        if bytes.len() != 2 {
            return None;
        }
        escape_lookup(bytes[1])
    } else if bytes.len() == 1 {
        Some(bytes[0])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind.clone()).collect()
    }

    #[test]
    fn lex_round_trip_simple_tokens() {
        let tokens = lex("function foo ( a , b : c ) { var x = a ! b ; }", "t").unwrap();
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0].kind, TokenKind::Function);
        assert_eq!(tokens[1].identifier(), Some("foo"));
        assert!(matches!(tokens[2].kind, TokenKind::Parenthesis(_)));
        assert!(matches!(tokens[3].kind, TokenKind::Block(_)));
    }

    #[test]
    fn balanced_blocks_nest() {
        let tokens = lex("{ { } }", "t").unwrap();
        assert_eq!(tokens.len(), 1);
        let TokenKind::Block(inner) = &tokens[0].kind else {
            panic!("expected block");
        };
        assert_eq!(inner.len(), 1);
        assert!(matches!(inner[0].kind, TokenKind::Block(_)));
    }

    #[test]
    fn unmatched_bracket_is_an_error() {
        assert!(lex("{ a", "t").is_err());
        assert!(lex("( a", "t").is_err());
    }

    #[test]
    fn character_literal_expands_to_eight_bits_msb_first() {
        // 'A' == 0x41 == 0b0100_0001
        let tokens = lex("'A'", "t").unwrap();
        assert_eq!(tokens.len(), 15);
        let expected = [0u64, 1, 0, 0, 0, 0, 0, 1];
        let mut i = 0;
        for (idx, tok) in tokens.iter().enumerate() {
            if idx % 2 == 0 {
                assert_eq!(tok.value(), Some(expected[i]));
                i += 1;
            } else {
                assert_eq!(tok.kind, TokenKind::Comma);
            }
        }
    }

    #[test]
    fn escape_r_maps_to_form_feed() {
        let tokens = lex("'\\r'", "t").unwrap();
        let mut byte = 0u8;
        for (idx, tok) in tokens.iter().enumerate() {
            if idx % 2 == 0 {
                byte = (byte << 1) | tok.value().unwrap() as u8;
            }
        }
        assert_eq!(byte, 0x0C);
    }

    #[test]
    fn all_digit_identifier_is_a_literal() {
        let tokens = lex("42", "t").unwrap();
        assert_eq!(tokens[0].value(), Some(42));
    }

    #[test]
    fn ptr_inside_index_resolves_to_pointer_size() {
        let tokens = lex("x[ptr]", "t").unwrap();
        assert_eq!(tokens[1].value(), Some(POINTER_SIZE));
    }

    #[test]
    fn line_comment_is_skipped() {
        let tokens = lex("a // comment\nb", "t").unwrap();
        assert_eq!(kinds(&tokens).len(), 2);
    }

    #[test]
    fn unknown_character_is_an_error() {
        assert!(lex("@", "t").is_err());
    }
}

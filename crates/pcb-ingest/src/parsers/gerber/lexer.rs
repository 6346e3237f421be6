//! Tokens produced by the Gerber lexer.

/// Token payload: an extended command block (between `%` delimiters, one
/// token per `*`-terminated command inside) or a word command terminated
/// by `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Example: `"FSLAX24Y24"`, `"ADD10C,0.020"`, `"LPD"`
    Extended(String),
    /// Example: `"D10"`, `"X100Y200D01"`, `"G01"`, `"M02"`
    Word(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// 1-based line the token started on.
    pub line: usize,
}

/// Tokenize a Gerber file. Gerber uses `*` as a statement terminator and
/// `%...*%` for extended commands; `G04` comments are dropped here.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    let mut line = 1usize;

    macro_rules! bump {
        ($c:expr) => {
            if $c == '\n' {
                line += 1;
            }
        };
    }

    while let Some(&ch) = chars.peek() {
        match ch {
            '%' => {
                chars.next();
                let mut block = String::new();
                let mut start_line = line;
                loop {
                    match chars.peek() {
                        Some(&'%') => {
                            chars.next();
                            let trimmed = block.trim().to_string();
                            if !trimmed.is_empty() && !is_comment(&trimmed) {
                                tokens.push(Token {
                                    kind: TokenKind::Extended(trimmed),
                                    line: start_line,
                                });
                            }
                            break;
                        }
                        Some(&'*') => {
                            chars.next();
                            let trimmed = block.trim().to_string();
                            if !trimmed.is_empty() && !is_comment(&trimmed) {
                                tokens.push(Token {
                                    kind: TokenKind::Extended(trimmed),
                                    line: start_line,
                                });
                            }
                            block.clear();
                            start_line = line;
                        }
                        Some(&c) => {
                            chars.next();
                            bump!(c);
                            if c != '\n' && c != '\r' {
                                block.push(c);
                            }
                        }
                        None => break, // EOF inside extended block
                    }
                }
            }
            '\n' | '\r' | ' ' | '\t' => {
                chars.next();
                bump!(ch);
            }
            _ => {
                let start_line = line;
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '*' {
                        chars.next();
                        break;
                    }
                    if c == '%' {
                        break; // let the outer loop handle it
                    }
                    chars.next();
                    bump!(c);
                    if c != '\n' && c != '\r' {
                        word.push(c);
                    }
                }
                let trimmed = word.trim().to_string();
                if !trimmed.is_empty() && !is_comment(&trimmed) {
                    tokens.push(Token {
                        kind: TokenKind::Word(trimmed),
                        line: start_line,
                    });
                }
            }
        }
    }

    tokens
}

fn is_comment(s: &str) -> bool {
    s.starts_with("G04") || s.starts_with("G4")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(
            kinds("G01*\nD10*\nX100Y200D01*\nM02*\n"),
            vec![
                TokenKind::Word("G01".into()),
                TokenKind::Word("D10".into()),
                TokenKind::Word("X100Y200D01".into()),
                TokenKind::Word("M02".into()),
            ]
        );
    }

    #[test]
    fn test_extended_commands() {
        assert_eq!(
            kinds("%FSLAX24Y24*%\n%MOMM*%\n%ADD10C,0.020*%\n"),
            vec![
                TokenKind::Extended("FSLAX24Y24".into()),
                TokenKind::Extended("MOMM".into()),
                TokenKind::Extended("ADD10C,0.020".into()),
            ]
        );
    }

    #[test]
    fn test_comment_skipped() {
        assert_eq!(
            kinds("G04 This is a comment*\nD10*\n"),
            vec![TokenKind::Word("D10".into())]
        );
    }

    #[test]
    fn test_multiple_extended_in_one_block() {
        assert_eq!(
            kinds("%FSLAX24Y24*MOMM*%\n"),
            vec![
                TokenKind::Extended("FSLAX24Y24".into()),
                TokenKind::Extended("MOMM".into()),
            ]
        );
    }

    #[test]
    fn test_whitespace_inside_word_insignificant() {
        // Whitespace is insignificant outside strings.
        assert_eq!(
            kinds("X100 Y200\nD01*\n"),
            vec![TokenKind::Word("X100 Y200D01".into())]
        );
    }

    #[test]
    fn test_line_numbers() {
        let toks = tokenize("G01*\nD10*\n%MOMM*%\n");
        assert_eq!(toks[0].line, 1);
        assert_eq!(toks[1].line, 2);
        assert_eq!(toks[2].line, 3);
    }

    #[test]
    fn test_empty_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  \n\r\t  ").is_empty());
    }

    #[test]
    fn test_attribute_tokens() {
        assert_eq!(
            kinds("%TF.FileFunction,Copper,L1,Top*%\n%TD*%\n"),
            vec![
                TokenKind::Extended("TF.FileFunction,Copper,L1,Top".into()),
                TokenKind::Extended("TD".into()),
            ]
        );
    }
}

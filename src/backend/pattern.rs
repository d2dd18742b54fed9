//! Key pattern matching.
//!
//! Patterns follow SQL `LIKE` wildcards with glob aliases:
//! `%` or `*` match any byte sequence (including empty), `_` or `?` match
//! exactly one byte. Every other byte matches itself.

/// One element of a compiled pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Byte(u8),
    One,
    Any,
}

/// A compiled key pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    tokens: Vec<Token>,
}

impl KeyPattern {
    /// Compile a pattern.
    pub fn parse(pattern: &str) -> Self {
        let mut tokens: Vec<Token> = Vec::with_capacity(pattern.len());
        for byte in pattern.bytes() {
            let token = match byte {
                b'%' | b'*' => Token::Any,
                b'_' | b'?' => Token::One,
                b => Token::Byte(b),
            };
            // Consecutive `%` are equivalent to one
            if token == Token::Any && tokens.last() == Some(&Token::Any) {
                continue;
            }
            tokens.push(token);
        }
        Self { tokens }
    }

    /// Check if this pattern matches every key.
    pub fn is_match_all(&self) -> bool {
        self.tokens == [Token::Any]
    }

    /// Literal bytes every matching key starts with.
    pub fn literal_prefix(&self) -> Vec<u8> {
        self.tokens
            .iter()
            .map_while(|t| match t {
                Token::Byte(b) => Some(*b),
                _ => None,
            })
            .collect()
    }

    /// Check if `key` matches.
    pub fn matches(&self, key: &[u8]) -> bool {
        let tokens = &self.tokens;
        let (mut t, mut k) = (0, 0);
        // Position of the last `%` and the key offset it is currently absorbing up to
        let mut backtrack: Option<(usize, usize)> = None;

        while k < key.len() {
            match tokens.get(t) {
                Some(Token::Byte(b)) if *b == key[k] => {
                    t += 1;
                    k += 1;
                }
                Some(Token::One) => {
                    t += 1;
                    k += 1;
                }
                Some(Token::Any) => {
                    backtrack = Some((t, k));
                    t += 1;
                }
                _ => match backtrack {
                    Some((any_t, any_k)) => {
                        t = any_t + 1;
                        k = any_k + 1;
                        backtrack = Some((any_t, any_k + 1));
                    }
                    None => return false,
                },
            }
        }

        tokens[t..].iter().all(|t| *t == Token::Any)
    }
}

impl std::fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bytes: Vec<u8> = self
            .tokens
            .iter()
            .map(|token| match token {
                Token::Byte(b) => *b,
                Token::One => b'_',
                Token::Any => b'%',
            })
            .collect();
        f.write_str(&String::from_utf8_lossy(&bytes))
    }
}

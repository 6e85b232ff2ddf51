//! Signal values and the symbol alphabet a backend declares.
//!
//! Values travel as binary strings, most significant bit first, one
//! symbol per bit. Which symbols are legal is a backend capability:
//!
//! | Alphabet | Symbols | Notes |
//! |---|---|---|
//! | [`Alphabet::Binary`] | `0 1` | two-state engines |
//! | [`Alphabet::FourState`] | `0 1 x z` | `X`/`Z` accepted on write, stored lower-case |

use crate::error::{GpiError, GpiResult};

/// The set of symbols a backend uses in binary strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Alphabet {
    Binary,
    #[default]
    FourState,
}

impl Alphabet {
    /// Canonical symbols, in display order.
    pub fn symbols(self) -> &'static [char] {
        match self {
            Alphabet::Binary => &['0', '1'],
            Alphabet::FourState => &['0', '1', 'x', 'z'],
        }
    }

    /// Map an input symbol onto its canonical form, if it is legal.
    pub fn normalise(self, symbol: char) -> Option<char> {
        let c = symbol.to_ascii_lowercase();
        self.symbols().contains(&c).then_some(c)
    }

    /// The symbol used for a freshly created, never-driven value.
    pub fn initial_symbol(self) -> char {
        match self {
            Alphabet::Binary => '0',
            Alphabet::FourState => 'x',
        }
    }
}

impl std::fmt::Display for Alphabet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Alphabet::Binary => f.write_str("binary (01)"),
            Alphabet::FourState => f.write_str("four-state (01xz)"),
        }
    }
}

/// A value the host wants to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalValue {
    /// Two's-complement integer, truncated or sign-extended to the width.
    Int(i64),
    /// Binary string, MSB first; length must equal the width.
    BinStr(String),
}

impl SignalValue {
    /// Render into a canonical binary string of exactly `width` symbols.
    ///
    /// Fails without side effects on a length mismatch or an illegal
    /// symbol; `name` is only used for diagnostics.
    pub fn to_binstr(&self, name: &str, width: u32, alphabet: Alphabet) -> GpiResult<String> {
        match self {
            SignalValue::Int(v) => Ok(int_to_binstr(*v, width)),
            SignalValue::BinStr(s) => {
                let actual = s.chars().count();
                if actual != width as usize {
                    return Err(GpiError::WidthMismatch {
                        name: name.to_string(),
                        expected: width,
                        actual,
                    });
                }
                s.chars()
                    .map(|c| {
                        alphabet
                            .normalise(c)
                            .ok_or(GpiError::InvalidSymbol { symbol: c, alphabet })
                    })
                    .collect()
            }
        }
    }
}

impl From<i64> for SignalValue {
    fn from(v: i64) -> Self {
        SignalValue::Int(v)
    }
}

impl From<i32> for SignalValue {
    fn from(v: i32) -> Self {
        SignalValue::Int(v as i64)
    }
}

impl From<&str> for SignalValue {
    fn from(s: &str) -> Self {
        SignalValue::BinStr(s.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(s: String) -> Self {
        SignalValue::BinStr(s)
    }
}

fn int_to_binstr(v: i64, width: u32) -> String {
    (0..width)
        .rev()
        .map(|bit| {
            let set = if bit >= 64 { v < 0 } else { (v >> bit) & 1 == 1 };
            if set {
                '1'
            } else {
                '0'
            }
        })
        .collect()
}

/// Least significant symbol of a binary string.
pub(crate) fn lsb(binstr: &str) -> Option<char> {
    binstr.chars().last()
}

//! Conversion between cell values and file content
//!
//! Reads render the live value as text followed by a newline. Writes parse
//! the incoming bytes leniently, the way shell tools produce them: `echo 42`
//! sends `"42\n"`, `printf 42` sends `"42"`, and both must land the same value.

use crate::cell::{until_nul, CellError, IntCell, TextCell, VarRef};
use crate::config::OverflowPolicy;

/// Largest write payload interpreted by a single write call
pub const MAX_INPUT_LEN: usize = 255;

/// Errors raised while rendering or applying content
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("input of {len} bytes exceeds the {limit} byte limit")]
    Truncated { len: usize, limit: usize },
    #[error(transparent)]
    Cell(#[from] CellError),
    #[error("variable storage has been dropped")]
    Stale,
}

/// Render and parse behavior for one kind of cell
pub trait CellCodec {
    /// Current value as file content
    fn render(&self) -> Vec<u8>;

    /// Parse `input` and store the result in the cell
    fn apply(&mut self, input: &[u8]) -> Result<(), CellError>;
}

impl CellCodec for IntCell {
    fn render(&self) -> Vec<u8> {
        format!("{}\n", self.get()).into_bytes()
    }

    fn apply(&mut self, input: &[u8]) -> Result<(), CellError> {
        self.set(parse_int(input));
        Ok(())
    }
}

impl CellCodec for TextCell {
    fn render(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.as_bytes().len() + 1);
        out.extend_from_slice(self.as_bytes());
        out.push(b'\n');
        out
    }

    fn apply(&mut self, input: &[u8]) -> Result<(), CellError> {
        // Content ends at the first NUL, then one trailing newline goes
        let content = until_nul(input);
        let content = content.strip_suffix(b"\n").unwrap_or(content);
        self.replace(content)
    }
}

impl OverflowPolicy {
    /// Bound `input` to at most `limit` bytes according to the policy
    pub fn bound<'a>(&self, input: &'a [u8], limit: usize) -> Result<&'a [u8], CodecError> {
        if input.len() <= limit {
            return Ok(input);
        }
        match self {
            OverflowPolicy::Clip => Ok(&input[..limit]),
            OverflowPolicy::Reject => Err(CodecError::Truncated {
                len: input.len(),
                limit,
            }),
        }
    }
}

/// Render the current value of a registered variable
pub fn render(var: &VarRef) -> Result<Vec<u8>, CodecError> {
    var.with_codec(|cell| cell.render()).ok_or(CodecError::Stale)
}

/// Bound `input` to [`MAX_INPUT_LEN`], parse it, and store it into `var`
pub fn parse_and_apply(
    var: &VarRef,
    input: &[u8],
    policy: OverflowPolicy,
) -> Result<(), CodecError> {
    let bounded = policy.bound(input, MAX_INPUT_LEN)?;
    var.with_codec(|cell| cell.apply(bounded))
        .ok_or(CodecError::Stale)??;
    Ok(())
}

/// Parse a decimal integer with C `atoi` leniency.
///
/// Leading whitespace and one sign are accepted, digits are read up to the
/// first non-digit, and input without digits yields zero. Values outside the
/// `i64` range saturate.
pub fn parse_int(input: &[u8]) -> i64 {
    // \x0b is whitespace for C isspace but not for is_ascii_whitespace
    let start = input
        .iter()
        .position(|&b| !(b.is_ascii_whitespace() || b == 0x0b))
        .unwrap_or(input.len());
    let mut rest = &input[start..];

    let negative = match rest.first() {
        Some(b'-') => {
            rest = &rest[1..];
            true
        }
        Some(b'+') => {
            rest = &rest[1..];
            false
        }
        _ => false,
    };

    let mut value: i64 = 0;
    for &b in rest.iter().take_while(|b| b.is_ascii_digit()) {
        let digit = i64::from(b - b'0');
        value = value.saturating_mul(10);
        value = if negative {
            value.saturating_sub(digit)
        } else {
            value.saturating_add(digit)
        };
    }
    value
}

//! Token usage accounting.
//!
//! The runtime sums usage across steps but never interprets it further
//! (pricing, budgeting, and rate limiting are out of scope — see the
//! crate-level docs).

use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Token usage for a single LLM call, or an accumulation across many.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt.
    pub input_tokens: u64,
    /// Tokens produced by the model.
    pub output_tokens: u64,
}

impl Usage {
    /// A zero usage value, the identity for [`Add`].
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    /// Create a usage value from explicit counts.
    #[must_use]
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens (input + output).
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl Add for Usage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

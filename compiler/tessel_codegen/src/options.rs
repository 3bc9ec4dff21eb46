//! Per-run code generation options.

use crate::error::{CodegenError, CodegenResult};

/// Capacity growth policy for growable containers.
///
/// When an append finds the container full, the new reservation is
/// `⌊length · numerator / denominator⌋ + increment`, which is always
/// greater than `length`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GrowthPolicy {
    numerator: i64,
    denominator: i64,
    increment: i64,
}

impl GrowthPolicy {
    /// A policy that grows a full container by at least one slot.
    pub fn new(numerator: i64, denominator: i64, increment: i64) -> CodegenResult<Self> {
        if denominator <= 0 || numerator < denominator || increment < 1 {
            return Err(CodegenError::InvalidGrowthPolicy {
                numerator,
                denominator,
                increment,
            });
        }
        Ok(GrowthPolicy {
            numerator,
            denominator,
            increment,
        })
    }

    #[inline]
    pub fn numerator(&self) -> i64 {
        self.numerator
    }

    #[inline]
    pub fn denominator(&self) -> i64 {
        self.denominator
    }

    #[inline]
    pub fn increment(&self) -> i64 {
        self.increment
    }

    /// Capacity to reserve when a container of `length` elements is full.
    pub fn next_capacity(&self, length: i64) -> i64 {
        length * self.numerator / self.denominator + self.increment
    }
}

impl Default for GrowthPolicy {
    fn default() -> Self {
        GrowthPolicy {
            numerator: 5,
            denominator: 4,
            increment: 1,
        }
    }
}

/// Options owned by a [`Converter`](crate::Converter) for one compilation run.
#[derive(Clone, Debug)]
pub struct CodegenOptions {
    pub growth: GrowthPolicy,
    /// Check that conversions classified as always succeeding produce a
    /// constant `true` success flag.
    pub verify_always_conversions: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            growth: GrowthPolicy::default(),
            verify_always_conversions: true,
        }
    }
}

impl CodegenOptions {
    #[must_use]
    pub fn with_growth(mut self, growth: GrowthPolicy) -> Self {
        self.growth = growth;
        self
    }

    #[must_use]
    pub fn with_verify_always_conversions(mut self, verify: bool) -> Self {
        self.verify_always_conversions = verify;
        self
    }
}

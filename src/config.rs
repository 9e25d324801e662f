//! Compile-time and normalization bitsets (spec §6).
//!
//! The teacher has no compile-time flags of its own (MeTTa has none); this
//! closed set of independent boolean knobs is modeled the way the pack's
//! `messense-llvm-bitcode-rs` crate models LLVM bitcode flag fields, via
//! `bitflags`.

use bitflags::bitflags;

bitflags! {
    /// Flags a caller sets before [`crate::compiler::Compiler::compile`]
    /// (spec §6, "Compile-time configuration").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CompileFlags: u32 {
        /// Disable constant folding, identity/absorbing rewrites, and
        /// dead-branch elimination.
        const NO_OPTIMIZATION = 1 << 0;
        /// Allow `name()` where `name` resolves as an identifier.
        const ALLOW_EMPTY_PARENS_FOR_IDENTIFIER_FUNCTIONS = 1 << 1;
        /// Enable the `[...]` subscript operator dispatch.
        const ALLOW_SUBSCRIPT_OPERATOR = 1 << 2;
        /// Alias `&`/`|`/`~` to `&&`/`||`/`!` on boolean operands.
        const ALLOW_BITWISE_BOOLEAN_OPERATORS = 1 << 3;
        /// Treat `=` as `==`.
        const ALIAS_EQUALS_WITH_ASSIGN = 1 << 4;
        /// In `Expression(foo, ...)`, accept `foo` as a bare identifier
        /// naming an expression.
        const ALLOW_IDENTIFIERS_FOR_NESTED_EXPRESSIONS = 1 << 5;
        /// Lower constant-name `Expression(...)` and unary `*name` to
        /// direct subroutine calls at compile time.
        const ALLOW_COMPILE_TIME_NESTED_EXPRESSIONS = 1 << 6;
        /// Propagate raw plugin exceptions instead of wrapping them in
        /// `ExceptionInPlugin`.
        const PLUGIN_EXCEPTION_FALL_THROUGH = 1 << 7;
        /// Propagate raw callback exceptions instead of wrapping them in
        /// `ExceptionInCallback`.
        const CALLBACK_EXCEPTION_FALL_THROUGH = 1 << 8;
    }
}

impl Default for CompileFlags {
    fn default() -> Self {
        CompileFlags::empty()
    }
}

bitflags! {
    /// Flags controlling how the decompiler (§4.7/§4.8) renders a
    /// [`crate::ast::Ast`] back to text.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NormalizeFlags: u32 {
        const SPACE_AROUND_UNARY_OPERATORS = 1 << 0;
        const SPACE_AROUND_BINARY_OPERATORS = 1 << 1;
        const SPACE_AROUND_CONDITIONAL = 1 << 2;
        const SPACE_AFTER_FUNCTION_COMMA = 1 << 3;
        /// Keep brackets around an RHS operand even when its operator
        /// binds more strongly than the parent's (redundant but
        /// disambiguating to a human reader).
        const REDUNDANT_RHS_BRACKETS_IF_RHS_IS_STRONGER_BINARY_OP = 1 << 4;
        const REPLACE_VERBAL_OPERATORS_TO_SYMBOLIC = 1 << 5;
        const KEEP_SCIENTIFIC_NOTATION = 1 << 6;
        const GROUP_DIGITS = 1 << 7;
        const LOWERCASE_VERBAL_OPERATORS = 1 << 8;
        const UPPERCASE_VERBAL_OPERATORS = 1 << 9;
        const DEFINED_LETTER_CASE_VERBAL_OPERATORS = 1 << 10;
    }
}

impl Default for NormalizeFlags {
    fn default() -> Self {
        NormalizeFlags::SPACE_AROUND_BINARY_OPERATORS | NormalizeFlags::SPACE_AROUND_CONDITIONAL
    }
}

/// Resolved verbal-operator case policy, picked from whichever
/// replacement flags are set using the precedence spec §6 mandates:
/// `Symbolic > Lowercase > Uppercase > DefinedLetterCase > none`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbalCasePolicy {
    Symbolic,
    Lowercase,
    Uppercase,
    DefinedLetterCase,
    None,
}

impl NormalizeFlags {
    pub fn verbal_case_policy(self) -> VerbalCasePolicy {
        if self.contains(NormalizeFlags::REPLACE_VERBAL_OPERATORS_TO_SYMBOLIC) {
            VerbalCasePolicy::Symbolic
        } else if self.contains(NormalizeFlags::LOWERCASE_VERBAL_OPERATORS) {
            VerbalCasePolicy::Lowercase
        } else if self.contains(NormalizeFlags::UPPERCASE_VERBAL_OPERATORS) {
            VerbalCasePolicy::Uppercase
        } else if self.contains(NormalizeFlags::DEFINED_LETTER_CASE_VERBAL_OPERATORS) {
            VerbalCasePolicy::DefinedLetterCase
        } else {
            VerbalCasePolicy::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_picks_symbolic_over_everything() {
        let flags = NormalizeFlags::REPLACE_VERBAL_OPERATORS_TO_SYMBOLIC
            | NormalizeFlags::LOWERCASE_VERBAL_OPERATORS;
        assert_eq!(flags.verbal_case_policy(), VerbalCasePolicy::Symbolic);
    }

    #[test]
    fn precedence_picks_lowercase_over_uppercase() {
        let flags = NormalizeFlags::LOWERCASE_VERBAL_OPERATORS | NormalizeFlags::UPPERCASE_VERBAL_OPERATORS;
        assert_eq!(flags.verbal_case_policy(), VerbalCasePolicy::Lowercase);
    }

    #[test]
    fn no_flags_is_none() {
        assert_eq!(NormalizeFlags::empty().verbal_case_policy(), VerbalCasePolicy::None);
    }
}

//! Built-in plugin scaffolding (spec §1 carve-out: "arithmetic/string/
//! date-time built-in plugin implementations — specified only as
//! conformance requirements for plugins in general"). These are
//! conformance fixtures sufficient to exercise the Testable Properties and
//! Scenarios table (spec §8), not a product-grade math/string library —
//! each is built against the [`crate::plugin::Plugin`] trait exactly as a
//! third-party plugin would be, registered at [`crate::plugin::Priority`]
//! levels below [`crate::plugin::Priority::CUSTOM`] so a host's own plugins
//! always get first refusal.

mod arithmetic;
mod cast;
mod compare;
mod string;

pub use arithmetic::ArithmeticPlugin;
pub use cast::CastPlugin;
pub use compare::ComparePlugin;
pub use string::StringPlugin;

use std::sync::Arc;

use crate::compiler::Compiler;
use crate::plugin::Priority;

/// Install every built-in plugin on `compiler` at their fixed priorities
/// (spec §4.2: "the configured built-in plugins have fixed priorities so
/// that user plugins at 'Custom' priority take precedence over them").
/// Hosts that want a bare engine with no arithmetic/string/logical support
/// at all can skip this and call
/// [`crate::compiler::Compiler::install_plugin`] directly.
pub fn install_builtins(compiler: &mut Compiler) {
    compiler.install_plugin(Arc::new(CastPlugin), Priority::BUILTIN_CAST);
    compiler.install_plugin(Arc::new(ArithmeticPlugin::new()), Priority::BUILTIN_OPERATORS);
    compiler.install_plugin(Arc::new(ComparePlugin::new()), Priority::BUILTIN_OPERATORS);
    compiler.install_plugin(Arc::new(StringPlugin::new()), Priority::BUILTIN_OPERATORS);
}

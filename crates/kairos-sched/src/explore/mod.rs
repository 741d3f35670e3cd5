//! Exploration hook interface.
//!
//! An exploration engine (a symbolic executor or a randomized state-space
//! search) plugs into the queue engine through [`ExplorationHook`]. With
//! exploration enabled, every insert passes through [`perturb::Perturber`],
//! which binds the branch's symbolic delay and perturbs eligible transmit
//! events.

use std::collections::HashMap;

use rand::{Rng, SeedableRng, rngs::SmallRng};

pub mod coverage;
pub mod perturb;

/// Name of the single symbolic delay bound per exploration branch.
pub const SYMBOLIC_DELAY: &str = "Symbolic delay";

/// Primitives an exploration engine exposes to the queue engine.
pub trait ExplorationHook {
    /// Returns true if `name` is already bound to a symbolic value.
    fn is_symbolic(&self, name: &str) -> bool;

    /// Binds `name` to a symbolic value and returns the concrete value this
    /// branch runs with. `concrete` is the value the caller would use
    /// without exploration. Binding an already bound name returns the
    /// existing value.
    fn make_symbolic(&mut self, name: &str, concrete: u64) -> u64;

    /// Asks the engine to fork one branch per feasible value of the symbolic
    /// values used from now on.
    fn enable_forking(&mut self);

    /// Returns one concrete example of `value` for logging.
    fn concrete_example(&mut self, value: u64) -> u64;

    /// Ends the current exploration branch.
    fn terminate_branch(&mut self, reason: &str);

    /// Writes a line to the exploration trace.
    fn diagnostic(&mut self, message: &str);

    /// Publishes a named value for external inspection.
    fn expression(&mut self, name: &str, value: u64);

    /// Recorded activity, for hooks that keep one.
    fn trace(&self) -> Option<&ExplorationTrace> {
        None
    }
}

/// Hook for runs without exploration. Every symbolic value is its concrete
/// value.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

impl ExplorationHook for NoopHook {
    fn is_symbolic(&self, _name: &str) -> bool {
        false
    }

    fn make_symbolic(&mut self, _name: &str, concrete: u64) -> u64 {
        concrete
    }

    fn enable_forking(&mut self) {}

    fn concrete_example(&mut self, value: u64) -> u64 {
        value
    }

    fn terminate_branch(&mut self, _reason: &str) {}

    fn diagnostic(&mut self, _message: &str) {}

    fn expression(&mut self, _name: &str, _value: u64) {}
}

/// Everything a recording hook observed during one branch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExplorationTrace {
    pub bindings: HashMap<String, u64>,
    pub forks: u32,
    pub diagnostics: Vec<String>,
    pub expressions: Vec<(String, u64)>,
    pub terminated: Option<String>,
}

/// Deterministic stand-in for an exploration engine: each branch is one seed,
/// and each symbolic value is drawn uniformly from `0..=range`.
#[derive(Debug, Clone)]
pub struct SeededHook {
    rng: SmallRng,
    range: u64,
    trace: ExplorationTrace,
}

impl SeededHook {
    pub fn new(seed: u64, range: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            range,
            trace: ExplorationTrace::default(),
        }
    }

    /// Creates a hook whose symbolic values are fixed up front. Names not
    /// listed are drawn from the seed.
    pub fn with_bindings(seed: u64, range: u64, bindings: &[(&str, u64)]) -> Self {
        let mut hook = Self::new(seed, range);
        for &(name, value) in bindings {
            hook.trace.bindings.insert(name.to_string(), value);
        }
        hook
    }

    pub fn recorded(&self) -> &ExplorationTrace {
        &self.trace
    }
}

impl ExplorationHook for SeededHook {
    fn is_symbolic(&self, name: &str) -> bool {
        self.trace.bindings.contains_key(name)
    }

    fn make_symbolic(&mut self, name: &str, _concrete: u64) -> u64 {
        if let Some(&value) = self.trace.bindings.get(name) {
            return value;
        }
        let value = self.rng.gen_range(0..=self.range);
        self.trace.bindings.insert(name.to_string(), value);
        value
    }

    fn enable_forking(&mut self) {
        self.trace.forks += 1;
    }

    fn concrete_example(&mut self, value: u64) -> u64 {
        value
    }

    fn terminate_branch(&mut self, reason: &str) {
        self.trace.terminated = Some(reason.to_string());
    }

    fn diagnostic(&mut self, message: &str) {
        self.trace.diagnostics.push(message.to_string());
    }

    fn expression(&mut self, name: &str, value: u64) {
        self.trace.expressions.push((name.to_string(), value));
    }

    fn trace(&self) -> Option<&ExplorationTrace> {
        Some(&self.trace)
    }
}

//! Counterexamples produced by a failed check.
//!
//! A counterexample pairs the failing site with the trace of blocks the
//! solver's model walks through, the model itself, and the capture-state view
//! used to project per-state variable values. There are three kinds: a failed
//! assertion, a failed precondition at a call, and a failed postcondition at
//! a return.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use hprove_program::{Expr, Location};
use hprove_smt::Model;

use crate::modelview::ModelViewInfo;

/// The assertion that failed.
#[derive(Debug, Clone)]
pub struct FailingAssert {
    pub condition: Expr,
    pub loc: Location,
    /// Free-form error data attached to the assertion, used as the final
    /// comparison tiebreak.
    pub description: String,
}

/// The call whose precondition failed.
#[derive(Debug, Clone)]
pub struct FailingCall {
    pub callee: String,
    pub loc: Location,
}

/// The precondition that failed.
#[derive(Debug, Clone)]
pub struct FailingRequires {
    pub condition: Expr,
    pub loc: Location,
}

/// The return whose postcondition failed.
#[derive(Debug, Clone)]
pub struct FailingReturn {
    pub loc: Location,
}

/// The postcondition that failed.
#[derive(Debug, Clone)]
pub struct FailingEnsures {
    pub condition: Expr,
    pub loc: Location,
}

/// The three counterexample variants.
#[derive(Debug, Clone)]
pub enum CexKind {
    Assert(FailingAssert),
    Call {
        call: FailingCall,
        requires: FailingRequires,
    },
    Return {
        ret: FailingReturn,
        ensures: FailingEnsures,
    },
}

/// One counterexample: failing site, block trace, model, and projection info.
#[derive(Debug, Clone)]
pub struct Counterexample {
    pub kind: CexKind,
    /// Block labels in execution order.
    pub trace: Vec<String>,
    pub model: Option<Model>,
    pub model_view: Option<ModelViewInfo>,
    /// Counterexamples of failing callees, keyed by `(block, instruction)`.
    pub callee_counterexamples: BTreeMap<(usize, usize), Vec<Counterexample>>,
}

impl Counterexample {
    pub fn new(kind: CexKind, trace: Vec<String>) -> Self {
        Counterexample {
            kind,
            trace,
            model: None,
            model_view: None,
            callee_counterexamples: BTreeMap::new(),
        }
    }

    pub fn with_model(mut self, model: Model) -> Self {
        self.model = Some(model);
        self
    }

    /// The failing site packed as `line * 1000 + column`.
    pub fn location(&self) -> u64 {
        match &self.kind {
            CexKind::Assert(a) => a.loc.key(),
            CexKind::Call { call, .. } => call.loc.key(),
            CexKind::Return { ret, .. } => ret.loc.key(),
        }
    }

    /// The condition whose failure this counterexample witnesses.
    pub fn failing_condition(&self) -> &Expr {
        match &self.kind {
            CexKind::Assert(a) => &a.condition,
            CexKind::Call { requires, .. } => &requires.condition,
            CexKind::Return { ensures, .. } => &ensures.condition,
        }
    }

    fn assert_description(&self) -> &str {
        match &self.kind {
            CexKind::Assert(a) => &a.description,
            _ => "",
        }
    }
}

/// Total order: location first, then the block trace position by position,
/// then the assert error data. Equality follows the order, so ordered
/// containers are the right home for counterexamples.
impl Ord for Counterexample {
    fn cmp(&self, other: &Self) -> Ordering {
        self.location()
            .cmp(&other.location())
            .then_with(|| self.trace.cmp(&other.trace))
            .then_with(|| self.assert_description().cmp(other.assert_description()))
    }
}

impl PartialOrd for Counterexample {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Counterexample {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Counterexample {}

//! Candidate-invariant inference over annotated procedural programs.
//!
//! A program carries boolean *candidate constants* (marked `{:existential
//! true}`) guarding optional assertions and pre/post-conditions as `cand ==>
//! phi`. The engine starts from the assignment mapping every candidate to
//! true and repeatedly verifies implementations: counterexamples whose
//! failing condition is candidate-guarded refute that candidate, the flip is
//! propagated through the call graph, and the loop continues until the
//! greatest fixed point is reached. Candidates only ever flip true to false,
//! so termination is structural.

mod candidate;
mod checker;
mod counterexample;
mod engine;
mod modelview;
mod observer;
mod queue;

pub use candidate::{match_candidate, RefutationKind, RefutedAnnotation};
pub use checker::{
    CheckerFactory, GeneratedVc, HoudiniError, ImplementationChecker, ProverChecker, VcGen,
    VerifyResult,
};
pub use counterexample::{
    Counterexample, CexKind, FailingAssert, FailingCall, FailingEnsures, FailingRequires,
    FailingReturn,
};
pub use engine::{
    apply_assignment, Houdini, HoudiniConfig, HoudiniOutcome, HoudiniStatistics,
    ImplementationOutcome, NoSharing, RefutationSharing,
};
pub use modelview::{
    initialize_model_states, CaptureState, IdentityContext, IncarnationExpr, ModelState,
    ModelViewInfo, ProverContext, INITIAL_STATE,
};
pub use observer::{HoudiniObserver, ObserverHub, TracingObserver};
pub use queue::WorkQueue;

//! Model-state projection.
//!
//! VC generation records, per basic block, the *capture states*: points where
//! the mapping from source variables to their SSA incarnations is known.
//! Given a counterexample trace and the solver model, projection produces one
//! labeled model state per capture state reached before the failing command,
//! binding each source variable to the model element of its incarnation.

use indexmap::IndexMap;

use hprove_smt::{Model, ModelElement};

/// Label of the synthetic state holding initial variable values.
pub const INITIAL_STATE: &str = "<initial>";

/// Names of the universal type-redirection functions applied to the model
/// before projection.
const REDIRECTIONS: [&str; 2] = ["U_2_bool", "U_2_int"];

/// The incarnation expression of a variable at a capture state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncarnationExpr {
    /// A renamed variable; looked up in the model by its unique name.
    Ident(String),
    /// A literal; turned into a model element directly.
    Literal(String),
    /// Anything else; materialized as a fresh nullary constant named by its
    /// printed form.
    Other(String),
}

/// One capture state inside a block: its label, the index of the capture
/// command within the block, and the incarnation of each live variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureState {
    pub label: String,
    pub cmd_index: usize,
    pub incarnations: IndexMap<String, IncarnationExpr>,
}

/// Per-block capture states plus the ordered list of all program variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelViewInfo {
    pub all_variables: Vec<String>,
    /// Capture states per block label, in command order.
    pub block_states: IndexMap<String, Vec<CaptureState>>,
}

/// A named execution point with its projected variable values.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelState {
    pub label: String,
    pub bindings: IndexMap<String, ModelElement>,
}

/// Maps source variables to the mangled names the prover knows them by.
pub trait ProverContext {
    /// The unique (mangled) name of `var`, or `None` when the variable goes
    /// by its source name.
    fn unique_name(&self, var: &str) -> Option<String>;
}

/// A context for provers that do not mangle names.
pub struct IdentityContext;

impl ProverContext for IdentityContext {
    fn unique_name(&self, _var: &str) -> Option<String> {
        None
    }
}

/// Projects the model states of a counterexample trace.
///
/// The walk visits `trace` blocks in order and their capture states in
/// command order; in the final block only capture states strictly before
/// `failing_cmd_index` are included. Bindings unchanged from the previous
/// capture state are skipped.
pub fn initialize_model_states(
    model: &mut Model,
    view: &ModelViewInfo,
    trace: &[String],
    failing_cmd_index: usize,
    ctx: &dyn ProverContext,
) -> Vec<ModelState> {
    for func in REDIRECTIONS {
        model.redirect_through(func);
    }

    let mut states = Vec::new();

    // Initial state: every program variable bound through its unique name.
    // Variables the model has no value for get a fresh uninterpreted one.
    let mut initial = ModelState {
        label: INITIAL_STATE.to_string(),
        bindings: IndexMap::new(),
    };
    for var in &view.all_variables {
        let incarnation = IncarnationExpr::Ident(var.clone());
        let value = resolve_incarnation(model, &incarnation, ctx);
        initial.bindings.insert(var.clone(), value);
    }
    states.push(initial);

    let mut previous: IndexMap<String, IncarnationExpr> = IndexMap::new();
    let last = trace.len().saturating_sub(1);
    for (i, label) in trace.iter().enumerate() {
        let Some(captures) = view.block_states.get(label) else {
            continue;
        };
        for capture in captures {
            if i == last && capture.cmd_index >= failing_cmd_index {
                break;
            }
            let mut state = ModelState {
                label: capture.label.clone(),
                bindings: IndexMap::new(),
            };
            for (var, incarnation) in &capture.incarnations {
                if previous.get(var) == Some(incarnation) {
                    continue;
                }
                previous.insert(var.clone(), incarnation.clone());
                let element = resolve_incarnation(model, incarnation, ctx);
                state.bindings.insert(var.clone(), element);
            }
            states.push(state);
        }
    }

    states
}

/// Maps one incarnation expression to a model element, materializing fresh
/// constants for expressions the model has no name for.
fn resolve_incarnation(
    model: &mut Model,
    incarnation: &IncarnationExpr,
    ctx: &dyn ProverContext,
) -> ModelElement {
    match incarnation {
        IncarnationExpr::Ident(name) => {
            let unique = ctx.unique_name(name).unwrap_or_else(|| name.clone());
            match model.const_value(&unique) {
                Some(value) => value.clone(),
                None => {
                    let fresh = ModelElement::Uninterpreted(unique.clone());
                    model.add_const(unique, fresh.clone());
                    fresh
                }
            }
        }
        IncarnationExpr::Literal(text) => Model::mk_element(text),
        IncarnationExpr::Other(text) => {
            if let Some(value) = model.const_value(text) {
                return value.clone();
            }
            let fresh = ModelElement::Uninterpreted(text.clone());
            model.add_const(text.clone(), fresh.clone());
            fresh
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hprove_sexp::parse_sexprs;

    fn model_of(text: &str) -> Model {
        Model::parse(&parse_sexprs(text).unwrap()[0]).unwrap()
    }

    fn capture(
        label: &str,
        cmd_index: usize,
        incarnations: &[(&str, IncarnationExpr)],
    ) -> CaptureState {
        CaptureState {
            label: label.to_string(),
            cmd_index,
            incarnations: incarnations
                .iter()
                .map(|(v, e)| (v.to_string(), e.clone()))
                .collect(),
        }
    }

    #[test]
    fn initial_state_binds_known_variables() {
        let mut model = model_of("(model (define-fun x@0 () Int 5))");
        let view = ModelViewInfo {
            all_variables: vec!["x".to_string(), "y".to_string()],
            block_states: IndexMap::new(),
        };
        struct Mangling;
        impl ProverContext for Mangling {
            fn unique_name(&self, var: &str) -> Option<String> {
                Some(format!("{var}@0"))
            }
        }

        let states = initialize_model_states(&mut model, &view, &[], 0, &Mangling);
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].label, INITIAL_STATE);
        assert_eq!(states[0].bindings.get("x"), Some(&ModelElement::Int(5)));
        // y has no model value and gets a fresh element under its unique name.
        assert_eq!(
            states[0].bindings.get("y"),
            Some(&ModelElement::Uninterpreted("y@0".to_string()))
        );
    }

    #[test]
    fn capture_states_follow_the_trace_and_stop_at_the_failing_command() {
        let mut model = model_of(
            "(model (define-fun x!1 () Int 1) (define-fun x!2 () Int 2))",
        );
        let mut block_states = IndexMap::new();
        block_states.insert(
            "entry".to_string(),
            vec![capture(
                "entry_state",
                0,
                &[("x", IncarnationExpr::Ident("x!1".to_string()))],
            )],
        );
        block_states.insert(
            "exit".to_string(),
            vec![
                capture(
                    "before",
                    1,
                    &[("x", IncarnationExpr::Ident("x!2".to_string()))],
                ),
                capture(
                    "after",
                    5,
                    &[("x", IncarnationExpr::Ident("x!3".to_string()))],
                ),
            ],
        );
        let view = ModelViewInfo {
            all_variables: vec!["x".to_string()],
            block_states,
        };

        let trace = vec!["entry".to_string(), "exit".to_string()];
        // The failing command sits at index 3 of the last block: the capture
        // at index 5 is dropped, the one at index 1 is kept.
        let states =
            initialize_model_states(&mut model, &view, &trace, 3, &IdentityContext);
        let labels: Vec<&str> = states.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec![INITIAL_STATE, "entry_state", "before"]);
        assert_eq!(
            states[2].bindings.get("x"),
            Some(&ModelElement::Int(2))
        );
    }

    #[test]
    fn unchanged_incarnations_are_skipped() {
        let mut model = model_of("(model (define-fun x!1 () Int 1))");
        let same = IncarnationExpr::Ident("x!1".to_string());
        let mut block_states = IndexMap::new();
        block_states.insert(
            "entry".to_string(),
            vec![
                capture("first", 0, &[("x", same.clone())]),
                capture("second", 1, &[("x", same.clone())]),
            ],
        );
        let view = ModelViewInfo {
            all_variables: vec!["x".to_string()],
            block_states,
        };

        let trace = vec!["entry".to_string()];
        let states =
            initialize_model_states(&mut model, &view, &trace, 10, &IdentityContext);
        assert_eq!(states[1].bindings.len(), 1);
        // Same incarnation as the previous state: no binding repeated.
        assert_eq!(states[2].bindings.len(), 0);
    }

    #[test]
    fn literal_and_other_incarnations() {
        let mut model = model_of("(model)");
        let mut block_states = IndexMap::new();
        block_states.insert(
            "entry".to_string(),
            vec![capture(
                "s",
                0,
                &[
                    ("a", IncarnationExpr::Literal("7".to_string())),
                    ("b", IncarnationExpr::Other("(+ x 1)".to_string())),
                ],
            )],
        );
        let view = ModelViewInfo {
            all_variables: vec![],
            block_states,
        };

        let trace = vec!["entry".to_string()];
        let states =
            initialize_model_states(&mut model, &view, &trace, 10, &IdentityContext);
        assert_eq!(states[1].bindings.get("a"), Some(&ModelElement::Int(7)));
        assert_eq!(
            states[1].bindings.get("b"),
            Some(&ModelElement::Uninterpreted("(+ x 1)".to_string()))
        );
        // The fresh constant is now part of the model.
        assert!(model.has_func("(+ x 1)"));
    }

    #[test]
    fn universal_redirections_apply_before_binding() {
        let mut model = model_of(
            "(model\n\
              (define-fun U_2_int ((u!0 U)) Int (ite (= u!0 uv) 9 0))\n\
              (define-fun x!1 () U uv))",
        );
        let mut block_states = IndexMap::new();
        block_states.insert(
            "entry".to_string(),
            vec![capture(
                "s",
                0,
                &[("x", IncarnationExpr::Ident("x!1".to_string()))],
            )],
        );
        let view = ModelViewInfo {
            all_variables: vec![],
            block_states,
        };

        let trace = vec!["entry".to_string()];
        let states =
            initialize_model_states(&mut model, &view, &trace, 10, &IdentityContext);
        assert_eq!(states[1].bindings.get("x"), Some(&ModelElement::Int(9)));
    }
}

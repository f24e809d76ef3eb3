//! SMT model representation.
//!
//! A `(get-model)` reply is a sequence of `define-fun` forms. Functions are
//! kept as finite tables (condition rows from `ite` chains plus an else
//! value); constants are nullary functions. This is enough for the two model
//! consumers: control-flow path extraction and counterexample state
//! projection.

use indexmap::IndexMap;

use hprove_sexp::SExpr;

use crate::SolverError;

/// A value in a solver model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelElement {
    Int(i64),
    Bool(bool),
    /// A datatype value `(constructor arg*)`.
    DataValue {
        constructor: String,
        args: Vec<ModelElement>,
    },
    /// Anything else, kept by its printed form.
    Uninterpreted(String),
}

impl ModelElement {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ModelElement::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ModelElement::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModelElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelElement::Int(n) => write!(f, "{n}"),
            ModelElement::Bool(b) => write!(f, "{b}"),
            ModelElement::DataValue { constructor, args } => {
                if args.is_empty() {
                    write!(f, "{constructor}")
                } else {
                    write!(f, "({constructor}")?;
                    for a in args {
                        write!(f, " {a}")?;
                    }
                    write!(f, ")")
                }
            }
            ModelElement::Uninterpreted(s) => write!(f, "{s}"),
        }
    }
}

/// One model function: a finite argument table and an optional else branch.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFunc {
    pub name: String,
    pub arity: usize,
    pub entries: Vec<(Vec<ModelElement>, ModelElement)>,
    pub else_value: Option<ModelElement>,
}

impl ModelFunc {
    /// Table lookup, falling back to the else branch.
    pub fn apply(&self, args: &[ModelElement]) -> Option<&ModelElement> {
        self.entries
            .iter()
            .find(|(params, _)| params.as_slice() == args)
            .map(|(_, v)| v)
            .or(self.else_value.as_ref())
    }
}

/// A parsed solver model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    funcs: IndexMap<String, ModelFunc>,
}

impl Model {
    /// Parses a `(model ...)` reply (or the bare define-fun list some
    /// solvers return).
    pub fn parse(resp: &SExpr) -> Result<Model, SolverError> {
        let mut model = Model::default();
        let defs: &[SExpr] = if resp.name() == "model" || resp.name().is_empty() {
            resp.args()
        } else if resp.name() == "define-fun" {
            std::slice::from_ref(resp)
        } else {
            return Err(SolverError::UnexpectedReply(format!(
                "not a model: {resp}"
            )));
        };
        for def in defs {
            if def.name() != "define-fun" {
                // Models can carry forall cardinality hints; skip them.
                continue;
            }
            let func = parse_define_fun(def)?;
            model.funcs.insert(func.name.clone(), func);
        }
        Ok(model)
    }

    pub fn func(&self, name: &str) -> Option<&ModelFunc> {
        self.funcs.get(name)
    }

    pub fn has_func(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    /// Evaluates `name(args)` against the function table.
    pub fn eval_app(&self, name: &str, args: &[ModelElement]) -> Option<ModelElement> {
        self.func(name).and_then(|f| f.apply(args)).cloned()
    }

    /// The value of a nullary function.
    pub fn const_value(&self, name: &str) -> Option<&ModelElement> {
        self.func(name)
            .filter(|f| f.arity == 0)
            .and_then(|f| f.else_value.as_ref())
    }

    /// Binds a fresh nullary constant, used for synthesized incarnation
    /// elements during state projection.
    pub fn add_const(&mut self, name: impl Into<String>, value: ModelElement) {
        let name = name.into();
        self.funcs.insert(
            name.clone(),
            ModelFunc {
                name,
                arity: 0,
                entries: Vec::new(),
                else_value: Some(value),
            },
        );
    }

    /// Builds an element from literal text: integer, boolean, or an
    /// uninterpreted carrier of the original spelling.
    pub fn mk_element(text: &str) -> ModelElement {
        if let Ok(n) = text.parse::<i64>() {
            return ModelElement::Int(n);
        }
        match text {
            "true" => ModelElement::Bool(true),
            "false" => ModelElement::Bool(false),
            _ => ModelElement::Uninterpreted(text.to_string()),
        }
    }

    /// Universal redirection: if `name` is defined with arity 1, substitute
    /// every occurrence of each entry's argument with that entry's result,
    /// across the whole model.
    pub fn redirect_through(&mut self, name: &str) {
        let Some(func) = self.funcs.get(name) else {
            return;
        };
        if func.arity != 1 {
            return;
        }
        let substitutions: Vec<(ModelElement, ModelElement)> = func
            .entries
            .iter()
            .filter(|(params, _)| params.len() == 1)
            .map(|(params, result)| (params[0].clone(), result.clone()))
            .collect();
        for func in self.funcs.values_mut() {
            for (params, result) in &mut func.entries {
                for p in params.iter_mut() {
                    substitute(p, &substitutions);
                }
                substitute(result, &substitutions);
            }
            if let Some(else_value) = &mut func.else_value {
                substitute(else_value, &substitutions);
            }
        }
    }
}

fn substitute(element: &mut ModelElement, substitutions: &[(ModelElement, ModelElement)]) {
    for (from, to) in substitutions {
        if element == from {
            *element = to.clone();
            return;
        }
    }
    if let ModelElement::DataValue { args, .. } = element {
        for a in args {
            substitute(a, substitutions);
        }
    }
}

/// Parses `(define-fun name ((p sort)*) sort body)`.
fn parse_define_fun(def: &SExpr) -> Result<ModelFunc, SolverError> {
    let bad = |msg: &str| SolverError::UnexpectedReply(format!("{msg}: {def}"));

    let name = def
        .arg(0)
        .filter(|a| a.is_id())
        .ok_or_else(|| bad("define-fun without a name"))?
        .name()
        .to_string();
    let params = def.arg(1).ok_or_else(|| bad("define-fun without params"))?;
    let body = def.arg(3).ok_or_else(|| bad("define-fun without body"))?;

    // Parameter positions by name, so `ite` conditions can be matched up.
    let param_names: Vec<String> = if params.is_id() && params.name().is_empty() {
        Vec::new()
    } else {
        params
            .args()
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    };
    let arity = param_names.len();

    let mut entries = Vec::new();
    let else_value = parse_body(body, &param_names, &mut entries)?;
    Ok(ModelFunc {
        name,
        arity,
        entries,
        else_value: Some(else_value),
    })
}

/// Unfolds an `ite` chain into table rows, returning the final else value.
fn parse_body(
    body: &SExpr,
    params: &[String],
    entries: &mut Vec<(Vec<ModelElement>, ModelElement)>,
) -> Result<ModelElement, SolverError> {
    if body.name() == "ite" {
        if let [cond, then_value, else_branch] = body.args() {
            let row = parse_condition(cond, params)?;
            entries.push((row, parse_value(then_value)));
            return parse_body(else_branch, params, entries);
        }
    }
    Ok(parse_value(body))
}

/// Parses `(= p v)` or `(and (= p v)+)` into one argument row.
fn parse_condition(
    cond: &SExpr,
    params: &[String],
) -> Result<Vec<ModelElement>, SolverError> {
    let mut row: Vec<Option<ModelElement>> = vec![None; params.len()];
    let eqs: Vec<&SExpr> = if cond.name() == "and" {
        cond.args().iter().collect()
    } else {
        vec![cond]
    };
    for eq in eqs {
        let [lhs, rhs] = eq.args() else {
            return Err(SolverError::UnexpectedReply(format!(
                "unrecognized model condition: {cond}"
            )));
        };
        if eq.name() != "=" {
            return Err(SolverError::UnexpectedReply(format!(
                "unrecognized model condition: {cond}"
            )));
        }
        let position = params.iter().position(|p| lhs.is_atom(p));
        match position {
            Some(i) => row[i] = Some(parse_value(rhs)),
            None => {
                return Err(SolverError::UnexpectedReply(format!(
                    "condition on unknown parameter: {eq}"
                )))
            }
        }
    }
    row.into_iter()
        .map(|slot| {
            slot.ok_or_else(|| {
                SolverError::UnexpectedReply(format!(
                    "incomplete model condition: {cond}"
                ))
            })
        })
        .collect()
}

fn parse_value(value: &SExpr) -> ModelElement {
    if value.is_id() {
        return Model::mk_element(value.name());
    }
    if value.name() == "-" && value.args().len() == 1 {
        if let Some(n) = value.as_i64() {
            return ModelElement::Int(n);
        }
    }
    ModelElement::DataValue {
        constructor: value.name().to_string(),
        args: value.args().iter().map(parse_value).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hprove_sexp::parse_sexprs;

    fn model_of(text: &str) -> Model {
        let sexprs = parse_sexprs(text).expect("parse");
        Model::parse(&sexprs[0]).expect("model")
    }

    #[test]
    fn constants_and_negatives() {
        let m = model_of(
            "(model (define-fun c () Bool true)\n\
             (define-fun n () Int (- 5)))",
        );
        assert_eq!(m.const_value("c"), Some(&ModelElement::Bool(true)));
        assert_eq!(m.const_value("n"), Some(&ModelElement::Int(-5)));
        assert!(!m.has_func("missing"));
    }

    #[test]
    fn ite_chain_becomes_a_table() {
        let m = model_of(
            "(model (define-fun f ((x!0 Int)) Int\n\
               (ite (= x!0 0) 10 (ite (= x!0 1) 11 99))))",
        );
        let f = m.func("f").unwrap();
        assert_eq!(f.arity, 1);
        assert_eq!(f.entries.len(), 2);
        assert_eq!(
            m.eval_app("f", &[ModelElement::Int(0)]),
            Some(ModelElement::Int(10))
        );
        assert_eq!(
            m.eval_app("f", &[ModelElement::Int(7)]),
            Some(ModelElement::Int(99))
        );
    }

    #[test]
    fn binary_function_with_and_conditions() {
        let m = model_of(
            "(model (define-fun g ((x!0 Int) (x!1 Int)) Int\n\
               (ite (and (= x!0 1) (= x!1 2)) 42 0)))",
        );
        assert_eq!(
            m.eval_app("g", &[ModelElement::Int(1), ModelElement::Int(2)]),
            Some(ModelElement::Int(42))
        );
        assert_eq!(
            m.eval_app("g", &[ModelElement::Int(2), ModelElement::Int(1)]),
            Some(ModelElement::Int(0))
        );
    }

    #[test]
    fn datatype_values() {
        let m = model_of(
            "(model (define-fun f ((x!0 Int)) T (ite (= x!0 7) (dt Block42) (dt None))))",
        );
        let v = m.eval_app("f", &[ModelElement::Int(7)]).unwrap();
        assert_eq!(
            v,
            ModelElement::DataValue {
                constructor: "dt".to_string(),
                args: vec![ModelElement::Uninterpreted("Block42".to_string())],
            }
        );
    }

    #[test]
    fn universal_redirection_substitutes_globally() {
        let m_text = "(model\n\
              (define-fun U_2_int ((x!0 U)) Int (ite (= x!0 u7) 7 0))\n\
              (define-fun v () U u7))";
        let mut m = model_of(m_text);
        m.redirect_through("U_2_int");
        assert_eq!(m.const_value("v"), Some(&ModelElement::Int(7)));
    }

    #[test]
    fn redirection_ignores_wrong_arity() {
        let mut m = model_of("(model (define-fun f ((a Int) (b Int)) Int 0))");
        let before = m.clone();
        m.redirect_through("f");
        assert_eq!(m, before);
    }

    #[test]
    fn mk_element_parses_literals() {
        assert_eq!(Model::mk_element("42"), ModelElement::Int(42));
        assert_eq!(Model::mk_element("-3"), ModelElement::Int(-3));
        assert_eq!(Model::mk_element("true"), ModelElement::Bool(true));
        assert_eq!(
            Model::mk_element("Block42"),
            ModelElement::Uninterpreted("Block42".to_string())
        );
    }
}

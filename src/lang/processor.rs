//! Lowers parsed pair trees into `model::Task` values, linking names and
//! rejecting constructs the diagnoser does not support.

use std::collections::{HashMap, HashSet};

use pest::iterators::Pair;

use crate::{
    lang::{
        parser::{self, Rule},
        LangError,
    },
    model::{
        ActionSchema, Effect, Literal, ModelError, PredicateDecl, Task, TypeDef, TypedObject,
    },
};

/// Builds a task from a domain description and a problem description.
pub fn task_from_strs(domain_text: &str, problem_text: &str) -> Result<Task, LangError> {
    let domain = process_domain(domain_text)?;
    let problem = process_problem(problem_text)?;
    link(domain, problem)
}

struct DomainParts {
    name: String,
    requirements: Vec<String>,
    types: Vec<TypeDef>,
    constants: Vec<TypedObject>,
    predicates: Vec<PredicateDecl>,
    actions: Vec<ActionSchema>,
}

struct ProblemParts {
    name: String,
    domain_ref: String,
    objects: Vec<TypedObject>,
    init: Vec<Literal>,
    goal: Vec<Literal>,
}

fn only_child(pair: Pair<'_, Rule>) -> Result<Pair<'_, Rule>, LangError> {
    let rule = pair.as_rule();
    pair.into_inner()
        .next()
        .ok_or_else(|| LangError::Semantic(format!("empty {:?} node", rule)))
}

fn process_domain(input: &str) -> Result<DomainParts, LangError> {
    let mut pairs = parser::parse_domain(input)?;
    let root = pairs
        .next()
        .ok_or_else(|| LangError::Semantic("empty domain description".to_string()))?;
    let mut parts = DomainParts {
        name: String::new(),
        requirements: Vec::new(),
        types: Vec::new(),
        constants: Vec::new(),
        predicates: Vec::new(),
        actions: Vec::new(),
    };
    for p in root.into_inner() {
        match p.as_rule() {
            Rule::name => parts.name = p.as_str().to_string(),
            Rule::require_def => {
                parts.requirements = p.into_inner().map(|k| k.as_str().to_string()).collect();
            }
            Rule::types_def => parts.types = process_type_defs(only_child(p)?)?,
            Rule::constants_def => parts.constants = process_typed_list(only_child(p)?),
            Rule::predicates_def => {
                for decl in p.into_inner() {
                    let mut inner = decl.into_inner();
                    let name = inner
                        .next()
                        .ok_or_else(|| LangError::Semantic("unnamed predicate".to_string()))?
                        .as_str()
                        .to_string();
                    let parameters = match inner.next() {
                        Some(list) => process_typed_list(list),
                        None => Vec::new(),
                    };
                    if parts.predicates.iter().any(|d| d.name == name) {
                        return Err(ModelError::Duplicate(name).into());
                    }
                    parts.predicates.push(PredicateDecl { name, parameters });
                }
            }
            Rule::functions_def => {} // tolerated, only total-cost bookkeeping
            Rule::action_def => {
                let action = process_action(p)?;
                if parts.actions.iter().any(|a| a.name == action.name) {
                    return Err(ModelError::Duplicate(action.name).into());
                }
                parts.actions.push(action);
            }
            Rule::EOI => {}
            other => {
                return Err(LangError::Semantic(format!(
                    "unexpected {:?} in domain description",
                    other
                )))
            }
        }
    }
    Ok(parts)
}

fn process_problem(input: &str) -> Result<ProblemParts, LangError> {
    let mut pairs = parser::parse_problem(input)?;
    let root = pairs
        .next()
        .ok_or_else(|| LangError::Semantic("empty problem description".to_string()))?;
    let mut parts = ProblemParts {
        name: String::new(),
        domain_ref: String::new(),
        objects: Vec::new(),
        init: Vec::new(),
        goal: Vec::new(),
    };
    let mut names_seen = 0;
    for p in root.into_inner() {
        match p.as_rule() {
            Rule::name => {
                if names_seen == 0 {
                    parts.name = p.as_str().to_string();
                } else {
                    parts.domain_ref = p.as_str().to_string();
                }
                names_seen += 1;
            }
            Rule::require_def => {}
            Rule::objects_def => parts.objects = process_typed_list(only_child(p)?),
            Rule::init_def => {
                for el in p.into_inner() {
                    match el.as_rule() {
                        Rule::atom => parts.init.push(process_atom(el)?),
                        Rule::fluent_init => {} // (= (total-cost) 0) and friends
                        other => {
                            return Err(LangError::Semantic(format!(
                                "unexpected {:?} in :init",
                                other
                            )))
                        }
                    }
                }
            }
            Rule::goal_def => parts.goal = process_condition(only_child(p)?)?,
            Rule::metric_def => {}
            Rule::EOI => {}
            other => {
                return Err(LangError::Semantic(format!(
                    "unexpected {:?} in problem description",
                    other
                )))
            }
        }
    }
    Ok(parts)
}

/// `a b - t c` becomes `[a: t, b: t, c: object]`. Works over both object and
/// variable lists; the grammar guarantees homogeneity.
fn process_typed_list(pair: Pair<'_, Rule>) -> Vec<TypedObject> {
    let mut out = Vec::new();
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::typed_group | Rule::typed_var_group => {
                let mut items: Vec<String> =
                    p.into_inner().map(|n| n.as_str().to_string()).collect();
                // The grammar puts the group's type last.
                let ty = items.pop().unwrap_or_else(|| "object".to_string());
                out.extend(items.into_iter().map(|name| TypedObject { name, ty: ty.clone() }));
            }
            Rule::name | Rule::variable => {
                out.push(TypedObject::new(p.as_str(), "object"));
            }
            _ => {}
        }
    }
    out
}

fn process_type_defs(pair: Pair<'_, Rule>) -> Result<Vec<TypeDef>, LangError> {
    let mut out = Vec::new();
    for obj in process_typed_list(pair) {
        if out.iter().any(|t: &TypeDef| t.name == obj.name) {
            return Err(ModelError::Duplicate(obj.name).into());
        }
        out.push(TypeDef {
            name: obj.name,
            basetype: Some(obj.ty),
        });
    }
    Ok(out)
}

fn process_atom(pair: Pair<'_, Rule>) -> Result<Literal, LangError> {
    let mut inner = pair.into_inner();
    let predicate = inner
        .next()
        .ok_or_else(|| LangError::Semantic("atom without a predicate".to_string()))?
        .as_str()
        .to_string();
    let args = inner.map(|t| t.as_str().to_string()).collect();
    Ok(Literal {
        predicate,
        args,
        negated: false,
    })
}

fn process_literal(pair: Pair<'_, Rule>) -> Result<Literal, LangError> {
    let inner = only_child(pair)?;
    match inner.as_rule() {
        Rule::atom => process_atom(inner),
        Rule::neg_literal => Ok(process_atom(only_child(inner)?)?.negate()),
        other => Err(LangError::Semantic(format!(
            "unexpected {:?} where a literal was expected",
            other
        ))),
    }
}

fn unsupported_keyword(pair: Pair<'_, Rule>) -> LangError {
    let kw = pair
        .into_inner()
        .next()
        .map(|k| k.as_str().to_string())
        .unwrap_or_default();
    ModelError::UnsupportedFeature(kw).into()
}

/// Flattens a (possibly nested) conjunction into a list of literals.
fn process_condition(pair: Pair<'_, Rule>) -> Result<Vec<Literal>, LangError> {
    let inner = only_child(pair)?;
    match inner.as_rule() {
        Rule::literal => Ok(vec![process_literal(inner)?]),
        Rule::conj => {
            let mut lits = Vec::new();
            for c in inner.into_inner() {
                lits.extend(process_condition(c)?);
            }
            Ok(lits)
        }
        Rule::unsupported => Err(unsupported_keyword(inner)),
        other => Err(LangError::Semantic(format!(
            "unexpected {:?} in condition",
            other
        ))),
    }
}

fn process_action(pair: Pair<'_, Rule>) -> Result<ActionSchema, LangError> {
    let mut name = String::new();
    let mut parameters = Vec::new();
    let mut precondition = Vec::new();
    let mut effects = Vec::new();
    let mut cost = None;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::name => name = p.as_str().to_string(),
            Rule::typed_var_list => parameters = process_typed_list(p),
            Rule::precondition_sec => precondition = process_condition(only_child(p)?)?,
            Rule::effect_sec => {
                let effect = only_child(only_child(p)?)?;
                let items: Vec<Pair<'_, Rule>> = match effect.as_rule() {
                    Rule::eff_conj => effect.into_inner().collect(),
                    _ => vec![effect],
                };
                for item in items {
                    match item.as_rule() {
                        Rule::literal => effects.push(Effect::new(process_literal(item)?)),
                        Rule::cost_effect => {
                            let n = only_child(item)?;
                            cost = n.as_str().parse::<f64>().ok();
                        }
                        Rule::unsupported => return Err(unsupported_keyword(item)),
                        other => {
                            return Err(LangError::Semantic(format!(
                                "unexpected {:?} in effect",
                                other
                            )))
                        }
                    }
                }
            }
            other => {
                return Err(LangError::Semantic(format!(
                    "unexpected {:?} in action definition",
                    other
                )))
            }
        }
    }
    Ok(ActionSchema {
        name,
        parameters,
        precondition,
        effects,
        cost,
    })
}

/// Joins domain and problem parts into a task, closing the type hierarchy
/// and checking that every name resolves.
fn link(domain: DomainParts, problem: ProblemParts) -> Result<Task, LangError> {
    if !problem.domain_ref.is_empty() && problem.domain_ref != domain.name {
        return Err(LangError::Semantic(format!(
            "problem {} references domain {}, not {}",
            problem.name, problem.domain_ref, domain.name
        )));
    }

    let mut types = domain.types;
    let declared: HashSet<String> = types.iter().map(|t| t.name.clone()).collect();
    let bases: Vec<String> = types.iter().filter_map(|t| t.basetype.clone()).collect();
    for base in bases {
        if base != "object" && !declared.contains(&base) {
            types.push(TypeDef {
                name: base,
                basetype: Some("object".to_string()),
            });
        }
    }
    if !types.iter().any(|t| t.name == "object") {
        types.push(TypeDef {
            name: "object".to_string(),
            basetype: None,
        });
    }

    let type_names: HashSet<&str> = types.iter().map(|t| t.name.as_str()).collect();
    let mut objects = problem.objects;
    objects.extend(domain.constants.iter().cloned());
    for obj in objects.iter().chain(domain.constants.iter()) {
        if !type_names.contains(obj.ty.as_str()) {
            return Err(ModelError::UnknownType(obj.ty.clone(), obj.name.clone()).into());
        }
    }
    for action in &domain.actions {
        for param in &action.parameters {
            if !type_names.contains(param.ty.as_str()) {
                return Err(ModelError::UnknownType(param.ty.clone(), param.name.clone()).into());
            }
        }
    }

    let predicates: HashMap<&str, usize> = domain
        .predicates
        .iter()
        .map(|d| (d.name.as_str(), d.parameters.len()))
        .collect();
    let constants: HashSet<&str> = domain.constants.iter().map(|c| c.name.as_str()).collect();
    for action in &domain.actions {
        let params: HashSet<&str> = action.parameters.iter().map(|p| p.name.as_str()).collect();
        let literals = action
            .precondition
            .iter()
            .chain(action.effects.iter().map(|e| &e.literal));
        for lit in literals {
            check_arity(&predicates, lit)?;
            for arg in &lit.args {
                let bound = if arg.starts_with('?') {
                    params.contains(arg.as_str())
                } else {
                    constants.contains(arg.as_str())
                };
                if !bound {
                    return Err(
                        ModelError::UnboundName(arg.clone(), action.name.clone()).into()
                    );
                }
            }
        }
    }

    let object_names: HashSet<&str> = objects.iter().map(|o| o.name.as_str()).collect();
    for lit in problem.init.iter().chain(problem.goal.iter()) {
        check_arity(&predicates, lit)?;
        for arg in &lit.args {
            if !object_names.contains(arg.as_str()) {
                return Err(ModelError::UnknownObject(arg.clone()).into());
            }
        }
    }

    Ok(Task {
        domain_name: domain.name,
        problem_name: problem.name,
        requirements: domain.requirements,
        types,
        constants: domain.constants,
        objects,
        predicates: domain.predicates,
        actions: domain.actions,
        init: problem.init,
        goal: problem.goal,
    })
}

fn check_arity(predicates: &HashMap<&str, usize>, lit: &Literal) -> Result<(), ModelError> {
    match predicates.get(lit.predicate.as_str()) {
        None => Err(ModelError::UnknownPredicate(lit.predicate.clone())),
        Some(&arity) if arity != lit.args.len() => Err(ModelError::PredicateArity(
            lit.predicate.clone(),
            arity,
            lit.args.len(),
        )),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::fixtures;

    #[test]
    fn processes_the_fixture_domain() {
        let task = fixtures::snack_task();
        assert_eq!(task.domain_name, "snack");
        assert_eq!(task.problem_name, "snack-1");
        assert_eq!(task.actions.len(), 4);
        assert_eq!(task.constants.len(), 1);
        assert!(task.object("kitchen").is_some(), "constants merge into objects");

        let serve = task.action("serve").expect("serve exists");
        assert_eq!(serve.parameters.len(), 4);
        assert_eq!(serve.precondition.len(), 3);
        assert_eq!(serve.effects.len(), 2);
        assert!(serve.effects[0].literal.negated);
        assert_eq!(
            serve.effects[1].literal,
            Literal::positive("served", ["?c"])
        );

        let graph = task.type_graph();
        assert!(graph.is_subtype("tray", "object"));
    }

    #[test]
    fn rejects_quantified_preconditions() {
        let domain = "(define (domain bad)\n\
            (:predicates (p ?x))\n\
            (:action a :parameters (?x)\n\
              :precondition (forall (?y) (p ?y))\n\
              :effect (p ?x)))";
        let problem = "(define (problem b) (:domain bad) (:init) (:goal (and)))";
        match task_from_strs(domain, problem) {
            Err(LangError::Model(ModelError::UnsupportedFeature(kw))) => {
                assert_eq!(kw, "forall")
            }
            other => panic!("expected unsupported-feature error, got {:?}", other.err()),
        }
    }

    #[test]
    fn rejects_unbound_and_unknown_names() {
        let domain = "(define (domain bad)\n\
            (:predicates (p ?x))\n\
            (:action a :parameters (?x) :precondition (p ?z) :effect (p ?x)))";
        let problem = "(define (problem b) (:domain bad) (:init) (:goal (and)))";
        assert!(matches!(
            task_from_strs(domain, problem),
            Err(LangError::Model(ModelError::UnboundName(..)))
        ));

        let domain = "(define (domain bad)\n\
            (:predicates (p ?x))\n\
            (:action a :parameters (?x) :precondition (q ?x) :effect (p ?x)))";
        assert!(matches!(
            task_from_strs(domain, problem),
            Err(LangError::Model(ModelError::UnknownPredicate(..)))
        ));
    }

    #[test]
    fn domain_pddl_round_trips() {
        let task = fixtures::snack_task();
        let reparsed = task_from_strs(&task.domain_pddl(), fixtures::SNACK_PROBLEM)
            .expect("re-parse of serialized domain");
        assert_eq!(reparsed.actions, task.actions);
        assert_eq!(reparsed.constants, task.constants);
    }
}

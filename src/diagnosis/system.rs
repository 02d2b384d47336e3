//! Trace replay and backward conflict extraction.
//!
//! A [`TraceSystem`] pairs one task with one grounded trace. Checking a
//! candidate replays the trace under the candidate's edits and reports the
//! first violated condition; conflict extraction turns that witness into the
//! set of alternative repairs that could explain the violation away.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use log::trace;

use crate::{
    diagnosis::{Component, ComponentKind, DiagnosisError},
    lang::PlanStep,
    model::{ActionSchema, Literal, ModelError, Task, TypeGraph, TypedObject},
};

/// A tentative set of repair components under test.
pub type Candidate = HashSet<Component>;

/// A set of components of which at least one (subject to condition markers)
/// must be added to the enclosing candidate. Sorted canonically so component
/// interning — and with it the search's tie-breaking — is reproducible.
pub type Conflict = Vec<Component>;

/// Binding of one step's parameter and constant names to concrete objects.
pub type Substitution = HashMap<String, TypedObject>;

/// A failed check: the first unsatisfied ground literal and the step it
/// blocked. `step == trace.len()` means the goal check failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub atom: Literal,
    pub step: usize,
}

/// Outcome of replaying a trace under a candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Witness {
    Consistent,
    Violated(Violation),
}

impl Witness {
    pub fn is_consistent(&self) -> bool {
        matches!(self, Witness::Consistent)
    }
}

struct Step {
    action: usize,
    substitution: Substitution,
}

/// One task plus one grounded trace, with substitutions precomputed and
/// validated up front.
pub struct TraceSystem {
    task: Task,
    type_graph: TypeGraph,
    object_types: HashMap<String, String>,
    steps: Vec<Step>,
}

impl TraceSystem {
    /// Grounds every plan step against the task's schemas. Arity mismatches
    /// and ill-typed argument bindings abort immediately.
    pub fn new(task: Task, plan: &[PlanStep]) -> Result<Self, DiagnosisError> {
        let type_graph = task.type_graph();
        let object_types: HashMap<String, String> = task
            .objects
            .iter()
            .map(|o| (o.name.clone(), o.ty.clone()))
            .collect();
        let mut steps = Vec::with_capacity(plan.len());
        for (idx, ps) in plan.iter().enumerate() {
            let (action, schema) = task
                .actions
                .iter()
                .enumerate()
                .find(|(_, a)| a.name == ps.action)
                .ok_or_else(|| ModelError::UnknownAction(ps.action.clone()))?;
            if schema.parameters.len() != ps.args.len() {
                return Err(DiagnosisError::ArgumentCount {
                    step: idx,
                    action: ps.action.clone(),
                    expected: schema.parameters.len(),
                    found: ps.args.len(),
                });
            }
            let mut substitution = Substitution::new();
            for (param, arg) in schema.parameters.iter().zip(&ps.args) {
                let obj = task
                    .object(arg)
                    .ok_or_else(|| ModelError::UnknownObject(arg.clone()))?;
                if !type_graph.is_subtype(&obj.ty, &param.ty) {
                    return Err(DiagnosisError::ParameterBinding {
                        step: idx,
                        action: ps.action.clone(),
                        object: arg.clone(),
                        found: obj.ty.clone(),
                        param: param.name.clone(),
                        expected: param.ty.clone(),
                    });
                }
                substitution.insert(param.name.clone(), obj.clone());
            }
            for c in &task.constants {
                substitution.insert(c.name.clone(), c.clone());
            }
            steps.push(Step {
                action,
                substitution,
            });
        }
        Ok(Self {
            task,
            type_graph,
            object_types,
            steps,
        })
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn trace_len(&self) -> usize {
        self.steps.len()
    }

    fn group_components<'a>(candidate: &'a Candidate) -> HashMap<&'a str, Vec<&'a Component>> {
        let mut groups: HashMap<&str, Vec<&Component>> = HashMap::new();
        for comp in candidate {
            groups.entry(comp.action.as_str()).or_default().push(comp);
        }
        groups
    }

    /// The step's schema with all candidate components targeting it applied.
    /// Order among them is irrelevant: the edits commute.
    fn repaired_schema(
        &self,
        step: &Step,
        groups: &HashMap<&str, Vec<&Component>>,
    ) -> ActionSchema {
        let schema = &self.task.actions[step.action];
        match groups.get(schema.name.as_str()) {
            Some(comps) => comps.iter().fold(schema.clone(), |s, c| c.apply(&s)),
            None => schema.clone(),
        }
    }

    /// Grounds a lifted literal's arguments, dropping polarity.
    fn ground(
        &self,
        literal: &Literal,
        substitution: &Substitution,
        action: &str,
    ) -> Result<Literal, DiagnosisError> {
        let args = literal
            .args
            .iter()
            .map(|a| {
                substitution
                    .get(a)
                    .map(|o| o.name.clone())
                    .ok_or_else(|| ModelError::UnboundName(a.clone(), action.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Literal {
            predicate: literal.predicate.clone(),
            args,
            negated: false,
        })
    }

    /// The first precondition literal violated in `state`, grounded, with the
    /// literal's polarity preserved.
    fn unsatisfied_precondition(
        &self,
        schema: &ActionSchema,
        substitution: &Substitution,
        state: &HashSet<Literal>,
    ) -> Result<Option<Literal>, DiagnosisError> {
        for literal in &schema.precondition {
            let ground = self.ground(literal, substitution, &schema.name)?;
            if !literal.negated && !state.contains(&ground) {
                return Ok(Some(ground));
            }
            if literal.negated && state.contains(&ground) {
                return Ok(Some(ground.negate()));
            }
        }
        Ok(None)
    }

    /// Delete-then-add; an added atom survives a same-step delete.
    fn apply_effects(
        &self,
        schema: &ActionSchema,
        substitution: &Substitution,
        state: &mut HashSet<Literal>,
    ) -> Result<(), DiagnosisError> {
        let mut adds = HashSet::new();
        let mut dels = HashSet::new();
        for eff in &schema.effects {
            if !eff.parameters.is_empty() {
                return Err(ModelError::ConditionalEffect(schema.name.clone()).into());
            }
            let ground = self.ground(&eff.literal, substitution, &schema.name)?;
            if eff.literal.negated {
                dels.insert(ground);
            } else {
                adds.insert(ground);
            }
        }
        for d in &dels {
            state.remove(d);
        }
        for a in adds {
            state.insert(a);
        }
        Ok(())
    }

    /// Replays the trace under the candidate's edits. Pure: equal inputs
    /// yield identical witnesses.
    pub fn check(&self, candidate: &Candidate) -> Result<Witness, DiagnosisError> {
        let groups = Self::group_components(candidate);
        let mut state: HashSet<Literal> = self.task.init.iter().cloned().collect();
        for (idx, step) in self.steps.iter().enumerate() {
            let schema = self.repaired_schema(step, &groups);
            if let Some(atom) = self.unsatisfied_precondition(&schema, &step.substitution, &state)?
            {
                trace!("step {} ({}): {} unsatisfied", idx, schema.name, atom);
                return Ok(Witness::Violated(Violation { atom, step: idx }));
            }
            self.apply_effects(&schema, &step.substitution, &mut state)?;
        }
        for literal in &self.task.goal {
            let ground = Literal::positive(literal.predicate.clone(), literal.args.clone());
            if state.contains(&ground) == literal.negated {
                trace!("goal literal {} unsatisfied", literal);
                return Ok(Witness::Violated(Violation {
                    atom: literal.clone(),
                    step: self.steps.len(),
                }));
            }
        }
        Ok(Witness::Consistent)
    }

    /// Lifted literals among `literals` whose grounding (polarity included)
    /// equals `atom`.
    fn matching_literals(
        &self,
        literals: &[Literal],
        substitution: &Substitution,
        atom: &Literal,
        action: &str,
    ) -> Result<HashSet<Literal>, DiagnosisError> {
        let mut out = HashSet::new();
        for literal in literals {
            let mut target = self.ground(literal, substitution, action)?;
            if literal.negated {
                target = target.negate();
            }
            if &target == atom {
                out.insert(literal.clone());
            }
        }
        Ok(out)
    }

    fn matching_precondition(
        &self,
        schema: &ActionSchema,
        substitution: &Substitution,
        atom: &Literal,
    ) -> Result<HashSet<Literal>, DiagnosisError> {
        self.matching_literals(&schema.precondition, substitution, atom, &schema.name)
    }

    /// Positive forms of delete-effects whose grounding equals `atom`.
    fn matching_delete_effects(
        &self,
        schema: &ActionSchema,
        substitution: &Substitution,
        atom: &Literal,
    ) -> Result<HashSet<Literal>, DiagnosisError> {
        let dels: Vec<Literal> = schema
            .effects
            .iter()
            .filter(|e| e.literal.negated)
            .map(|e| e.literal.negate())
            .collect();
        self.matching_literals(&dels, substitution, atom, &schema.name)
    }

    /// Positive effect literals whose grounding equals `atom`.
    fn matching_positive_effects(
        &self,
        schema: &ActionSchema,
        substitution: &Substitution,
        atom: &Literal,
    ) -> Result<HashSet<Literal>, DiagnosisError> {
        let adds: Vec<Literal> = schema
            .effects
            .iter()
            .filter(|e| !e.literal.negated)
            .map(|e| e.literal.clone())
            .collect();
        self.matching_literals(&adds, substitution, atom, &schema.name)
    }

    /// Reverse matching: every lifted atom over the schema's parameters (or
    /// the step's bound constants) that the substitution grounds to exactly
    /// `atom`, i.e. every way this schema could be edited to establish it.
    fn matching_establishers(
        &self,
        schema: &ActionSchema,
        substitution: &Substitution,
        atom: &Literal,
    ) -> Result<HashSet<Literal>, DiagnosisError> {
        debug_assert!(!atom.negated, "establisher matching runs on positive form");
        let mut choices: Vec<Vec<String>> = Vec::with_capacity(atom.args.len());
        for obj in &atom.args {
            let obj_ty = self
                .object_types
                .get(obj)
                .ok_or_else(|| ModelError::UnknownObject(obj.clone()))?;
            let mut names: Vec<String> = schema
                .parameters
                .iter()
                .filter(|p| self.type_graph.is_subtype(obj_ty, &p.ty))
                .map(|p| p.name.clone())
                .collect();
            if substitution.contains_key(obj) {
                names.push(obj.clone());
            }
            if names.is_empty() {
                return Ok(HashSet::new());
            }
            choices.push(names);
        }
        let mut out = HashSet::new();
        if choices.is_empty() {
            // 0-ary predicate: the lifted form is the atom itself.
            out.insert(atom.clone());
            return Ok(out);
        }
        for combo in choices.iter().map(|c| c.iter()).multi_cartesian_product() {
            let mut grounded = Vec::with_capacity(combo.len());
            for name in &combo {
                let obj = substitution.get(*name).ok_or_else(|| {
                    ModelError::UnboundName((*name).clone(), schema.name.clone())
                })?;
                grounded.push(obj.name.as_str());
            }
            if grounded.iter().zip(&atom.args).all(|(g, a)| *g == a.as_str()) {
                out.insert(Literal::positive(
                    atom.predicate.clone(),
                    combo.into_iter().cloned(),
                ));
            }
        }
        Ok(out)
    }

    /// Derives a conflict from a failed check: the set of components of which
    /// at least one must join the candidate before it can become a diagnosis.
    pub fn find_conflict(
        &self,
        candidate: &Candidate,
        violation: &Violation,
    ) -> Result<Conflict, DiagnosisError> {
        let atom = &violation.atom;
        let idx = violation.step;
        assert!(idx <= self.steps.len(), "witness step out of range");
        let groups = Self::group_components(candidate);
        let mut conflict: HashSet<Component> = HashSet::new();

        // Local fixes: drop the blocking condition. Not available when the
        // goal itself failed.
        if idx < self.steps.len() {
            let step = &self.steps[idx];
            let schema = self.repaired_schema(step, &groups);
            for lifted in self.matching_precondition(&schema, &step.substitution, atom)? {
                conflict.insert(Component::remove_precondition(schema.name.clone(), lifted));
            }
        }

        for i in (0..idx).rev() {
            let step = &self.steps[i];
            let schema = self.repaired_schema(step, &groups);

            // Effects this step could gain to establish the atom.
            let add_atoms: HashSet<Literal> = if !atom.negated {
                self.matching_establishers(&schema, &step.substitution, atom)?
            } else {
                self.matching_establishers(&schema, &step.substitution, &atom.negate())?
                    .into_iter()
                    .map(|a| a.negate())
                    .collect()
            };
            let mut has_negated_choice = false;
            for lifted in add_atoms {
                let comp = Component::add_effect(schema.name.clone(), lifted);
                if comp.negate().iter().any(|n| candidate.contains(n)) {
                    has_negated_choice = true;
                }
                conflict.insert(comp);
            }

            // Effects this step could lose to stop destroying the atom. An
            // explicit delete is the definitive culprit: record it and stop
            // scanning further back.
            let del_atoms: Vec<Literal> = if !atom.negated {
                self.matching_delete_effects(&schema, &step.substitution, atom)?
                    .into_iter()
                    .map(|a| a.negate())
                    .collect()
            } else {
                self.matching_positive_effects(&schema, &step.substitution, &atom.negate())?
                    .into_iter()
                    .collect()
            };
            if !del_atoms.is_empty() {
                for lifted in del_atoms {
                    conflict.insert(Component::remove_effect(schema.name.clone(), lifted));
                }
                break;
            }
            // Once a proposed establisher contradicts the current candidate,
            // no earlier step can help either.
            if has_negated_choice {
                break;
            }
        }

        // Self-consistency merge: a component cannot be required present and
        // absent in the same diagnosis. Where the conflict demands the
        // negation of a chosen component, replace that member with a
        // condition-marked copy of the component itself.
        let mut cached: HashSet<Component> = HashSet::new();
        for comp in candidate {
            if comp.kind == ComponentKind::RemovePrecondition {
                continue;
            }
            for neg in comp.negate() {
                if conflict.contains(&neg) {
                    let marked = comp.conditional();
                    conflict.remove(&neg);
                    conflict.replace(marked.clone());
                    cached.insert(marked);
                }
            }
        }
        for comp in candidate {
            if conflict.contains(comp) && !cached.contains(comp) {
                conflict.remove(comp);
            }
        }

        let mut out: Conflict = conflict.into_iter().collect();
        out.sort();
        Ok(out)
    }
}

/// Several trace systems sharing one domain. A candidate is a diagnosis only
/// if every trace checks out.
pub struct System {
    systems: Vec<TraceSystem>,
}

impl System {
    pub fn new(systems: Vec<TraceSystem>) -> Result<Self, DiagnosisError> {
        if systems.is_empty() {
            return Err(DiagnosisError::NoTraces);
        }
        Ok(Self { systems })
    }

    pub fn single(system: TraceSystem) -> Self {
        Self {
            systems: vec![system],
        }
    }

    pub fn systems(&self) -> &[TraceSystem] {
        &self.systems
    }

    pub fn task(&self) -> &Task {
        self.systems[0].task()
    }

    pub fn check(&self, candidate: &Candidate) -> Result<Vec<Witness>, DiagnosisError> {
        self.systems.iter().map(|s| s.check(candidate)).collect()
    }

    /// One conflict per currently-failing trace.
    pub fn find_conflicts(
        &self,
        candidate: &Candidate,
        witnesses: &[Witness],
    ) -> Result<Vec<(Violation, Conflict)>, DiagnosisError> {
        let mut out = Vec::new();
        for (system, witness) in self.systems.iter().zip(witnesses) {
            if let Witness::Violated(violation) = witness {
                let conflict = system.find_conflict(candidate, violation)?;
                out.push((violation.clone(), conflict));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::fixtures;

    fn system_with(mutate: impl FnOnce(&mut Task)) -> TraceSystem {
        let mut task = fixtures::snack_task();
        mutate(&mut task);
        TraceSystem::new(task, &fixtures::snack_plan()).expect("trace grounds")
    }

    fn drop_effect(task: &mut Task, action: &str, predicate: &str) {
        let schema = task
            .actions
            .iter_mut()
            .find(|a| a.name == action)
            .expect("action exists");
        schema
            .effects
            .retain(|e| e.literal.predicate != predicate);
    }

    #[test]
    fn valid_plan_is_consistent_without_repairs() {
        let system = system_with(|_| {});
        assert_eq!(system.check(&Candidate::new()).unwrap(), Witness::Consistent);
    }

    #[test]
    fn arity_mismatch_is_rejected_up_front() {
        let task = fixtures::snack_task();
        let plan = crate::lang::parse_plan("(make s1 t1)");
        assert!(matches!(
            TraceSystem::new(task, &plan),
            Err(DiagnosisError::ArgumentCount { step: 0, .. })
        ));
    }

    #[test]
    fn ill_typed_binding_is_rejected_up_front() {
        let task = fixtures::snack_task();
        let plan = crate::lang::parse_plan("(make t1)");
        assert!(matches!(
            TraceSystem::new(task, &plan),
            Err(DiagnosisError::ParameterBinding { step: 0, .. })
        ));
    }

    #[test]
    fn missing_effect_yields_a_precise_witness() {
        let system = system_with(|task| drop_effect(task, "move", "at"));
        // move no longer re-establishes at; serve blocks on (at t1 table).
        let witness = system.check(&Candidate::new()).unwrap();
        assert_eq!(
            witness,
            Witness::Violated(Violation {
                atom: Literal::positive("at", ["t1", "table"]),
                step: 3,
            })
        );
    }

    #[test]
    fn check_is_deterministic() {
        let system = system_with(|task| drop_effect(task, "move", "at"));
        let candidate: Candidate =
            [Component::remove_precondition("serve", Literal::positive("at", ["?t", "?p"]))]
                .into_iter()
                .collect();
        assert_eq!(
            system.check(&candidate).unwrap(),
            system.check(&candidate).unwrap()
        );
    }

    #[test]
    fn repaired_candidate_passes_the_check() {
        let system = system_with(|task| drop_effect(task, "move", "at"));
        let candidate: Candidate =
            [Component::add_effect("move", Literal::positive("at", ["?t", "?p2"]))]
                .into_iter()
                .collect();
        assert_eq!(system.check(&candidate).unwrap(), Witness::Consistent);
    }

    #[test]
    fn establisher_matching_crosses_parameters_and_constants() {
        let system = system_with(|_| {});
        let empty = Candidate::new();
        let groups = TraceSystem::group_components(&empty);
        let step = &system.steps[2]; // move t1 kitchen table
        let schema = system.repaired_schema(step, &groups);

        let found = system
            .matching_establishers(&schema, &step.substitution, &Literal::positive("at", ["t1", "table"]))
            .unwrap();
        let expected: HashSet<Literal> = [Literal::positive("at", ["?t", "?p2"])]
            .into_iter()
            .collect();
        assert_eq!(found, expected);

        // kitchen is reachable both through the place parameters and as a
        // substitution-bound constant.
        let found = system
            .matching_establishers(&schema, &step.substitution, &Literal::positive("at", ["t1", "kitchen"]))
            .unwrap();
        let expected: HashSet<Literal> = [
            Literal::positive("at", ["?t", "?p1"]),
            Literal::positive("at", ["?t", "kitchen"]),
        ]
        .into_iter()
        .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn conflict_offers_local_and_establishing_repairs() {
        let system = system_with(|task| drop_effect(task, "move", "at"));
        let witness = system.check(&Candidate::new()).unwrap();
        let Witness::Violated(violation) = witness else {
            panic!("expected violation")
        };
        let conflict = system.find_conflict(&Candidate::new(), &violation).unwrap();
        let expected = vec![
            Component::remove_precondition("serve", Literal::positive("at", ["?t", "?p"])),
            Component::add_effect("move", Literal::positive("at", ["?t", "?p2"])),
        ];
        assert_eq!(conflict, expected);
    }

    // Every conflict element strictly advances the witness, or repairs the
    // trace outright.
    #[test]
    fn conflict_elements_are_never_noops() {
        let system = system_with(|task| drop_effect(task, "move", "at"));
        let candidate = Candidate::new();
        let Witness::Violated(violation) = system.check(&candidate).unwrap() else {
            panic!("expected violation")
        };
        for comp in system.find_conflict(&candidate, &violation).unwrap() {
            let mut extended = candidate.clone();
            extended.insert(comp.clone());
            match system.check(&extended).unwrap() {
                Witness::Consistent => {}
                Witness::Violated(v) => assert!(
                    v.step > violation.step,
                    "{} did not advance past step {}",
                    comp,
                    violation.step
                ),
            }
        }
    }

    #[test]
    fn delete_effect_culprit_stops_the_backward_scan() {
        // move destroys (at ?t ?p1); a goal requiring (at t1 kitchen) makes
        // that delete the definitive culprit.
        let mut task = fixtures::snack_task();
        task.goal.push(Literal::positive("at", ["t1", "kitchen"]));
        let system = TraceSystem::new(task, &fixtures::snack_plan()).unwrap();
        let Witness::Violated(violation) = system.check(&Candidate::new()).unwrap() else {
            panic!("expected violation")
        };
        assert_eq!(violation.step, system.trace_len());
        let conflict = system.find_conflict(&Candidate::new(), &violation).unwrap();
        assert!(
            conflict.contains(&Component::remove_effect(
                "move",
                Literal::negative("at", ["?t", "?p1"])
            )),
            "missing stop-deleting repair in {:?}",
            conflict
        );
        // The scan stopped at move: the establisher offered by put-on-tray's
        // earlier step is not reached.
        assert!(conflict
            .iter()
            .all(|c| c.action != "put-on-tray" && c.action != "make"));
    }

    #[test]
    fn contradicting_component_is_marked_conditional() {
        let system = system_with(|_| {});
        let candidate: Candidate =
            [Component::add_effect("move", Literal::negative("at", ["?t", "?p2"]))]
                .into_iter()
                .collect();
        // Pretend the goal needed (at t1 table); the candidate's added
        // delete-effect contradicts every way of restoring it.
        let violation = Violation {
            atom: Literal::positive("at", ["t1", "table"]),
            step: system.trace_len(),
        };
        let conflict = system.find_conflict(&candidate, &violation).unwrap();
        let marked: Vec<&Component> = conflict.iter().filter(|c| c.condition).collect();
        assert_eq!(marked.len(), 1);
        assert_eq!(
            marked[0],
            &Component::add_effect("move", Literal::negative("at", ["?t", "?p2"]))
        );
        // Neither half of the contradiction survives unmarked.
        assert!(!conflict.contains(&Component::remove_effect(
            "move",
            Literal::negative("at", ["?t", "?p2"])
        )) || marked[0].condition);
        let unmarked_add = conflict
            .iter()
            .any(|c| !c.condition && c.atom == Literal::positive("at", ["?t", "?p2"]));
        assert!(!unmarked_add, "dual add survived unmarked: {:?}", conflict);
    }
}

//! The outer diagnosis loop: hitting-set search refined by conflicts.

use std::collections::HashMap;

use log::debug;

use crate::{
    diagnosis::{
        system::{Candidate, System, Witness},
        Component, ComponentKind, DiagnosisError,
    },
    hitter::Hitter,
};

/// Per-kind element weights for the hitting-set search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ComponentWeights {
    pub remove_precondition: f64,
    pub add_effect: f64,
    pub remove_effect: f64,
}

impl Default for ComponentWeights {
    fn default() -> Self {
        Self {
            remove_precondition: 1.0,
            add_effect: 1.0,
            remove_effect: 1.0,
        }
    }
}

impl ComponentWeights {
    fn of(&self, kind: ComponentKind) -> f64 {
        match kind {
            ComponentKind::RemovePrecondition => self.remove_precondition,
            ComponentKind::AddEffect => self.add_effect,
            ComponentKind::RemoveEffect => self.remove_effect,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct DiagnoserConfig {
    pub weights: ComponentWeights,
}

/// Drives the refinement loop over one or more traces sharing a domain:
/// query the engine for the cheapest candidate, check it, and on failure
/// register one extracted conflict per failing trace.
pub struct Diagnoser {
    system: System,
    config: DiagnoserConfig,
    hitter: Hitter,
    comp_to_id: HashMap<Component, i64>,
    /// Components by `id - 1`; ids are 1-based so a negated id can encode a
    /// condition-marked conflict member.
    id_to_comp: Vec<Component>,
    /// Positional weights mirrored into the engine; slot 0 is unused.
    weights: Vec<f64>,
}

impl Diagnoser {
    pub fn new(system: System, config: DiagnoserConfig) -> Self {
        Self {
            system,
            config,
            hitter: Hitter::new(),
            comp_to_id: HashMap::new(),
            id_to_comp: Vec::new(),
            weights: vec![1.0],
        }
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    /// The engine id for a component, assigned on first sight.
    fn intern(&mut self, comp: &Component) -> i64 {
        if let Some(&id) = self.comp_to_id.get(comp) {
            return id;
        }
        let id = self.id_to_comp.len() as i64 + 1;
        let mut plain = comp.clone();
        plain.condition = false;
        debug!("component {} interned as {}", plain, id);
        self.comp_to_id.insert(plain.clone(), id);
        self.id_to_comp.push(plain);
        self.weights.push(self.config.weights.of(comp.kind));
        self.hitter.set_weights(self.weights.clone());
        id
    }

    fn materialize(&self, ids: impl IntoIterator<Item = i64>) -> Candidate {
        ids.into_iter()
            .map(|id| self.id_to_comp[(id - 1) as usize].clone())
            .collect()
    }

    /// Finds the cheapest candidate that makes every trace consistent. Seed
    /// components are forced into every candidate via unit conflicts. Runs
    /// until a diagnosis is found; bounding the call in time or memory is the
    /// caller's concern.
    pub fn diagnose(&mut self, seed: &Candidate) -> Result<Candidate, DiagnosisError> {
        let mut seeds: Vec<&Component> = seed.iter().collect();
        seeds.sort();
        for comp in seeds {
            let id = self.intern(comp);
            self.hitter.add_conflict(vec![id]);
        }
        let mut rounds = 0u64;
        loop {
            rounds += 1;
            let ids = self.hitter.top().ok_or(DiagnosisError::SearchExhausted)?;
            let candidate = self.materialize(ids.iter().copied());
            let witnesses = self.system.check(&candidate)?;
            if witnesses.iter().all(Witness::is_consistent) {
                debug!(
                    "diagnosis with {} components after {} rounds",
                    candidate.len(),
                    rounds
                );
                return Ok(candidate);
            }
            let conflicts = self.system.find_conflicts(&candidate, &witnesses)?;
            for (violation, conflict) in conflicts {
                if conflict.is_empty() {
                    return Err(DiagnosisError::Unrepairable {
                        atom: violation.atom,
                        step: violation.step,
                    });
                }
                let ids: Vec<i64> = conflict
                    .iter()
                    .map(|c| {
                        let id = self.intern(c);
                        if c.condition {
                            -id
                        } else {
                            id
                        }
                    })
                    .collect();
                self.hitter.add_conflict(ids);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        diagnosis::TraceSystem,
        fixtures,
        model::{Literal, Task},
    };

    fn diagnoser_for(mutate: impl FnOnce(&mut Task)) -> Diagnoser {
        let mut task = fixtures::snack_task();
        mutate(&mut task);
        let system = TraceSystem::new(task, &fixtures::snack_plan()).expect("trace grounds");
        Diagnoser::new(System::single(system), DiagnoserConfig::default())
    }

    #[test]
    fn consistent_trace_needs_no_repairs() {
        let mut diagnoser = diagnoser_for(|_| {});
        let diagnosis = diagnoser.diagnose(&Candidate::new()).unwrap();
        assert!(diagnosis.is_empty());
    }

    // A deleted positive effect is repaired by exactly the component that
    // restores it.
    #[test]
    fn deleted_effect_is_restored() {
        let mut diagnoser = diagnoser_for(|task| {
            let serve = task
                .actions
                .iter_mut()
                .find(|a| a.name == "serve")
                .unwrap();
            serve.effects.retain(|e| e.literal.predicate != "served");
        });
        let diagnosis = diagnoser.diagnose(&Candidate::new()).unwrap();
        let expected: Candidate =
            [Component::add_effect("serve", Literal::positive("served", ["?c"]))]
                .into_iter()
                .collect();
        assert_eq!(diagnosis, expected);
    }

    // A precondition no step can satisfy is repaired by exactly its removal.
    #[test]
    fn unsatisfiable_precondition_is_removed() {
        let mut diagnoser = diagnoser_for(|task| {
            let serve = task
                .actions
                .iter_mut()
                .find(|a| a.name == "serve")
                .unwrap();
            serve
                .precondition
                .push(Literal::positive("served", ["?c"]));
        });
        let diagnosis = diagnoser.diagnose(&Candidate::new()).unwrap();
        let expected: Candidate = [Component::remove_precondition(
            "serve",
            Literal::positive("served", ["?c"]),
        )]
        .into_iter()
        .collect();
        assert_eq!(diagnosis, expected);
    }

    // Acceptance is sound: replaying the trace under the returned diagnosis
    // is consistent.
    #[test]
    fn accepted_diagnosis_replays_cleanly() {
        let mut diagnoser = diagnoser_for(|task| {
            let mov = task.actions.iter_mut().find(|a| a.name == "move").unwrap();
            mov.effects.retain(|e| e.literal.negated);
        });
        let diagnosis = diagnoser.diagnose(&Candidate::new()).unwrap();
        for witness in diagnoser.system().check(&diagnosis).unwrap() {
            assert_eq!(witness, Witness::Consistent);
        }
    }

    #[test]
    fn seed_components_appear_in_the_diagnosis() {
        let seed: Candidate =
            [Component::add_effect("move", Literal::positive("at", ["?t", "kitchen"]))]
                .into_iter()
                .collect();
        let mut diagnoser = diagnoser_for(|_| {});
        let diagnosis = diagnoser.diagnose(&seed).unwrap();
        assert_eq!(diagnosis, seed);
    }

    #[test]
    fn batched_traces_must_all_pass() {
        let mutate = |task: &mut Task| {
            let serve = task
                .actions
                .iter_mut()
                .find(|a| a.name == "serve")
                .unwrap();
            serve.effects.retain(|e| e.literal.predicate != "served");
        };
        let mut task_1 = fixtures::snack_task();
        mutate(&mut task_1);
        let mut task_2 = fixtures::snack_task_2();
        mutate(&mut task_2);
        let system = System::new(vec![
            TraceSystem::new(task_1, &fixtures::snack_plan()).unwrap(),
            TraceSystem::new(task_2, &fixtures::snack_plan_2()).unwrap(),
        ])
        .unwrap();
        let mut diagnoser = Diagnoser::new(system, DiagnoserConfig::default());
        let diagnosis = diagnoser.diagnose(&Candidate::new()).unwrap();
        let expected: Candidate =
            [Component::add_effect("serve", Literal::positive("served", ["?c"]))]
                .into_iter()
                .collect();
        assert_eq!(diagnosis, expected);
        for witness in diagnoser.system().check(&diagnosis).unwrap() {
            assert_eq!(witness, Witness::Consistent);
        }
    }

    // The polarity-swapped case: a negative goal literal violated by an
    // existing positive effect is repaired by removing that effect.
    #[test]
    fn negative_goal_is_repaired_by_removing_the_effect() {
        let mut diagnoser = diagnoser_for(|task| {
            task.goal = vec![Literal::negative("served", ["c1"])];
        });
        let diagnosis = diagnoser.diagnose(&Candidate::new()).unwrap();
        let expected: Candidate =
            [Component::remove_effect("serve", Literal::positive("served", ["?c"]))]
                .into_iter()
                .collect();
        assert_eq!(diagnosis, expected);
    }

    #[test]
    fn goal_without_any_possible_establisher_is_unrepairable() {
        let task = fixtures::snack_task();
        let system = TraceSystem::new(task, &[]).unwrap();
        let mut diagnoser = Diagnoser::new(System::single(system), DiagnoserConfig::default());
        assert!(matches!(
            diagnoser.diagnose(&Candidate::new()),
            Err(DiagnosisError::Unrepairable { step: 0, .. })
        ));
    }

    #[test]
    fn weights_steer_the_search_between_equal_size_repairs() {
        // Dropping move's positive effect admits two single-component
        // repairs: restore the effect, or drop serve's precondition on it.
        let mutate = |task: &mut Task| {
            let mov = task.actions.iter_mut().find(|a| a.name == "move").unwrap();
            mov.effects.retain(|e| e.literal.negated);
        };
        let build = |weights: ComponentWeights| {
            let mut task = fixtures::snack_task();
            mutate(&mut task);
            let system = TraceSystem::new(task, &fixtures::snack_plan()).unwrap();
            Diagnoser::new(System::single(system), DiagnoserConfig { weights })
        };

        let mut prefer_add = build(ComponentWeights {
            remove_precondition: 5.0,
            ..Default::default()
        });
        let diagnosis = prefer_add.diagnose(&Candidate::new()).unwrap();
        assert_eq!(
            diagnosis,
            [Component::add_effect("move", Literal::positive("at", ["?t", "?p2"]))]
                .into_iter()
                .collect::<Candidate>()
        );

        let mut prefer_remove = build(ComponentWeights {
            add_effect: 5.0,
            ..Default::default()
        });
        let diagnosis = prefer_remove.diagnose(&Candidate::new()).unwrap();
        assert_eq!(
            diagnosis,
            [Component::remove_precondition(
                "serve",
                Literal::positive("at", ["?t", "?p"])
            )]
            .into_iter()
            .collect::<Candidate>()
        );
    }
}

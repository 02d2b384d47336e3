//! Shared test fixtures: a small typed snack-delivery domain with traces.

use crate::{
    lang::{self, PlanStep},
    model::Task,
};

pub const SNACK_DOMAIN: &str = "\
(define (domain snack)
  (:requirements :strips :typing)
  (:types child tray sandwich place - object)
  (:constants kitchen - place)
  (:predicates
    (at ?t - tray ?p - place)
    (at-kitchen ?s - sandwich)
    (notexist ?s - sandwich)
    (ontray ?s - sandwich ?t - tray)
    (waiting ?c - child ?p - place)
    (served ?c - child))
  (:action make
    :parameters (?s - sandwich)
    :precondition (and (notexist ?s))
    :effect (and (not (notexist ?s)) (at-kitchen ?s)))
  (:action put-on-tray
    :parameters (?s - sandwich ?t - tray)
    :precondition (and (at-kitchen ?s) (at ?t kitchen))
    :effect (and (not (at-kitchen ?s)) (ontray ?s ?t)))
  (:action move
    :parameters (?t - tray ?p1 - place ?p2 - place)
    :precondition (and (at ?t ?p1))
    :effect (and (not (at ?t ?p1)) (at ?t ?p2)))
  (:action serve
    :parameters (?s - sandwich ?c - child ?t - tray ?p - place)
    :precondition (and (ontray ?s ?t) (at ?t ?p) (waiting ?c ?p))
    :effect (and (not (ontray ?s ?t)) (served ?c))))
";

pub const SNACK_PROBLEM: &str = "\
(define (problem snack-1)
  (:domain snack)
  (:objects s1 - sandwich t1 - tray c1 - child table - place)
  (:init (notexist s1) (at t1 kitchen) (waiting c1 table))
  (:goal (and (served c1))))
";

pub const SNACK_PLAN: &str = "\
; a valid run from the kitchen to the table
(make s1)
(put-on-tray s1 t1)
(move t1 kitchen table)
(serve s1 c1 t1 table)
";

pub const SNACK_PROBLEM_2: &str = "\
(define (problem snack-2)
  (:domain snack)
  (:objects s2 - sandwich t2 - tray c2 - child table2 - place)
  (:init (notexist s2) (at t2 kitchen) (waiting c2 table2))
  (:goal (and (served c2))))
";

pub const SNACK_PLAN_2: &str = "\
(make s2)
(put-on-tray s2 t2)
(move t2 kitchen table2)
(serve s2 c2 t2 table2)
";

pub fn snack_task() -> Task {
    lang::task_from_strs(SNACK_DOMAIN, SNACK_PROBLEM).expect("fixture task parses")
}

pub fn snack_task_2() -> Task {
    lang::task_from_strs(SNACK_DOMAIN, SNACK_PROBLEM_2).expect("fixture task parses")
}

pub fn snack_plan() -> Vec<PlanStep> {
    lang::parse_plan(SNACK_PLAN)
}

pub fn snack_plan_2() -> Vec<PlanStep> {
    lang::parse_plan(SNACK_PLAN_2)
}

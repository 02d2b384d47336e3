use pest::{iterators::Pairs, Parser};
use pest_derive::Parser;

use crate::lang::LangError;

#[derive(Parser)]
#[grammar = "lang/grammar.pest"]
pub struct PddlParser;

/// Parses a domain description, returning the raw pair tree.
pub fn parse_domain(input: &str) -> Result<Pairs<'_, Rule>, LangError> {
    Ok(PddlParser::parse(Rule::domain, input)?)
}

/// Parses a problem description, returning the raw pair tree.
pub fn parse_problem(input: &str) -> Result<Pairs<'_, Rule>, LangError> {
    Ok(PddlParser::parse(Rule::problem, input)?)
}

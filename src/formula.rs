//! Textual dependency formulas.
//!
//! Optional dependencies travel through the constraint encoder as a textual
//! CNF stored in an extras property: clauses separated by `,`, disjuncts by
//! `|`, each atom a name with an optional `relop version` constraint, e.g.
//! `a >= 1 | b, c`. This module parses and prints that syntax; the parser is
//! also exposed for writing request atoms the same way.

use chumsky::{
    IterParser, Parser, error,
    error::LabelError,
    extra,
    extra::ParserExtra,
    input::{SliceInput, StrInput},
    prelude::{any, end, just},
    text::{Char, TextExpected},
    util::MaybeRef,
};
use itertools::Itertools;

use crate::model::{Atom, Relop};
use crate::version::Version;

/// Parses a package name: a letter or `_`, then letters, digits and
/// `_ - + .`.
fn name<'src, I, E>() -> impl Parser<'src, I, <I as SliceInput<'src>>::Slice, E> + Copy
where
    I: StrInput<'src>,
    I::Token: Char + 'src,
    E: ParserExtra<'src, I>,
    E::Error: LabelError<'src, I, TextExpected<'src, I>>,
{
    any()
        .try_map(|c: I::Token, span| {
            if c.to_ascii()
                .map(|i| i.is_ascii_alphabetic() || i == b'_')
                .unwrap_or(false)
            {
                Ok(c)
            } else {
                Err(LabelError::expected_found(
                    [TextExpected::IdentifierPart],
                    Some(MaybeRef::Val(c)),
                    span,
                ))
            }
        })
        .then(
            any()
                .try_map(|c: I::Token, span| {
                    if c.to_ascii().map_or(false, |i| {
                        i.is_ascii_alphanumeric() || matches!(i, b'_' | b'-' | b'+' | b'.')
                    }) {
                        Ok(())
                    } else {
                        Err(LabelError::expected_found(
                            [TextExpected::IdentifierPart],
                            Some(MaybeRef::Val(c)),
                            span,
                        ))
                    }
                })
                .repeated(),
        )
        .to_slice()
}

/// Parses a version literal: letters, digits and `. + - ~ _`.
fn version<'src, I, E>() -> impl Parser<'src, I, <I as SliceInput<'src>>::Slice, E> + Copy
where
    I: StrInput<'src>,
    I::Token: Char + 'src,
    E: ParserExtra<'src, I>,
    E::Error: LabelError<'src, I, TextExpected<'src, I>>,
{
    let part = |c: I::Token, span| {
        if c.to_ascii().map_or(false, |i| {
            i.is_ascii_alphanumeric() || matches!(i, b'.' | b'+' | b'-' | b'~' | b'_')
        }) {
            Ok(())
        } else {
            Err(LabelError::expected_found(
                [TextExpected::IdentifierPart],
                Some(MaybeRef::Val(c)),
                span,
            ))
        }
    };
    any()
        .try_map(part)
        .then(any().try_map(part).repeated())
        .to_slice()
}

fn relop<'src>() -> impl Parser<'src, &'src str, Relop, extra::Err<error::Simple<'src, char>>> {
    just(">=")
        .map(|_| Relop::Geq)
        .or(just("<=").map(|_| Relop::Leq))
        .or(just("!=").map(|_| Relop::Neq))
        .or(just("=").map(|_| Relop::Eq))
        .or(just(">").map(|_| Relop::Gt))
        .or(just("<").map(|_| Relop::Lt))
}

/// Parses a single [`Atom`]. E.g. `foo`, `foo >= 1.2` or `foo != 2~rc1`.
fn atom<'src>() -> impl Parser<'src, &'src str, Atom, extra::Err<error::Simple<'src, char>>> {
    name()
        .padded()
        .then(relop().padded().then(version()).or_not())
        .map(|(name, constraint): (&str, _)| Atom {
            name: name.to_string(),
            constraint: constraint.map(|(relop, version): (_, &str)| (relop, Version::new(version))),
        })
}

/// Parses a disjunction of atoms separated by `|`.
fn clause<'src>() -> impl Parser<'src, &'src str, Vec<Atom>, extra::Err<error::Simple<'src, char>>>
{
    atom().separated_by(just("|").padded()).at_least(1).collect()
}

fn formula<'src>()
-> impl Parser<'src, &'src str, Vec<Vec<Atom>>, extra::Err<error::Simple<'src, char>>> {
    clause()
        .separated_by(just(",").padded())
        .at_least(1)
        .collect()
}

fn render_errors(errors: Vec<error::Simple<'_, char>>) -> String {
    errors.into_iter().map(|e| e.to_string()).join("; ")
}

/// Parses a dependency formula in CNF. The empty string is the empty
/// (trivially true) formula.
pub fn parse_formula(input: &str) -> Result<Vec<Vec<Atom>>, String> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }
    formula()
        .padded()
        .then_ignore(end())
        .parse(input)
        .into_result()
        .map_err(render_errors)
}

/// Parses a single atom, e.g. `"b >= 2"`.
pub fn parse_atom(input: &str) -> Result<Atom, String> {
    atom()
        .padded()
        .then_ignore(end())
        .parse(input)
        .into_result()
        .map_err(render_errors)
}

/// Prints a formula in the syntax [`parse_formula`] accepts.
pub fn print_formula(clauses: &[Vec<Atom>]) -> String {
    clauses
        .iter()
        .map(|clause| clause.iter().map(ToString::to_string).join(" | "))
        .join(", ")
}

impl std::str::FromStr for Atom {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_atom(s)
    }
}

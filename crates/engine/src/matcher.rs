//! Expectation matcher and diff engine
//!
//! Compares an extraction record with an expectation record of the same
//! shape. Leaves are judged one by one; repeated children are paired by a
//! matching key rather than by position.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sitecheck_common::{
    ComponentVerdict, Error, ExtractionRecord, FieldStatus, FieldVerdict, Result, Value, Verdict,
};
use tracing::debug;

use crate::expectation::{ChildExpectations, Expect, ExpectationRecord, Predicate};
use crate::extract::{normalize_text, parse_color};
use crate::pattern;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchOptions {
    /// Extra children and unexpected fields fail the component
    #[serde(default)]
    pub strict: bool,
    /// Numeric tolerance for `approx` predicates without their own
    #[serde(default)]
    pub tolerance: f64,
}

/// Judge one extracted component against its expectation
pub fn match_component(
    record: &ExtractionRecord,
    expectation: &ExpectationRecord,
    options: &MatchOptions,
) -> Result<ComponentVerdict> {
    let mut verdict = ComponentVerdict {
        kind: record.kind.clone(),
        key: None,
        found: record.found,
        status: Verdict::Pass,
        field_verdicts: Vec::new(),
        child_verdicts: Vec::new(),
        missing_children: BTreeSet::new(),
        extra_children: BTreeSet::new(),
        note: record.note.clone(),
    };

    if !record.found {
        verdict.status = if expectation.optional {
            Verdict::NotApplicable
        } else {
            Verdict::Fail
        };
        return Ok(verdict);
    }

    verdict.field_verdicts = match_fields(record, expectation, options)?;

    if let Some(children) = &expectation.children {
        match_children(record, children, options, &mut verdict)?;
    }

    let failed = verdict.field_verdicts.iter().any(|v| v.status.is_failure())
        || verdict.child_verdicts.iter().any(|c| c.status == Verdict::Fail)
        || !verdict.missing_children.is_empty()
        || (options.strict
            && (!verdict.extra_children.is_empty()
                || verdict
                    .field_verdicts
                    .iter()
                    .any(|v| v.status == FieldStatus::UnexpectedExtra)));

    verdict.status = if failed { Verdict::Fail } else { Verdict::Pass };
    debug!(
        "{}: {} ({} field verdicts, {} children, {} missing, {} extra)",
        verdict.kind,
        verdict.status,
        verdict.field_verdicts.len(),
        verdict.child_verdicts.len(),
        verdict.missing_children.len(),
        verdict.extra_children.len()
    );
    Ok(verdict)
}

fn match_fields(
    record: &ExtractionRecord,
    expectation: &ExpectationRecord,
    options: &MatchOptions,
) -> Result<Vec<FieldVerdict>> {
    let names: BTreeSet<&String> = record.fields.keys().chain(expectation.fields.keys()).collect();

    let mut verdicts = Vec::with_capacity(names.len());
    for name in names {
        let (actual, required) = match record.fields.get(name) {
            Some(field) => (&field.value, field.required),
            None => (&Value::Absent, false),
        };

        let status = match expectation.fields.get(name) {
            Some(expect) => judge(expect, actual, required, options)?,
            None if !actual.is_absent() => FieldStatus::UnexpectedExtra,
            None if required => FieldStatus::MissingExpected,
            None => continue,
        };

        verdicts.push(FieldVerdict {
            name: name.clone(),
            status,
            expected: expectation.fields.get(name).map(|e| e.to_string()),
            actual: actual.clone(),
        });
    }
    Ok(verdicts)
}

fn pass_if(ok: bool) -> FieldStatus {
    if ok {
        FieldStatus::Pass
    } else {
        FieldStatus::Fail
    }
}

/// Judge one leaf value
pub fn judge(expect: &Expect, actual: &Value, required: bool, options: &MatchOptions) -> Result<FieldStatus> {
    let Some(raw) = actual.as_string() else {
        return Ok(match expect {
            Expect::Rule(Predicate::Absent) => FieldStatus::Pass,
            Expect::Rule(Predicate::Any) => FieldStatus::MissingExpected,
            _ if required => FieldStatus::MissingExpected,
            _ => FieldStatus::NotApplicable,
        });
    };
    let text = normalize_text(&raw);

    let within = |expected: f64, tolerance: f64| {
        actual
            .as_number()
            .map(|n| (n - expected).abs() <= tolerance + EPSILON)
            .unwrap_or(false)
    };

    Ok(match expect {
        Expect::Exact(value) => pass_if(text == normalize_text(value)),
        Expect::Number(value) => pass_if(within(*value, options.tolerance)),
        Expect::Rule(predicate) => match predicate {
            Predicate::Equals { value } => pass_if(text == normalize_text(value)),
            Predicate::Contains { value } => pass_if(text.contains(&normalize_text(value))),
            Predicate::Matches { pattern } => pass_if(pattern::compile(pattern)?.is_match(&text)),
            Predicate::OneOf { values } => pass_if(values.iter().any(|v| normalize_text(v) == text)),
            Predicate::Any => FieldStatus::Pass,
            Predicate::Absent => FieldStatus::Fail,
            Predicate::Approx { value, tolerance } => {
                pass_if(within(*value, tolerance.unwrap_or(options.tolerance)))
            }
            Predicate::Color { value, tolerance } => {
                let expected = parse_color(value)
                    .ok_or_else(|| Error::InvalidConfig(format!("unrecognized color '{}'", value)))?;
                pass_if(
                    parse_color(&text)
                        .map(|c| c.distance(&expected) <= *tolerance)
                        .unwrap_or(false),
                )
            }
        },
    })
}

fn match_children(
    record: &ExtractionRecord,
    children: &ChildExpectations,
    options: &MatchOptions,
    verdict: &mut ComponentVerdict,
) -> Result<()> {
    let mut expected: BTreeMap<String, &ExpectationRecord> = BTreeMap::new();
    for (index, item) in children.items.iter().enumerate() {
        let key = item
            .expected_key(&children.key)?
            .ok_or_else(|| Error::MissingChildKey {
                component: record.kind.clone(),
                index,
            })?;
        if expected.insert(key.clone(), item).is_some() {
            return Err(Error::DuplicateExpectedKey {
                component: record.kind.clone(),
                key,
            });
        }
    }

    let mut paired: BTreeSet<String> = BTreeSet::new();
    for (index, child) in record.children.iter().enumerate() {
        let Some(key) = children.key.key_of(child.value(&children.key.field))? else {
            verdict.extra_children.insert(format!("<unkeyed #{}>", index));
            continue;
        };
        if paired.contains(&key) {
            debug!("{}: duplicate child key {} at #{}", record.kind, key, index);
            verdict.extra_children.insert(key);
            continue;
        }
        match expected.get(&key) {
            Some(item) => {
                let mut child_verdict = match_component(child, item, options)?;
                child_verdict.key = Some(key.clone());
                verdict.child_verdicts.push(child_verdict);
                paired.insert(key);
            }
            None => {
                verdict.extra_children.insert(key);
            }
        }
    }

    verdict.missing_children = expected
        .into_iter()
        .filter(|(key, item)| !paired.contains(key) && !item.optional)
        .map(|(key, _)| key)
        .collect();
    Ok(())
}

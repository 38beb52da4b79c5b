//! Contract Schema Validator
//!
//! Checks the structural shape of a contract on its JSON form so every
//! failure can name the exact field path. Checks run in a fixed order:
//!
//! ```text
//! top-level keys → version → story_id → stages/edge → nested objects → team_coordination
//! ```
//!
//! Validation is a pure function of its input.

use crate::contract::{Contract, CONTRACT_VERSION};
use crate::error::HandoffError;
use crate::principle::{architecture_field_names, design_field_names};
use crate::stage::Stage;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static STORY_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^STORY-[A-Za-z0-9_]+-[0-9]+$").expect("story id pattern compiles"));

/// Top-level keys every contract must carry
pub const REQUIRED_FIELDS: [&str; 9] = [
    "version",
    "story_id",
    "source_stage",
    "target_stage",
    "compliance",
    "input_requirements",
    "output_specifications",
    "quality_gates",
    "handoff_criteria",
];

/// Top-level keys a contract may carry
pub const OPTIONAL_FIELDS: [&str; 1] = ["team_coordination"];

pub type ValidationResult = Result<(), HandoffError>;

/// Whether `id` matches `STORY-<source>-<n>`
pub fn is_valid_story_id(id: &str) -> bool {
    STORY_ID.is_match(id)
}

#[derive(Debug, Clone)]
pub struct SchemaValidator {
    supported_version: String,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self {
            supported_version: CONTRACT_VERSION.to_string(),
        }
    }

    pub fn supported_version(&self) -> &str {
        &self.supported_version
    }

    /// Validate a typed contract
    pub fn validate_contract(&self, contract: &Contract) -> ValidationResult {
        self.validate(&contract.to_value()?)
    }

    /// Validate the JSON form of a contract
    pub fn validate(&self, value: &Value) -> ValidationResult {
        let root = as_object(value, "$")?;

        // 1. top-level presence, then closed key set
        for field in REQUIRED_FIELDS {
            if !root.contains_key(field) {
                return Err(missing(field));
            }
        }
        for key in root.keys() {
            if !REQUIRED_FIELDS.contains(&key.as_str()) && !OPTIONAL_FIELDS.contains(&key.as_str()) {
                return Err(unknown(key));
            }
        }

        // 2. version
        let version = as_str(&root["version"], "version")?;
        if version != self.supported_version {
            return Err(HandoffError::UnsupportedVersion {
                found: version.to_string(),
                supported: self.supported_version.clone(),
            });
        }

        // 3. story id
        let story_id = as_str(&root["story_id"], "story_id")?;
        if !is_valid_story_id(story_id) {
            return Err(HandoffError::schema(
                "story_id",
                format!("'{}' does not match STORY-<source>-<n>", story_id),
            ));
        }

        // 4. stages and edge
        let source = parse_stage(&root["source_stage"], "source_stage")?;
        let target = parse_stage(&root["target_stage"], "target_stage")?;
        if !source.can_hand_off_to(target) {
            let reason = match source.next() {
                Some(expected) => format!("{} may only hand off to {}", source, expected),
                None => format!("{} is a sink and cannot hand off", source),
            };
            return Err(HandoffError::SequenceViolation {
                from: source,
                to: target,
                reason,
            });
        }

        // 5. nested objects
        validate_compliance(&root["compliance"])?;
        validate_input_requirements(&root["input_requirements"])?;
        validate_output_specifications(&root["output_specifications"])?;
        string_array(&root["quality_gates"], "quality_gates")?;
        string_array(&root["handoff_criteria"], "handoff_criteria")?;

        if let Some(tc) = root.get("team_coordination") {
            validate_team_coordination(tc, source)?;
        }

        Ok(())
    }
}

fn validate_compliance(value: &Value) -> ValidationResult {
    let path = "compliance";
    let obj = as_object(value, path)?;
    closed_keys(
        obj,
        path,
        &["design_principles", "architecture_principles"],
        &["enhanced_validation"],
    )?;

    let design_path = "compliance.design_principles";
    let design = as_object(&obj["design_principles"], design_path)?;
    let design_fields = design_field_names();
    closed_keys(design, design_path, &design_fields, &[])?;
    for field in design_fields {
        validate_principle_value(&design[field], &join(design_path, field))?;
    }

    let arch_path = "compliance.architecture_principles";
    let arch = as_object(&obj["architecture_principles"], arch_path)?;
    let arch_fields = architecture_field_names();
    closed_keys(arch, arch_path, &arch_fields, &[])?;
    for field in arch_fields {
        as_bool(&arch[field], &join(arch_path, field))?;
    }

    if let Some(enhanced) = obj.get("enhanced_validation") {
        let enhanced_path = "compliance.enhanced_validation";
        for (stage_name, block) in as_object(enhanced, enhanced_path)? {
            let block_path = join(enhanced_path, stage_name);
            match stage_name.parse::<Stage>() {
                Ok(stage) if stage.is_agent() => {}
                _ => {
                    return Err(HandoffError::schema(
                        block_path,
                        "enhanced validation blocks must be keyed by an agent stage",
                    ))
                }
            }
            for (check, result) in as_object(block, &block_path)? {
                as_bool(result, &join(&block_path, check))?;
            }
        }
    }
    Ok(())
}

fn validate_principle_value(value: &Value, path: &str) -> ValidationResult {
    match value {
        Value::Bool(_) => Ok(()),
        Value::Object(obj) => {
            closed_keys(obj, path, &["compliant"], &["score", "notes"])?;
            as_bool(&obj["compliant"], &join(path, "compliant"))?;
            if let Some(score) = obj.get("score") {
                let score_path = join(path, "score");
                let score = as_number(score, &score_path)?;
                if !(1.0..=5.0).contains(&score) {
                    return Err(HandoffError::schema(
                        score_path,
                        format!("score {} outside 1.0..=5.0", score),
                    ));
                }
            }
            if let Some(notes) = obj.get("notes") {
                as_str(notes, &join(path, "notes"))?;
            }
            Ok(())
        }
        _ => Err(HandoffError::schema(
            path,
            "expected a boolean or an assessment object",
        )),
    }
}

fn validate_input_requirements(value: &Value) -> ValidationResult {
    let path = "input_requirements";
    let obj = as_object(value, path)?;
    let fields = ["required_files", "required_data", "validation_rules"];
    closed_keys(obj, path, &fields, &[])?;
    for field in fields {
        string_array(&obj[field], &join(path, field))?;
    }
    Ok(())
}

fn validate_output_specifications(value: &Value) -> ValidationResult {
    let path = "output_specifications";
    let obj = as_object(value, path)?;
    closed_keys(
        obj,
        path,
        &["deliverables", "validation_criteria"],
        &["data", "handoff_checklist"],
    )?;
    string_array(&obj["deliverables"], "output_specifications.deliverables")?;

    let criteria_path = "output_specifications.validation_criteria";
    for (dimension, metrics) in as_object(&obj["validation_criteria"], criteria_path)? {
        let dimension_path = join(criteria_path, dimension);
        for (metric, criterion) in as_object(metrics, &dimension_path)? {
            validate_criterion(criterion, &join(&dimension_path, metric))?;
        }
    }

    if let Some(data) = obj.get("data") {
        as_object(data, "output_specifications.data")?;
    }
    if let Some(checklist) = obj.get("handoff_checklist") {
        let checklist_path = "output_specifications.handoff_checklist";
        for (name, met) in as_object(checklist, checklist_path)? {
            as_bool(met, &join(checklist_path, name))?;
        }
    }
    Ok(())
}

fn validate_criterion(value: &Value, path: &str) -> ValidationResult {
    let obj = as_object(value, path)?;
    closed_keys(obj, path, &["bound"], &["declared", "threshold", "unit"])?;
    let bound_path = join(path, "bound");
    match as_str(&obj["bound"], &bound_path)? {
        "max" | "min" => {}
        other => {
            return Err(HandoffError::schema(
                bound_path,
                format!("'{}' is not one of max, min", other),
            ))
        }
    }
    for field in ["declared", "threshold"] {
        if let Some(number) = obj.get(field) {
            as_number(number, &join(path, field))?;
        }
    }
    if let Some(unit) = obj.get("unit") {
        as_str(unit, &join(path, "unit"))?;
    }
    Ok(())
}

fn validate_team_coordination(value: &Value, source: Stage) -> ValidationResult {
    let path = "team_coordination";
    let obj = as_object(value, path)?;
    closed_keys(obj, path, &[], &["notes", "review_decision"])?;
    if let Some(notes) = obj.get("notes") {
        string_array(notes, "team_coordination.notes")?;
    }

    let Some(decision) = obj.get("review_decision") else {
        return Ok(());
    };
    let decision_path = "team_coordination.review_decision";
    if source != Stage::QualityReviewer {
        return Err(HandoffError::schema(
            decision_path,
            format!("only {} may record a review decision", Stage::QualityReviewer),
        ));
    }
    let decision_obj = as_object(decision, decision_path)?;
    let kind_path = join(decision_path, "decision");
    let kind = match decision_obj.get("decision") {
        Some(kind) => as_str(kind, &kind_path)?,
        None => return Err(HandoffError::schema(kind_path, "missing required field")),
    };
    match kind {
        "approve" | "reject" => {
            closed_keys(decision_obj, decision_path, &["decision"], &["reason"])?;
        }
        "request_revision" => {
            closed_keys(
                decision_obj,
                decision_path,
                &["decision", "return_to"],
                &["reason"],
            )?;
            let return_path = join(decision_path, "return_to");
            let return_to = parse_stage(&decision_obj["return_to"], &return_path)?;
            if !return_to.is_agent() || !return_to.precedes(Stage::QualityReviewer) {
                return Err(HandoffError::schema(
                    return_path,
                    format!("{} is not an earlier agent stage", return_to),
                ));
            }
        }
        other => {
            return Err(HandoffError::schema(
                kind_path,
                format!("'{}' is not one of approve, request_revision, reject", other),
            ))
        }
    }
    if let Some(reason) = decision_obj.get("reason") {
        as_str(reason, &join(decision_path, "reason"))?;
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// helpers
// ----------------------------------------------------------------------------

fn join(parent: &str, child: &str) -> String {
    format!("{}.{}", parent, child)
}

fn missing(path: &str) -> HandoffError {
    HandoffError::schema(path, "missing required field")
}

fn unknown(path: &str) -> HandoffError {
    HandoffError::schema(path, "unknown field")
}

/// Required keys must be present; no key outside `required ∪ optional` is allowed
fn closed_keys(
    obj: &Map<String, Value>,
    path: &str,
    required: &[&str],
    optional: &[&str],
) -> ValidationResult {
    for field in required {
        if !obj.contains_key(*field) {
            return Err(missing(&join(path, field)));
        }
    }
    for key in obj.keys() {
        if !required.contains(&key.as_str()) && !optional.contains(&key.as_str()) {
            return Err(unknown(&join(path, key)));
        }
    }
    Ok(())
}

fn as_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, HandoffError> {
    value
        .as_object()
        .ok_or_else(|| HandoffError::schema(path, "expected an object"))
}

fn as_str<'a>(value: &'a Value, path: &str) -> Result<&'a str, HandoffError> {
    value
        .as_str()
        .ok_or_else(|| HandoffError::schema(path, "expected a string"))
}

fn as_bool(value: &Value, path: &str) -> Result<bool, HandoffError> {
    value
        .as_bool()
        .ok_or_else(|| HandoffError::schema(path, "expected a boolean"))
}

fn as_number(value: &Value, path: &str) -> Result<f64, HandoffError> {
    value
        .as_f64()
        .ok_or_else(|| HandoffError::schema(path, "expected a number"))
}

fn string_array(value: &Value, path: &str) -> ValidationResult {
    let items = value
        .as_array()
        .ok_or_else(|| HandoffError::schema(path, "expected an array of strings"))?;
    for (i, item) in items.iter().enumerate() {
        let item_path = format!("{}[{}]", path, i);
        if as_str(item, &item_path)?.trim().is_empty() {
            return Err(HandoffError::schema(item_path, "empty string"));
        }
    }
    Ok(())
}

fn parse_stage(value: &Value, path: &str) -> Result<Stage, HandoffError> {
    let name = as_str(value, path)?;
    name.parse::<Stage>()
        .map_err(|reason| HandoffError::schema(path, reason))
}

//! Classifies schemas into the handful of shapes we know how to translate.

use serde_json::{Map, Value};

use crate::{parsing::SpecDocument, Error};

use super::MAX_ITERATIONS;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarKind {
    String,
    Int,
    Float,
    Boolean,
}

impl ScalarKind {
    pub fn type_name(self) -> &'static str {
        match self {
            ScalarKind::String => "String",
            ScalarKind::Int => "Int",
            ScalarKind::Float => "Float",
            ScalarKind::Boolean => "Boolean",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaKind {
    Object,
    Array,
    Enum,
    Scalar(ScalarKind),
    /// Anything we can only pass through as an arbitrary JSON value.
    Json,
    Unknown,
}

impl SchemaKind {
    /// Whether schemas of this kind get a named type, and so a data definition.
    pub fn is_named(self) -> bool {
        matches!(self, SchemaKind::Object | SchemaKind::Array | SchemaKind::Enum)
    }
}

/// Classifies an already normalized schema.
pub fn classify(schema: &Value) -> SchemaKind {
    if schema.get("enum").and_then(Value::as_array).is_some() {
        return SchemaKind::Enum;
    }

    if schema.get("oneOf").is_some() || schema.get("anyOf").is_some() {
        // Single member unions were collapsed during normalization.
        return SchemaKind::Json;
    }

    let has_properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|properties| !properties.is_empty());

    match schema.get("type") {
        Some(Value::String(kind)) => match kind.as_str() {
            // GraphQL doesn't allow objects without fields.
            "object" if has_properties => SchemaKind::Object,
            "object" | "json" => SchemaKind::Json,
            "array" => SchemaKind::Array,
            "string" => SchemaKind::Scalar(ScalarKind::String),
            "integer" => SchemaKind::Scalar(ScalarKind::Int),
            "number" => SchemaKind::Scalar(ScalarKind::Float),
            "boolean" => SchemaKind::Scalar(ScalarKind::Boolean),
            _ => SchemaKind::Unknown,
        },
        Some(Value::Array(_)) => SchemaKind::Json,
        Some(_) => SchemaKind::Unknown,
        None if has_properties => SchemaKind::Object,
        None if schema.get("properties").is_some() => SchemaKind::Json,
        None if schema.get("items").is_some() => SchemaKind::Array,
        None => SchemaKind::Unknown,
    }
}

/// Produces the schema we actually classify & deduplicate: top level references
/// are followed, `allOf` branches merged, single member `oneOf`/`anyOf`s
/// collapsed and nullable type arrays reduced to their single type.
pub fn normalize(document: &SpecDocument, schema: &Value) -> Result<Value, Error> {
    normalize_inner(document, schema, 0)
}

fn normalize_inner(document: &SpecDocument, schema: &Value, depth: usize) -> Result<Value, Error> {
    if depth > MAX_ITERATIONS {
        return Err(Error::TooManyIterations);
    }

    let schema = document.resolve(schema)?;
    let Some(object) = schema.as_object() else {
        return Ok(schema.clone());
    };

    let mut object = object.clone();

    if let Some(Value::Array(branches)) = object.remove("allOf") {
        for branch in branches {
            let branch = normalize_inner(document, &branch, depth + 1)?;
            merge_all_of_branch(&mut object, branch)?;
        }
    }

    for union in ["oneOf", "anyOf"] {
        let single_member = match object.get(union) {
            Some(Value::Array(members)) if members.len() == 1 => Some(members[0].clone()),
            _ => None,
        };
        if let Some(member) = single_member {
            object.remove(union);
            let member = normalize_inner(document, &member, depth + 1)?;
            if let Value::Object(member) = member {
                for (key, value) in member {
                    object.entry(key).or_insert(value);
                }
            }
        }
    }

    if let Some(Value::Array(types)) = object.get("type") {
        let non_null = types
            .iter()
            .filter(|kind| kind.as_str() != Some("null"))
            .cloned()
            .collect::<Vec<_>>();

        if let [single] = non_null.as_slice() {
            object.insert("type".into(), single.clone());
        }
    }

    Ok(Value::Object(object))
}

fn merge_all_of_branch(target: &mut Map<String, Value>, branch: Value) -> Result<(), Error> {
    let Value::Object(branch) = branch else {
        return Ok(());
    };

    for (key, value) in branch {
        match key.as_str() {
            "type" => match target.get("type") {
                None => {
                    target.insert(key, value);
                }
                Some(existing) if *existing == value => {}
                Some(existing) => {
                    // An object without properties is compatible with anything more specific.
                    let existing_is_bare_object =
                        existing.as_str() == Some("object") && target.get("properties").is_none();
                    if existing_is_bare_object {
                        target.insert(key, value);
                    } else if value.as_str() != Some("object") {
                        return Err(Error::AllOfConflict(format!(
                            "cannot combine a schema of type {existing} with a schema of type {value}"
                        )));
                    }
                }
            },
            "properties" => {
                let Value::Object(properties) = value else { continue };
                let target_properties = target
                    .entry("properties")
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(target_properties) = target_properties {
                    for (name, property) in properties {
                        target_properties.entry(name).or_insert(property);
                    }
                }
            }
            "required" => {
                let Value::Array(required) = value else { continue };
                let target_required = target.entry("required").or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(target_required) = target_required {
                    for name in required {
                        if !target_required.contains(&name) {
                            target_required.push(name);
                        }
                    }
                }
            }
            _ => {
                target.entry(key).or_insert(value);
            }
        }
    }

    Ok(())
}

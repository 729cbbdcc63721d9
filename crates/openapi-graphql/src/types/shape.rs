use std::{collections::HashMap, sync::Arc};

use async_graphql::{
    dynamic::{FieldValue, TypeRef},
    Name, Value as ConstValue,
};
use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::{kind::ScalarKind, JSON_SCALAR};
use crate::resolvers::{ResolutionContext, ResolvedValue};

/// The GraphQL type something was translated to, in enough detail to convert
/// values between the API and GraphQL.
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    Scalar(ScalarKind),
    Json,
    Enum(Arc<EnumShape>),
    /// An object or input object, depending on where the shape was built.
    Object(String),
    List(Box<Shape>),
}

#[derive(Debug, PartialEq)]
pub struct EnumShape {
    pub name: String,
    /// GraphQL item -> the literal the API uses.
    pub items: IndexMap<String, Value>,
}

impl EnumShape {
    fn item_for(&self, literal: &Value) -> Option<&str> {
        self.items
            .iter()
            .find(|(_, candidate)| *candidate == literal)
            .or_else(|| {
                // Some APIs send numbers for string enums or the other way around.
                let literal = literal_string(literal);
                self.items
                    .iter()
                    .find(|(_, candidate)| literal_string(candidate) == literal)
            })
            .map(|(item, _)| item.as_str())
    }
}

fn literal_string(value: &Value) -> String {
    match value {
        Value::String(value) => value.clone(),
        other => other.to_string(),
    }
}

/// A field of an input object, along with the name the API expects it under.
#[derive(Clone, Debug)]
pub struct InputFieldShape {
    pub raw_name: String,
    pub shape: Shape,
}

/// Input object name -> GraphQL field name -> field.
pub type InputObjectShapes = HashMap<String, IndexMap<String, InputFieldShape>>;

impl Shape {
    /// The (nullable) type of a field or argument with this shape.
    pub fn type_ref(&self) -> TypeRef {
        match self {
            Shape::Scalar(kind) => TypeRef::named(kind.type_name()),
            Shape::Json => TypeRef::named(JSON_SCALAR),
            Shape::Enum(shape) => TypeRef::named(shape.name.clone()),
            Shape::Object(name) => TypeRef::named(name.clone()),
            Shape::List(inner) => TypeRef::List(Box::new(inner.type_ref())),
        }
    }

    pub fn required_type_ref(&self, required: bool) -> TypeRef {
        if required {
            TypeRef::NonNull(Box::new(self.type_ref()))
        } else {
            self.type_ref()
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Shape::List(_))
    }

    pub fn object_name(&self) -> Option<&str> {
        match self {
            Shape::Object(name) => Some(name),
            _ => None,
        }
    }

    /// Converts a GraphQL input value back into what the API expects: enum
    /// items become their literals and input object fields get their raw names.
    pub fn restore_input(&self, value: Value, input_objects: &InputObjectShapes) -> Value {
        match (self, value) {
            (_, Value::Null) => Value::Null,
            (Shape::Enum(shape), Value::String(item)) => match shape.items.get(&item) {
                Some(literal) => literal.clone(),
                None => Value::String(item),
            },
            (Shape::List(inner), Value::Array(items)) => Value::Array(
                items
                    .into_iter()
                    .map(|item| inner.restore_input(item, input_objects))
                    .collect(),
            ),
            (Shape::Object(name), Value::Object(object)) => {
                let Some(fields) = input_objects.get(name) else {
                    return Value::Object(object);
                };

                object
                    .into_iter()
                    .map(|(key, value)| match fields.get(&key) {
                        Some(field) => (field.raw_name.clone(), field.shape.restore_input(value, input_objects)),
                        None => (key, value),
                    })
                    .collect::<Map<_, _>>()
                    .into()
            }
            (_, value) => value,
        }
    }

    /// Converts a (sanitized) API value into the value of a field with this shape.
    pub fn output_value<'a>(&self, value: Value, context: &Arc<ResolutionContext>) -> Option<FieldValue<'a>> {
        match (self, value) {
            (_, Value::Null) => None,
            (Shape::Object(_), data) => Some(FieldValue::owned_any(ResolvedValue {
                data,
                context: Arc::clone(context),
            })),
            (Shape::List(inner), Value::Array(items)) => Some(FieldValue::list(
                items
                    .into_iter()
                    .map(|item| inner.output_value(item, context).unwrap_or(FieldValue::NULL)),
            )),
            // A single value where we expected a list.
            (Shape::List(inner), item) => Some(FieldValue::list(inner.output_value(item, context))),
            (Shape::Enum(shape), literal) => {
                let item = shape.item_for(&literal)?;
                Some(FieldValue::value(ConstValue::Enum(Name::new(item))))
            }
            (Shape::Scalar(ScalarKind::String), Value::Number(number)) => {
                Some(FieldValue::value(ConstValue::String(number.to_string())))
            }
            (Shape::Scalar(ScalarKind::String), Value::Bool(value)) => {
                Some(FieldValue::value(ConstValue::String(value.to_string())))
            }
            (Shape::Scalar(_) | Shape::Json, value) => ConstValue::from_json(value).ok().map(FieldValue::value),
        }
    }
}

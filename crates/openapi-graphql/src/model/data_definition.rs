use std::collections::HashSet;

use serde_json::Value;

use crate::{
    naming::{apply_case, CaseStyle},
    types::{SchemaKind, Shape},
};

/// Names we never hand out to generated types.
const RESERVED_NAMES: &[&str] = &[
    "Query",
    "Mutation",
    "Subscription",
    "JSON",
    "String",
    "Int",
    "Float",
    "Boolean",
    "ID",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataDefId(pub(crate) usize);

/// One distinct payload shape along with the names of the types it turns into.
#[derive(Debug)]
pub struct DataDefinition {
    /// The normalized schema.  Nested schemas may still contain references.
    pub schema: Value,
    pub kind: SchemaKind,
    pub output_name: String,
    pub input_name: String,
    pub(crate) output_shape: Option<Shape>,
    pub(crate) input_shape: Option<Shape>,
}

impl DataDefinition {
    pub fn description(&self) -> Option<&str> {
        self.schema.get("description").and_then(Value::as_str)
    }
}

#[derive(Debug)]
pub struct DataDefinitions {
    definitions: Vec<DataDefinition>,
    used_output_names: HashSet<String>,
    used_input_names: HashSet<String>,
}

impl Default for DataDefinitions {
    fn default() -> Self {
        DataDefinitions {
            definitions: Vec::new(),
            used_output_names: RESERVED_NAMES.iter().map(|name| name.to_string()).collect(),
            used_input_names: HashSet::new(),
        }
    }
}

impl DataDefinitions {
    /// Looks for a definition with a structurally identical schema.
    pub fn find(&self, schema: &Value) -> Option<DataDefId> {
        self.definitions
            .iter()
            .position(|definition| definition.schema == *schema)
            .map(DataDefId)
    }

    /// Finds the definition for `schema`, or creates one named after the first
    /// usable candidate.
    pub fn find_or_insert(
        &mut self,
        schema: Value,
        kind: SchemaKind,
        candidates: &[String],
        style: CaseStyle,
    ) -> DataDefId {
        if let Some(id) = self.find(&schema) {
            return id;
        }

        let output_name = self.pick_name(candidates, style);
        let input_name = format!("{output_name}Input");

        tracing::trace!("Creating data definition {output_name}");

        self.used_output_names.insert(output_name.clone());
        self.used_input_names.insert(input_name.clone());

        self.definitions.push(DataDefinition {
            schema,
            kind,
            output_name,
            input_name,
            output_shape: None,
            input_shape: None,
        });

        DataDefId(self.definitions.len() - 1)
    }

    fn pick_name(&self, candidates: &[String], style: CaseStyle) -> String {
        let candidates = candidates
            .iter()
            .map(|candidate| apply_case(candidate, style))
            .filter(|candidate| candidate != "_")
            .collect::<Vec<_>>();

        if let Some(name) = candidates
            .iter()
            .find(|name| self.is_available(name) && self.is_available(&format!("{name}Input")))
        {
            return name.clone();
        }

        let base = candidates.first().cloned().unwrap_or_else(|| "Type".to_string());
        std::iter::once(base.clone())
            .chain((2..).map(|suffix| format!("{base}{suffix}")))
            .find(|name| self.is_available(name) && self.is_available(&format!("{name}Input")))
            .unwrap_or(base)
    }

    pub fn is_available(&self, name: &str) -> bool {
        !self.used_output_names.contains(name) && !self.used_input_names.contains(name)
    }

    /// Claims a type name outside of any data definition, e.g. for viewer types.
    pub fn claim_name(&mut self, base: &str) -> String {
        let name = std::iter::once(base.to_string())
            .chain((2..).map(|suffix| format!("{base}{suffix}")))
            .find(|name| self.is_available(name))
            .unwrap_or_else(|| base.to_string());

        self.used_output_names.insert(name.clone());
        name
    }

    pub fn get(&self, id: DataDefId) -> &DataDefinition {
        &self.definitions[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: DataDefId) -> &mut DataDefinition {
        &mut self.definitions[id.0]
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

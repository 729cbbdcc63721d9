/// The kinds of irregularity we can run into while translating a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr, serde::Serialize)]
pub enum WarningKind {
    MissingResponseSchema,
    MultipleResponses,
    InvalidSchemaType,
    UnresolvableLink,
    AmbiguousLink,
    LinkNameCollision,
    UnnamedParameter,
    #[strum(serialize = "UnsupportedHTTPAuthScheme")]
    #[serde(rename = "UnsupportedHTTPAuthScheme")]
    UnsupportedHttpAuthScheme,
    UnknownSecurityScheme,
    DuplicateOperationId,
    DuplicateFieldName,
    NameCollision,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    #[serde(rename = "type")]
    pub kind: WarningKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mitigation: Option<String>,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Warning {
            kind,
            message: message.into(),
            mitigation: None,
        }
    }

    pub fn with_mitigation(mut self, mitigation: impl Into<String>) -> Self {
        self.mitigation = Some(mitigation.into());
        self
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(mitigation) = &self.mitigation {
            write!(f, " ({mitigation})")?;
        }
        Ok(())
    }
}

/// Diagnostics describing how a document was translated.
#[derive(Clone, Debug, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub warnings: Vec<Warning>,
    pub num_ops: usize,
    pub num_ops_query: usize,
    pub num_ops_mutation: usize,
    pub num_queries_created: usize,
    pub num_mutations_created: usize,
}

impl Report {
    pub fn has_warning(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|warning| warning.kind == kind)
    }
}

use crate::{
    model::DataDefinitions,
    naming::{CaseStyle, NameCollision, SanitizationMap},
    parsing::SpecDocument,
    report::{Report, Warning, WarningKind},
    types::TypeRegistry,
    Error, Options,
};

/// Everything that accumulates while a single document is translated.
pub(crate) struct BuildContext<'a> {
    pub document: &'a SpecDocument,
    pub options: &'a Options,
    pub definitions: DataDefinitions,
    pub sane_map: SanitizationMap,
    pub types: TypeRegistry,
    pub report: Report,
}

impl<'a> BuildContext<'a> {
    pub fn new(document: &'a SpecDocument, options: &'a Options) -> Self {
        BuildContext {
            document,
            options,
            definitions: DataDefinitions::default(),
            sane_map: SanitizationMap::default(),
            types: TypeRegistry::default(),
            report: Report::default(),
        }
    }

    /// Records a warning, or fails if we're in strict mode.
    pub fn warn(&mut self, warning: Warning) -> Result<(), Error> {
        if self.options.strict {
            return Err(Error::Strict(warning));
        }

        self.warn_lenient(warning);
        Ok(())
    }

    /// Records a warning that never fails the translation, even in strict mode.
    pub fn warn_lenient(&mut self, warning: Warning) {
        tracing::warn!("{warning}");
        self.report.warnings.push(warning);
    }

    pub fn field_style(&self) -> CaseStyle {
        if self.options.simple_names {
            CaseStyle::Simple
        } else {
            CaseStyle::CamelCase
        }
    }

    pub fn type_style(&self) -> CaseStyle {
        if self.options.simple_names {
            CaseStyle::Simple
        } else {
            CaseStyle::PascalCase
        }
    }

    /// Sanitizes a field or argument name, remembering the raw name.
    pub fn field_name(&mut self, raw: &str) -> Result<String, Error> {
        let (name, collision) = self.sane_map.beautify_and_store(raw, self.field_style());
        if let Some(collision) = collision {
            self.name_collision(collision)?;
        }
        Ok(name)
    }

    fn name_collision(&mut self, collision: NameCollision) -> Result<(), Error> {
        let NameCollision {
            sanitized,
            existing,
            rejected,
        } = collision;

        self.warn(
            Warning::new(
                WarningKind::NameCollision,
                format!("both {existing} and {rejected} are sanitized to {sanitized}"),
            )
            .with_mitigation(format!("{sanitized} is mapped back to {existing}")),
        )
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_warnings_are_fatal_in_strict_mode() {
        let document = SpecDocument::new(json!({}));
        let options = Options {
            strict: true,
            ..Options::default()
        };
        let mut context = BuildContext::new(&document, &options);

        let result = context.warn(Warning::new(WarningKind::InvalidSchemaType, "nope"));
        assert_matches!(result, Err(Error::Strict(warning)) if warning.kind == WarningKind::InvalidSchemaType);

        context.warn_lenient(Warning::new(WarningKind::UnresolvableLink, "never fatal"));
        assert!(context.report.has_warning(WarningKind::UnresolvableLink));
    }

    #[test]
    fn test_name_collisions_are_reported() {
        let document = SpecDocument::new(json!({}));
        let options = Options::default();
        let mut context = BuildContext::new(&document, &options);

        assert_eq!(context.field_name("user_name").unwrap(), "userName");
        assert_eq!(context.field_name("user-name").unwrap(), "userName");
        assert!(context.report.has_warning(WarningKind::NameCollision));
        assert_eq!(context.sane_map.raw_name("userName"), "user_name");
    }
}

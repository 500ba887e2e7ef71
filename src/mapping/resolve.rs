use std::collections::HashMap;

use super::{FieldMapping, MappingDirection, MappingResult};

/// Explicitly configured tables for one scope (connector-wide or one model).
#[derive(Debug, Clone, Default)]
pub struct MappingScope {
    pub serialize: Option<FieldMapping>,
    pub normalize: Option<FieldMapping>,
}

impl MappingScope {
    fn explicit(&self, direction: MappingDirection) -> Option<&FieldMapping> {
        match direction {
            MappingDirection::Serialize => self.serialize.as_ref(),
            MappingDirection::Normalize => self.normalize.as_ref(),
        }
    }

    /// The table this scope contributes in `direction`: the explicit one, or
    /// the inverse of the opposite explicit one, or nothing.
    pub fn table(&self, direction: MappingDirection) -> MappingResult<Option<FieldMapping>> {
        if let Some(table) = self.explicit(direction) {
            return Ok(Some(table.clone()));
        }
        self.explicit(direction.opposite())
            .map(FieldMapping::invert)
            .transpose()
    }
}

/// Both directions of a model's fully resolved tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedMappings {
    pub serialize: FieldMapping,
    pub normalize: FieldMapping,
}

impl ResolvedMappings {
    /// Connector-wide tables, overlaid by the model's where present.
    ///
    /// Both merged tables must stay injective, so a model entry may not reuse
    /// a target already claimed by a connector entry. Without an explicit
    /// normalize table, normalize is the inverse of the merged serialize table.
    pub fn resolve(connector: &MappingScope, model: Option<&MappingScope>) -> MappingResult<Self> {
        let serialize = resolve_direction(connector, model, MappingDirection::Serialize)?;
        let explicit_normalize =
            connector.normalize.is_some() || model.is_some_and(|m| m.normalize.is_some());

        let normalize = if explicit_normalize {
            let normalize = resolve_direction(connector, model, MappingDirection::Normalize)?;
            serialize.invert()?;
            normalize.invert()?;
            normalize
        } else {
            serialize.invert()?
        };

        Ok(Self {
            serialize,
            normalize,
        })
    }

    pub fn table(&self, direction: MappingDirection) -> &FieldMapping {
        match direction {
            MappingDirection::Serialize => &self.serialize,
            MappingDirection::Normalize => &self.normalize,
        }
    }
}

fn resolve_direction(
    connector: &MappingScope,
    model: Option<&MappingScope>,
    direction: MappingDirection,
) -> MappingResult<FieldMapping> {
    let mut table = connector.table(direction)?.unwrap_or_default();
    if let Some(overrides) = model
        && let Some(model_table) = overrides.table(direction)?
    {
        table.extend(&model_table);
    }
    Ok(table)
}

/// Per-model mapping tables, resolved once at startup.
#[derive(Debug, Clone, Default)]
pub struct FieldMapper {
    connector: ResolvedMappings,
    models: HashMap<String, ResolvedMappings>,
}

impl FieldMapper {
    pub fn new<I>(connector: &MappingScope, models: I) -> MappingResult<Self>
    where
        I: IntoIterator<Item = (String, MappingScope)>,
    {
        let models = models
            .into_iter()
            .map(|(name, scope)| {
                ResolvedMappings::resolve(connector, Some(&scope)).map(|resolved| (name, resolved))
            })
            .collect::<MappingResult<HashMap<_, _>>>()?;

        Ok(Self {
            connector: ResolvedMappings::resolve(connector, None)?,
            models,
        })
    }

    /// Tables for `model`, falling back to the connector-wide tables.
    pub fn tables(&self, model: &str) -> &ResolvedMappings {
        self.models.get(model).unwrap_or(&self.connector)
    }

    pub fn resolve(&self, model: &str, direction: MappingDirection) -> &FieldMapping {
        self.tables(model).table(direction)
    }

    pub fn serialize_field(&self, model: &str, field: &str) -> String {
        self.resolve(model, MappingDirection::Serialize).apply(field)
    }

    pub fn normalize_field(&self, model: &str, field: &str) -> String {
        self.resolve(model, MappingDirection::Normalize).apply(field)
    }

    pub fn serialize_fields<S: AsRef<str>>(&self, model: &str, fields: &[S]) -> Vec<String> {
        let table = self.resolve(model, MappingDirection::Serialize);
        fields.iter().map(|f| table.apply(f.as_ref())).collect()
    }

    pub fn normalize_fields<S: AsRef<str>>(&self, model: &str, fields: &[S]) -> Vec<String> {
        let table = self.resolve(model, MappingDirection::Normalize);
        fields.iter().map(|f| table.apply(f.as_ref())).collect()
    }
}

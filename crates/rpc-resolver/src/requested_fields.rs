// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Validates a client's field selection against the schema and computes the [`FetchSpec`] for it.
//!
//! The walk is depth-first and stops at the first invalid entry.

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use rpc_common::formatter::NameFormatter;
use rpc_model::{
    introspector::{FieldKind, SchemaIntrospector, TypeFields},
    resource::{ActionKind, Calculation, Relationship, Resource},
    types::{FieldType, TypedFields, UnionType},
};

use crate::{
    fetch_spec::{
        ExtractionTemplate, FetchSpec, LoadEntry, MemberTemplate, MergeConflict, TemplateKind,
        TemplateNode, UnionTemplate, merge_load, merge_node, merge_union,
    },
    requested_fields_error::{FieldPath, RequestedFieldsError},
    selection::FieldSelection,
};

pub struct RequestedFieldsProcessor<'a> {
    introspector: &'a dyn SchemaIntrospector,
    formatter: &'a NameFormatter,
}

/// The fetch requirements and template of a nested selection.
struct Processed {
    select: IndexSet<String>,
    load: IndexMap<String, LoadEntry>,
    template: ExtractionTemplate,
}

struct ResourceFields {
    select: IndexSet<String>,
    load: IndexMap<String, LoadEntry>,
    nodes: Vec<TemplateNode>,
}

impl<'a> RequestedFieldsProcessor<'a> {
    pub fn new(introspector: &'a dyn SchemaIntrospector, formatter: &'a NameFormatter) -> Self {
        Self {
            introspector,
            formatter,
        }
    }

    #[instrument(name = "RequestedFieldsProcessor::process", skip(self, selection))]
    pub fn process(
        &self,
        resource: &str,
        action: &str,
        selection: &[FieldSelection],
    ) -> Result<FetchSpec, RequestedFieldsError> {
        let result = self.process_action(resource, action, selection);
        if let Err(err) = &result {
            debug!(code = err.code(), "Field selection rejected: {}", err);
        }
        result
    }

    fn process_action(
        &self,
        resource_name: &str,
        action_name: &str,
        selection: &[FieldSelection],
    ) -> Result<FetchSpec, RequestedFieldsError> {
        let not_found = || RequestedFieldsError::ActionNotFound(action_name.to_string());

        let action = self
            .introspector
            .action(resource_name, action_name)
            .ok_or_else(not_found)?;
        let root = FieldPath::root();

        match (action.kind, &action.returns) {
            (ActionKind::Destroy, _) if selection.is_empty() => Ok(FetchSpec {
                template: ExtractionTemplate::Fields(vec![]),
                ..Default::default()
            }),
            (ActionKind::Action, Some(returns)) if returns.is_composite() => {
                let processed = self.process_composite(returns, selection, &root, resource_name)?;
                Ok(FetchSpec {
                    select: processed.select,
                    load: processed.load,
                    template: processed.template,
                })
            }
            (ActionKind::Action, returns) => {
                if !selection.is_empty() {
                    return Err(RequestedFieldsError::InvalidFieldSelection {
                        path: root,
                        reason: format!(
                            "the action returns {}, which has no fields to select",
                            returns
                                .as_ref()
                                .map(FieldType::type_name)
                                .unwrap_or_else(|| "nothing".to_string())
                        ),
                    });
                }
                Ok(FetchSpec::default())
            }
            (
                ActionKind::Read | ActionKind::Create | ActionKind::Update | ActionKind::Destroy,
                _,
            ) => {
                let resource = self
                    .introspector
                    .exposed_resource(resource_name)
                    .ok_or_else(not_found)?;
                if selection.is_empty() {
                    return Err(RequestedFieldsError::RequiresFieldSelection { path: root });
                }
                let fields = self.process_resource(resource, selection, &root)?;
                Ok(FetchSpec {
                    select: fields.select,
                    load: fields.load,
                    template: ExtractionTemplate::Fields(fields.nodes),
                })
            }
        }
    }

    fn process_resource(
        &self,
        resource: &Resource,
        selection: &[FieldSelection],
        path: &FieldPath,
    ) -> Result<ResourceFields, RequestedFieldsError> {
        let mut select = IndexSet::new();
        let mut load = IndexMap::new();
        let mut nodes = Vec::new();

        for entry in selection {
            let (name, field_path) = self.entry_name(entry, path)?;

            let Some(kind) = self.introspector.classify(resource, &name) else {
                return Err(RequestedFieldsError::UnknownField {
                    path: field_path,
                    type_name: resource.name.clone(),
                });
            };

            let node = match kind {
                FieldKind::Attribute(attribute) => {
                    let (node, nested_load) = self.process_valued_field(
                        &name,
                        &attribute.typ,
                        entry,
                        &field_path,
                        &resource.name,
                    )?;
                    select.insert(name.clone());
                    // Calculations inside embedded values are computed under the attribute
                    if !nested_load.is_empty() {
                        merge_load(
                            &mut load,
                            &name,
                            LoadEntry::nested(IndexSet::new(), nested_load),
                        )
                        .map_err(|c| conflict(&field_path, c))?;
                    }
                    node
                }
                FieldKind::Relationship(relationship) => {
                    let (node, entry) =
                        self.process_relationship(resource, relationship, entry, &field_path)?;
                    merge_load(&mut load, &name, entry).map_err(|c| conflict(&field_path, c))?;
                    node
                }
                FieldKind::Calculation(calculation) => {
                    let (node, entry) =
                        self.process_calculation(resource, calculation, entry, &field_path)?;
                    merge_load(&mut load, &name, entry).map_err(|c| conflict(&field_path, c))?;
                    node
                }
                FieldKind::Aggregate(_) => {
                    expect_leaf(entry, &field_path)?;
                    merge_load(&mut load, &name, LoadEntry::default())
                        .map_err(|c| conflict(&field_path, c))?;
                    TemplateNode::new(&name, TemplateKind::Aggregate)
                }
            };

            merge_node(&mut nodes, node).map_err(|c| conflict(&field_path, c))?;
        }

        Ok(ResourceFields {
            select,
            load,
            nodes,
        })
    }

    /// An attribute or a field of a typed struct: a leaf unless its type is composite.
    fn process_valued_field(
        &self,
        name: &str,
        typ: &FieldType,
        entry: &FieldSelection,
        path: &FieldPath,
        parent_type: &str,
    ) -> Result<(TemplateNode, IndexMap<String, LoadEntry>), RequestedFieldsError> {
        if !typ.is_composite() {
            expect_leaf(entry, path)?;
            return Ok((TemplateNode::new(name, TemplateKind::Attribute), IndexMap::new()));
        }

        let fields = match entry {
            FieldSelection::Nested { fields, .. } => fields,
            FieldSelection::Bare(_) => {
                return Err(RequestedFieldsError::RequiresFieldSelection { path: path.clone() });
            }
            FieldSelection::ArgsAndFields { .. } => {
                return Err(RequestedFieldsError::InvalidFieldSelection {
                    path: path.clone(),
                    reason: "only calculations accept arguments".to_string(),
                });
            }
            FieldSelection::Malformed { .. } => {
                return Err(RequestedFieldsError::UnsupportedFieldCombination {
                    path: path.clone(),
                    reason: "expected a list of fields".to_string(),
                });
            }
            FieldSelection::Invalid(value) => return Err(invalid_entry(path, value)),
        };

        let processed = self.process_composite(typ, fields, path, parent_type)?;
        let kind = match processed.template {
            ExtractionTemplate::Union(union) => TemplateKind::Union(union),
            ExtractionTemplate::Fields(nodes) if is_map(typ) => {
                TemplateKind::MapWithConstraints(nodes)
            }
            ExtractionTemplate::Fields(nodes) => TemplateKind::Embedded(nodes),
            ExtractionTemplate::Scalar => TemplateKind::Attribute,
        };

        Ok((TemplateNode::new(name, kind), processed.load))
    }

    /// A non-empty selection against a composite type.
    fn process_composite(
        &self,
        typ: &FieldType,
        selection: &[FieldSelection],
        path: &FieldPath,
        parent_type: &str,
    ) -> Result<Processed, RequestedFieldsError> {
        if selection.is_empty() {
            return Err(RequestedFieldsError::RequiresFieldSelection { path: path.clone() });
        }

        match self.introspector.resolve_type_fields(typ) {
            Some(TypeFields::Resource(resource)) => {
                let fields = self.process_resource(resource, selection, path)?;
                Ok(Processed {
                    select: fields.select,
                    load: fields.load,
                    template: ExtractionTemplate::Fields(fields.nodes),
                })
            }
            Some(TypeFields::Fields { type_name, fields }) => {
                let (nodes, load) =
                    self.process_typed_fields(type_name, fields, is_map(typ), selection, path)?;
                Ok(Processed {
                    select: IndexSet::new(),
                    load,
                    template: ExtractionTemplate::Fields(nodes),
                })
            }
            Some(TypeFields::Union(union)) => self.process_union(union, selection, path),
            // The type refers to a resource clients cannot see
            None => Err(RequestedFieldsError::UnknownField {
                path: path.clone(),
                type_name: parent_type.to_string(),
            }),
        }
    }

    fn process_typed_fields(
        &self,
        type_name: &str,
        typed: &TypedFields,
        is_map: bool,
        selection: &[FieldSelection],
        path: &FieldPath,
    ) -> Result<(Vec<TemplateNode>, IndexMap<String, LoadEntry>), RequestedFieldsError> {
        let mut nodes = Vec::new();
        let mut load = IndexMap::new();

        for entry in selection {
            let (name, field_path) = self.entry_name(entry, path)?;

            let Some(field) = typed.get(&name) else {
                return Err(if is_map {
                    RequestedFieldsError::UnknownMapField {
                        path: field_path,
                        type_name: type_name.to_string(),
                    }
                } else {
                    RequestedFieldsError::UnknownField {
                        path: field_path,
                        type_name: type_name.to_string(),
                    }
                });
            };

            let (node, nested_load) =
                self.process_valued_field(&name, &field.typ, entry, &field_path, type_name)?;
            if !nested_load.is_empty() {
                merge_load(
                    &mut load,
                    &name,
                    LoadEntry::nested(IndexSet::new(), nested_load),
                )
                .map_err(|c| conflict(&field_path, c))?;
            }
            merge_node(&mut nodes, node).map_err(|c| conflict(&field_path, c))?;
        }

        Ok((nodes, load))
    }

    fn process_union(
        &self,
        union: &UnionType,
        selection: &[FieldSelection],
        path: &FieldPath,
    ) -> Result<Processed, RequestedFieldsError> {
        let mut template = UnionTemplate {
            union_type: union.clone(),
            members: vec![],
        };
        let mut load = IndexMap::new();

        for entry in selection {
            let (name, member_path) = self.entry_name(entry, path)?;

            let fields = match entry {
                FieldSelection::Bare(_) => None,
                FieldSelection::Nested { fields, .. } => Some(fields),
                FieldSelection::ArgsAndFields { .. } => {
                    return Err(RequestedFieldsError::InvalidFieldSelection {
                        path: member_path,
                        reason: "union members do not accept arguments".to_string(),
                    });
                }
                FieldSelection::Malformed { .. } => {
                    return Err(RequestedFieldsError::UnsupportedFieldCombination {
                        path: member_path,
                        reason: "expected a member name or a member with a list of fields"
                            .to_string(),
                    });
                }
                FieldSelection::Invalid(value) => return Err(invalid_entry(path, value)),
            };

            let Some(member) = union.member(&name) else {
                return Err(RequestedFieldsError::UnknownUnionField { path: member_path });
            };

            let nested = match fields {
                None if member.typ.is_composite() => {
                    return Err(RequestedFieldsError::RequiresFieldSelection { path: member_path });
                }
                None => ExtractionTemplate::Scalar,
                Some(_) if !member.typ.is_composite() => {
                    return Err(RequestedFieldsError::FieldDoesNotSupportNesting {
                        path: member_path,
                    });
                }
                Some(fields) => {
                    let processed =
                        self.process_composite(&member.typ, fields, &member_path, "Union")?;
                    // Loads nest under the member name
                    if !processed.load.is_empty() {
                        merge_load(
                            &mut load,
                            &name,
                            LoadEntry::nested(IndexSet::new(), processed.load),
                        )
                        .map_err(|c| conflict(&member_path, c))?;
                    }
                    processed.template
                }
            };

            merge_union(
                &mut template,
                UnionTemplate {
                    union_type: union.clone(),
                    members: vec![MemberTemplate {
                        member: name,
                        nested,
                    }],
                },
            )
            .map_err(|c| conflict(&member_path, c))?;
        }

        Ok(Processed {
            select: IndexSet::new(),
            load,
            template: ExtractionTemplate::Union(template),
        })
    }

    fn process_relationship(
        &self,
        resource: &Resource,
        relationship: &Relationship,
        entry: &FieldSelection,
        path: &FieldPath,
    ) -> Result<(TemplateNode, LoadEntry), RequestedFieldsError> {
        let fields = match entry {
            FieldSelection::Nested { fields, .. } if !fields.is_empty() => fields,
            FieldSelection::Nested { .. } | FieldSelection::Bare(_) => {
                return Err(RequestedFieldsError::RequiresFieldSelection { path: path.clone() });
            }
            FieldSelection::ArgsAndFields { .. } | FieldSelection::Malformed { .. } => {
                return Err(RequestedFieldsError::UnsupportedFieldCombination {
                    path: path.clone(),
                    reason: "relationships take a list of fields".to_string(),
                });
            }
            FieldSelection::Invalid(value) => return Err(invalid_entry(path, value)),
        };

        let Some(destination) = self.introspector.exposed_resource(&relationship.destination)
        else {
            return Err(RequestedFieldsError::UnknownField {
                path: path.clone(),
                type_name: resource.name.clone(),
            });
        };

        let nested = self.process_resource(destination, fields, path)?;

        Ok((
            TemplateNode::new(&relationship.name, TemplateKind::Relationship(nested.nodes)),
            LoadEntry::nested(nested.select, nested.load),
        ))
    }

    fn process_calculation(
        &self,
        resource: &Resource,
        calculation: &Calculation,
        entry: &FieldSelection,
        path: &FieldPath,
    ) -> Result<(TemplateNode, LoadEntry), RequestedFieldsError> {
        let composite = calculation.return_type.is_composite();
        let takes_arguments = calculation.takes_arguments();
        let invalid_args = |reason: &str| RequestedFieldsError::InvalidCalculationArgs {
            path: path.clone(),
            reason: reason.to_string(),
        };

        let (args, fields): (Map<String, Value>, &[FieldSelection]) = match entry {
            FieldSelection::Bare(_) if takes_arguments => {
                return Err(invalid_args(
                    "the calculation takes arguments, request it as {\"args\": {...}}",
                ));
            }
            FieldSelection::Bare(_) if composite => {
                return Err(RequestedFieldsError::RequiresFieldSelection { path: path.clone() });
            }
            FieldSelection::Bare(_) => (Map::new(), Default::default()),
            FieldSelection::Nested { .. } if takes_arguments => {
                return Err(invalid_args(
                    "the calculation takes arguments, request it as {\"args\": {...}, \"fields\": [...]}",
                ));
            }
            FieldSelection::Nested { .. } if !composite => {
                return Err(RequestedFieldsError::FieldDoesNotSupportNesting { path: path.clone() });
            }
            FieldSelection::Nested { fields, .. } => (Map::new(), fields.as_slice()),
            FieldSelection::ArgsAndFields { args, fields, .. } => {
                let args = match args {
                    Some(args) => self.check_calculation_args(calculation, args, path)?,
                    None if takes_arguments => return Err(invalid_args("missing 'args'")),
                    None => Map::new(),
                };
                (args, fields.as_deref().unwrap_or_default())
            }
            FieldSelection::Malformed { .. } => {
                return Err(RequestedFieldsError::InvalidFieldSelection {
                    path: path.clone(),
                    reason: "expected a list of fields or {\"args\": {...}, \"fields\": [...]}"
                        .to_string(),
                });
            }
            FieldSelection::Invalid(value) => return Err(invalid_entry(path, value)),
        };

        let load_args = takes_arguments.then(|| args.clone());

        let (nested, load) = if composite {
            let processed =
                self.process_composite(&calculation.return_type, fields, path, &resource.name)?;
            (
                processed.template,
                LoadEntry {
                    args: load_args,
                    select: processed.select,
                    load: processed.load,
                },
            )
        } else {
            if !fields.is_empty() {
                return Err(RequestedFieldsError::InvalidFieldSelection {
                    path: path.clone(),
                    reason: format!(
                        "the calculation returns {}, which has no fields to select",
                        calculation.return_type.type_name()
                    ),
                });
            }
            (
                ExtractionTemplate::Scalar,
                LoadEntry {
                    args: load_args,
                    ..Default::default()
                },
            )
        };

        Ok((
            TemplateNode::new(&calculation.name, TemplateKind::Calculation { args, nested }),
            load,
        ))
    }

    /// Convert argument names to internal form and check them against the declared arguments.
    fn check_calculation_args(
        &self,
        calculation: &Calculation,
        args: &Map<String, Value>,
        path: &FieldPath,
    ) -> Result<Map<String, Value>, RequestedFieldsError> {
        let invalid_args = |reason: String| RequestedFieldsError::InvalidCalculationArgs {
            path: path.clone(),
            reason,
        };

        let mut internal = Map::new();
        for (key, value) in args {
            let name = self.formatter.to_internal(key);
            if calculation.argument(&name).is_none() {
                return Err(invalid_args(format!("unknown argument '{key}'")));
            }
            internal.insert(name, value.clone());
        }

        if let Some(missing) = calculation
            .arguments
            .iter()
            .find(|a| a.is_required() && internal.get(&a.name).is_none_or(Value::is_null))
        {
            return Err(invalid_args(format!(
                "missing required argument '{}'",
                self.formatter.to_external(&missing.name)
            )));
        }

        Ok(internal)
    }

    /// The internal name an entry selects, and its path.
    fn entry_name(
        &self,
        entry: &FieldSelection,
        path: &FieldPath,
    ) -> Result<(String, FieldPath), RequestedFieldsError> {
        match entry {
            FieldSelection::Invalid(value) => Err(invalid_entry(path, value)),
            _ => {
                let name = self.formatter.to_internal(entry.name().unwrap_or_default());
                let field_path = path.child(&name);
                Ok((name, field_path))
            }
        }
    }
}

fn expect_leaf(entry: &FieldSelection, path: &FieldPath) -> Result<(), RequestedFieldsError> {
    match entry {
        FieldSelection::Bare(_) => Ok(()),
        FieldSelection::Nested { .. } | FieldSelection::Malformed { .. } => {
            Err(RequestedFieldsError::FieldDoesNotSupportNesting { path: path.clone() })
        }
        FieldSelection::ArgsAndFields { .. } => Err(RequestedFieldsError::InvalidFieldSelection {
            path: path.clone(),
            reason: "only calculations accept arguments".to_string(),
        }),
        FieldSelection::Invalid(value) => Err(invalid_entry(path, value)),
    }
}

fn invalid_entry(path: &FieldPath, value: &Value) -> RequestedFieldsError {
    RequestedFieldsError::InvalidFieldType {
        path: path.clone(),
        value: value.clone(),
    }
}

fn conflict(path: &FieldPath, conflict: MergeConflict) -> RequestedFieldsError {
    RequestedFieldsError::UnsupportedFieldCombination {
        path: path.clone(),
        reason: conflict.reason.to_string(),
    }
}

fn is_map(typ: &FieldType) -> bool {
    matches!(typ.element_type(), FieldType::Map(_))
}

// HTTP handlers - one per page/action. Writes answer with a 303 redirect,
// user-facing errors re-render the page with the message inline.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::{
    app_state::AppState,
    core::{
        filter::{FilterOperator, RecordFilter},
        formula::{Formula, FormulaError},
        strong_types::{AttributeId, DataType, EntityId, EntityTypeId},
    },
    error::{AppError, AppResult},
    models::{Attribute, EntityType, NewAttribute},
};

#[derive(Debug, Deserialize)]
pub struct EntityTypeForm {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AttributeForm {
    pub name: Option<String>,
    pub data_type: Option<String>,
    pub is_calculated: Option<String>,
    pub formula: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FilterForm {
    pub attribute_id: Option<String>,
    pub operator: Option<String>,
    pub value: Option<String>,
}

impl FilterForm {
    /// All three fields present and non-empty
    fn is_complete(&self) -> bool {
        [&self.attribute_id, &self.operator, &self.value]
            .iter()
            .all(|f| f.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }
}

async fn load_entity_type(state: &AppState, id: EntityTypeId) -> AppResult<EntityType> {
    state
        .store
        .get_entity_type(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Entity type {} not found", id)))
}

pub async fn home() -> Redirect {
    Redirect::to("/entity-types")
}

// Entity types

async fn render_entity_types(state: &AppState, error: Option<String>) -> AppResult<Response> {
    let types = state.store.list_entity_types().await?;
    let page = state.views.render(
        "entity_types",
        &json!({ "title": "Entity types", "types": types, "error": error }),
    )?;
    Ok(page.into_response())
}

pub async fn list_entity_types(State(state): State<AppState>) -> AppResult<Response> {
    render_entity_types(&state, None).await
}

pub async fn create_entity_type(
    State(state): State<AppState>,
    Form(form): Form<EntityTypeForm>,
) -> AppResult<Response> {
    let name = form.name.unwrap_or_default().trim().to_string();
    if name.is_empty() {
        return render_entity_types(&state, Some("Entity type name is required.".into())).await;
    }

    match state.store.create_entity_type(&name).await {
        Ok(entity_type) => {
            info!(id = %entity_type.id, name = %entity_type.name, "Created entity type");
            Ok(Redirect::to("/entity-types").into_response())
        }
        Err(e @ AppError::Conflict(_)) => render_entity_types(&state, Some(e.user_message())).await,
        Err(e) => Err(e),
    }
}

pub async fn delete_entity_type(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Redirect> {
    let id = EntityTypeId(id);
    if state.store.delete_entity_type(id).await? {
        info!(%id, "Deleted entity type");
    }
    Ok(Redirect::to("/entity-types"))
}

// Attributes

async fn render_attributes(
    state: &AppState,
    entity_type: EntityType,
    error: Option<String>,
) -> AppResult<Response> {
    let attributes = state.store.list_attributes(entity_type.id).await?;
    let data_types: Vec<&str> = DataType::ALL.iter().map(DataType::as_str).collect();

    let page = state.views.render(
        "attributes",
        &json!({
            "title": format!("Attributes of {}", entity_type.name),
            "entity_type": entity_type,
            "attributes": attributes,
            "data_types": data_types,
            "error": error,
        }),
    )?;
    Ok(page.into_response())
}

pub async fn list_attributes(
    State(state): State<AppState>,
    Path(entity_type_id): Path<i64>,
) -> AppResult<Response> {
    let entity_type = load_entity_type(&state, EntityTypeId(entity_type_id)).await?;
    render_attributes(&state, entity_type, None).await
}

pub async fn create_attribute(
    State(state): State<AppState>,
    Path(entity_type_id): Path<i64>,
    Form(form): Form<AttributeForm>,
) -> AppResult<Response> {
    let entity_type = load_entity_type(&state, EntityTypeId(entity_type_id)).await?;

    let is_calculated = form.is_calculated.is_some_and(|v| !v.is_empty());
    let attribute = NewAttribute::new(
        entity_type.id,
        form.name.unwrap_or_default().trim(),
        DataType::from_tag(form.data_type.as_deref().unwrap_or_default()),
        is_calculated,
        form.formula.filter(|f| !f.trim().is_empty()),
    );

    if let Some(source) = attribute.formula.as_deref() {
        match Formula::parse(source) {
            Ok(formula) => {
                let known = state.store.list_attributes(entity_type.id).await?;
                for name in formula.variables() {
                    if !known.iter().any(|a| a.name == name) {
                        warn!(attribute = %attribute.name, "Formula references unknown attribute {}", name);
                    }
                }
            }
            Err(FormulaError::TooLong | FormulaError::TooDeep) => {
                let message = "Formula is too long or nests too deeply.".to_string();
                return render_attributes(&state, entity_type, Some(message)).await;
            }
            Err(e) => warn!(attribute = %attribute.name, "Formula does not parse: {}", e),
        }
    }

    let created = state.store.create_attribute(attribute).await?;
    info!(id = %created.id, name = %created.name, data_type = %created.data_type, "Created attribute");
    Ok(Redirect::to(&format!("/attributes/{}", entity_type.id)).into_response())
}

pub async fn delete_attribute(
    State(state): State<AppState>,
    Path((id, entity_type_id)): Path<(i64, i64)>,
) -> AppResult<Redirect> {
    let (id, entity_type_id) = (AttributeId(id), EntityTypeId(entity_type_id));
    if state.store.delete_attribute(id, entity_type_id).await? {
        info!(%id, %entity_type_id, "Deleted attribute");
    }
    Ok(Redirect::to(&format!("/attributes/{}", entity_type_id)))
}

// Records

#[derive(Debug, Serialize)]
struct FieldView<'a> {
    id: AttributeId,
    name: &'a str,
    data_type: &'static str,
    input_type: &'static str,
    step: Option<&'static str>,
    is_boolean: bool,
    is_true: bool,
    is_false: bool,
    is_calculated: bool,
    formula: Option<&'a str>,
    value: Option<String>,
}

fn field_views<'a>(
    attributes: &'a [Attribute],
    mut value_of: impl FnMut(&Attribute) -> Option<String>,
) -> Vec<FieldView<'a>> {
    attributes
        .iter()
        .map(|attr| {
            let value = value_of(attr);
            let (input_type, step) = match attr.data_type {
                DataType::Integer => ("number", Some("1")),
                DataType::Float => ("number", Some("any")),
                DataType::Date => ("date", None),
                DataType::Boolean | DataType::Text => ("text", None),
            };
            FieldView {
                id: attr.id,
                name: &attr.name,
                data_type: attr.data_type.as_str(),
                input_type,
                step,
                is_boolean: attr.data_type == DataType::Boolean,
                is_true: value.as_deref() == Some("true"),
                is_false: value.as_deref() == Some("false"),
                is_calculated: attr.is_calculated,
                formula: attr.formula.as_deref(),
                value,
            }
        })
        .collect()
}

struct RecordFormPage<'a> {
    entity_type: &'a EntityType,
    title: String,
    action: String,
    submit_label: &'static str,
}

impl<'a> RecordFormPage<'a> {
    fn create(entity_type: &'a EntityType) -> Self {
        Self {
            entity_type,
            title: format!("New {}", entity_type.name),
            action: format!("/records/{}", entity_type.id),
            submit_label: "Create",
        }
    }

    fn edit(entity_type: &'a EntityType, entity_id: EntityId) -> Self {
        Self {
            entity_type,
            title: format!("Edit {} #{}", entity_type.name, entity_id),
            action: format!("/edit-record/{}/{}", entity_id, entity_type.id),
            submit_label: "Save",
        }
    }

    fn render(
        self,
        state: &AppState,
        attributes: &[Attribute],
        value_of: impl FnMut(&Attribute) -> Option<String>,
        error: Option<String>,
    ) -> AppResult<Response> {
        let page = state.views.render(
            "record_form",
            &json!({
                "title": self.title,
                "entity_type": self.entity_type,
                "action": self.action,
                "submit_label": self.submit_label,
                "fields": field_views(attributes, value_of),
                "error": error,
            }),
        )?;
        Ok(page.into_response())
    }
}

pub async fn new_record_form(
    State(state): State<AppState>,
    Path(entity_type_id): Path<i64>,
) -> AppResult<Response> {
    let entity_type = load_entity_type(&state, EntityTypeId(entity_type_id)).await?;
    let attributes = state.store.list_attributes(entity_type.id).await?;
    RecordFormPage::create(&entity_type).render(&state, &attributes, |_| None, None)
}

pub async fn create_record(
    State(state): State<AppState>,
    Path(entity_type_id): Path<i64>,
    Form(form): Form<HashMap<String, String>>,
) -> AppResult<Response> {
    let entity_type = load_entity_type(&state, EntityTypeId(entity_type_id)).await?;

    match state.records.create_record(entity_type.id, &form).await {
        Ok(_) => Ok(Redirect::to(&format!("/records-list/{}", entity_type.id)).into_response()),
        Err(e) if e.is_validation() => {
            let attributes = state.store.list_attributes(entity_type.id).await?;
            RecordFormPage::create(&entity_type).render(
                &state,
                &attributes,
                |attr| form.get(&attr.id.to_string()).cloned(),
                Some(e.user_message()),
            )
        }
        Err(e) => Err(e),
    }
}

pub async fn edit_record_form(
    State(state): State<AppState>,
    Path((entity_id, entity_type_id)): Path<(i64, i64)>,
) -> AppResult<Response> {
    let (entity_id, entity_type_id) = (EntityId(entity_id), EntityTypeId(entity_type_id));
    let entity_type = load_entity_type(&state, entity_type_id).await?;
    state
        .records
        .ensure_record_of_type(entity_type.id, entity_id)
        .await?;

    let attributes = state.store.list_attributes(entity_type.id).await?;
    let mut stored = state.store.record_values(entity_id).await?;
    RecordFormPage::edit(&entity_type, entity_id).render(
        &state,
        &attributes,
        |attr| stored.remove(&attr.id).flatten(),
        None,
    )
}

pub async fn update_record(
    State(state): State<AppState>,
    Path((entity_id, entity_type_id)): Path<(i64, i64)>,
    Form(form): Form<HashMap<String, String>>,
) -> AppResult<Response> {
    let (entity_id, entity_type_id) = (EntityId(entity_id), EntityTypeId(entity_type_id));
    let entity_type = load_entity_type(&state, entity_type_id).await?;

    match state
        .records
        .update_record(entity_type.id, entity_id, &form)
        .await
    {
        Ok(()) => Ok(Redirect::to(&format!("/records-list/{}", entity_type.id)).into_response()),
        Err(e) if e.is_validation() => {
            let attributes = state.store.list_attributes(entity_type.id).await?;
            RecordFormPage::edit(&entity_type, entity_id).render(
                &state,
                &attributes,
                |attr| form.get(&attr.id.to_string()).cloned(),
                Some(e.user_message()),
            )
        }
        Err(e) => Err(e),
    }
}

fn resolve_filter(attributes: &[Attribute], form: &FilterForm) -> AppResult<RecordFilter> {
    let raw_id = form.attribute_id.as_deref().unwrap_or_default().trim();
    let attribute = raw_id
        .parse::<i64>()
        .ok()
        .and_then(|id| attributes.iter().find(|a| a.id == AttributeId(id)))
        .ok_or_else(|| AppError::Validation(format!("Unknown attribute: {}", raw_id)))?;
    let operator: FilterOperator = form.operator.as_deref().unwrap_or_default().parse()?;
    RecordFilter::resolve(
        attribute.id,
        attribute.data_type,
        operator,
        form.value.as_deref().unwrap_or_default(),
    )
}

async fn render_records_list(
    state: &AppState,
    entity_type_id: EntityTypeId,
    form: FilterForm,
) -> AppResult<Response> {
    let entity_type = load_entity_type(state, entity_type_id).await?;
    let attributes = state.store.list_attributes(entity_type.id).await?;

    let mut error = None;
    let filter = if form.is_complete() {
        match resolve_filter(&attributes, &form) {
            Ok(filter) => Some(filter),
            Err(e) if e.is_validation() => {
                warn!(%entity_type_id, "Rejected record filter: {}", e);
                error = Some(e.user_message());
                None
            }
            Err(e) => return Err(e),
        }
    } else {
        None
    };

    let records = state
        .store
        .list_records(entity_type.id, filter.as_ref())
        .await?;

    let columns: Vec<&str> = attributes.iter().map(|a| a.name.as_str()).collect();
    let rows: Vec<_> = records
        .iter()
        .map(|record| {
            let cells: Vec<Option<&str>> = columns.iter().map(|c| record.value(c)).collect();
            json!({ "id": record.id, "cells": cells })
        })
        .collect();

    let selected_attr = form.attribute_id.as_deref().unwrap_or_default().trim();
    let filter_attributes: Vec<_> = attributes
        .iter()
        .map(|a| json!({ "id": a.id, "name": a.name, "selected": (a.id.to_string() == selected_attr) }))
        .collect();
    let selected_op = form
        .operator
        .as_deref()
        .and_then(|op| op.parse::<FilterOperator>().ok());
    let operators: Vec<_> = FilterOperator::ALL
        .iter()
        .map(|op| json!({ "symbol": op.sql_symbol(), "selected": (Some(*op) == selected_op) }))
        .collect();

    let page = state.views.render(
        "records_list",
        &json!({
            "title": format!("{} records", entity_type.name),
            "entity_type": entity_type,
            "columns": columns,
            "records": rows,
            "filter_attributes": filter_attributes,
            "operators": operators,
            "filter_value": form.value,
            "error": error,
        }),
    )?;
    Ok(page.into_response())
}

pub async fn list_records(
    State(state): State<AppState>,
    Path(entity_type_id): Path<i64>,
) -> AppResult<Response> {
    render_records_list(&state, EntityTypeId(entity_type_id), FilterForm::default()).await
}

pub async fn filter_records(
    State(state): State<AppState>,
    Path(entity_type_id): Path<i64>,
    Form(form): Form<FilterForm>,
) -> AppResult<Response> {
    render_records_list(&state, EntityTypeId(entity_type_id), form).await
}

pub async fn delete_record(
    State(state): State<AppState>,
    Path((entity_id, entity_type_id)): Path<(i64, i64)>,
) -> AppResult<Redirect> {
    let (entity_id, entity_type_id) = (EntityId(entity_id), EntityTypeId(entity_type_id));
    state.records.ensure_record_of_type(entity_type_id, entity_id).await?;
    if state.store.delete_record(entity_id).await? {
        info!(%entity_id, "Deleted record");
    }
    Ok(Redirect::to(&format!("/records-list/{}", entity_type_id)))
}

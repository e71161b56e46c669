//! Request bodies accepted by the write endpoints.
//!
//! Browsers post `application/x-www-form-urlencoded`, scripts post JSON;
//! both decode into the same structs. Numeric and boolean fields arrive as
//! strings from forms, so they are kept as raw values and coerced here.

use axum::extract::{FromRequest, Request};
use axum::http::header::CONTENT_TYPE;
use axum::{Form, Json};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{RelgraphError, Result};
use crate::store::{NewPerson, NewRelationship, PersonPatch};

/// Decode a form or JSON body depending on the request's content type.
pub async fn form_or_json<T>(request: Request) -> Result<T>
where
    T: DeserializeOwned + Send + 'static,
{
    let is_json = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| ct.starts_with("application/json"));

    if is_json {
        Json::<T>::from_request(request, &())
            .await
            .map(|Json(body)| body)
            .map_err(|e| RelgraphError::Validation(e.body_text()))
    } else {
        Form::<T>::from_request(request, &())
            .await
            .map(|Form(body)| body)
            .map_err(|e| RelgraphError::Validation(e.body_text()))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PersonInput {
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default)]
    pub icono: Option<String>,
    #[serde(default)]
    pub grupo: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub descripcion: Option<String>,
    #[serde(default)]
    pub es_principal: Option<Value>,
    #[serde(default)]
    pub posicion_x: Option<Value>,
    #[serde(default)]
    pub posicion_y: Option<Value>,
}

impl PersonInput {
    pub fn into_new_person(self) -> Result<NewPerson> {
        let is_root = match &self.es_principal {
            Some(v) => flag("es_principal", v)?,
            None => false,
        };
        Ok(NewPerson {
            name: self.nombre.unwrap_or_default(),
            icon: self.icono,
            group: self.grupo,
            color: self.color,
            description: self.descripcion,
            is_root,
        })
    }

    pub fn into_patch(self) -> Result<PersonPatch> {
        let is_root = self
            .es_principal
            .as_ref()
            .map(|v| flag("es_principal", v))
            .transpose()?;
        let x = self.posicion_x.as_ref().map(|v| float("posicion_x", v)).transpose()?;
        let y = self.posicion_y.as_ref().map(|v| float("posicion_y", v)).transpose()?;
        let position = match (x, y) {
            (Some(x), Some(y)) => Some((x, y)),
            (None, None) => None,
            _ => {
                return Err(RelgraphError::Validation(
                    "posicion_x and posicion_y must be given together".to_string(),
                ))
            }
        };
        Ok(PersonPatch {
            name: self.nombre,
            icon: self.icono,
            group: self.grupo,
            color: self.color,
            description: self.descripcion,
            is_root,
            position,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RelationshipInput {
    #[serde(default)]
    pub persona1_id: Option<Value>,
    #[serde(default)]
    pub persona2_id: Option<Value>,
    #[serde(default)]
    pub tipo: Option<String>,
    #[serde(default)]
    pub fortaleza: Option<Value>,
    #[serde(default)]
    pub contexto: Option<String>,
}

impl RelationshipInput {
    pub fn into_new_relationship(self) -> Result<NewRelationship> {
        let id = |v: &Option<Value>| v.as_ref().filter(|v| !is_blank(v)).and_then(integer);
        let (Some(a), Some(b)) = (id(&self.persona1_id), id(&self.persona2_id)) else {
            return Err(RelgraphError::Validation(
                "persona1_id and persona2_id must both be integer ids".to_string(),
            ));
        };
        let strength = match self.fortaleza.as_ref().filter(|v| !is_blank(v)) {
            Some(v) => Some(integer(v).ok_or_else(|| {
                RelgraphError::Validation(format!("fortaleza must be an integer, got {}", v))
            })?),
            None => None,
        };
        Ok(NewRelationship {
            persona1_id: a,
            persona2_id: b,
            kind: self.tipo,
            strength,
            context: self.contexto,
        })
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Integer from a JSON number or a numeric string; integral floats are accepted.
pub fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float(field: &str, value: &Value) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|f| f.is_finite())
        .ok_or_else(|| RelgraphError::Validation(format!("{} must be a finite number, got {}", field, value)))
}

fn flag(field: &str, value: &Value) -> Result<bool> {
    let parsed = match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" | "si" | "sí" => Some(true),
            "0" | "false" | "off" | "no" | "" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed.ok_or_else(|| RelgraphError::Validation(format!("{} must be a boolean, got {}", field, value)))
}

/// Ids from a `1,2,3` query parameter; entries that are not non-negative integers are dropped.
pub fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|s| s.parse().ok())
        .collect()
}
